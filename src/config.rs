use serde::Deserialize;

/// Default marketplace pricing API base URL.
pub const DEFAULT_MARKETPLACE_BASE_URL: &str = "https://api.marketplace.cms.gov";

/// Default generative-text endpoint (Gemini `generateContent`).
pub const DEFAULT_GEMINI_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-exp:generateContent";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub cors_origin: String,
    pub database_url: String,
    /// Service-role connection that bypasses row-level security.
    pub database_service_url: Option<String>,
    pub auth_base_url: Option<String>,
    pub auth_anon_key: Option<String>,
    pub marketplace_api_key: Option<String>,
    pub marketplace_base_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
}

/// First non-blank value among the given environment variables.
fn first_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn http_url(name: &str, value: String) -> anyhow::Result<String> {
    let parsed = url::Url::parse(&value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// Connection string reduced to `scheme://host[:port]/db` for logging.
fn redacted_database_url(raw: &str) -> String {
    let Ok(url) = url::Url::parse(raw) else {
        return "<unparseable>".to_string();
    };
    let host = url.host_str().unwrap_or("<no host>");
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            environment: first_var(&["APP_ENV", "NODE_ENV"])
                .unwrap_or_else(|| "development".to_string()),
            cors_origin: first_var(&["CORS_ORIGIN"])
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            database_url: first_var(&["DATABASE_URL", "DB_URL"])
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable required"))
                .and_then(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            database_service_url: first_var(&["DATABASE_SERVICE_URL"])
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!(
                            "DATABASE_SERVICE_URL must start with postgresql:// or postgres://"
                        );
                    }
                    Ok(url)
                })
                .transpose()?,
            auth_base_url: first_var(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"])
                .map(|url| http_url("SUPABASE_URL", url))
                .transpose()?,
            auth_anon_key: first_var(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]),
            marketplace_api_key: first_var(&["MARKETPLACE", "MARKETPLACE_API_KEY"]),
            marketplace_base_url: Some(http_url(
                "MARKETPLACE_BASE_URL",
                first_var(&["MARKETPLACE_BASE_URL"])
                    .unwrap_or_else(|| DEFAULT_MARKETPLACE_BASE_URL.to_string()),
            )?),
            gemini_api_key: first_var(&["GEMINI_API_KEY", "EXTERNAL_API_KEY"]),
            gemini_base_url: http_url(
                "GEMINI_BASE_URL",
                first_var(&["GEMINI_BASE_URL"])
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            )?,
        };

        // Log presence only, never the secret values
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Database URL: {}", redacted_database_url(&config.database_url));
        tracing::debug!(
            "Elevated database connection configured: {}",
            config.database_service_url.is_some()
        );
        match config.auth_base_url {
            Some(ref url) => tracing::debug!("Auth provider URL: {}", url),
            None => tracing::warn!("SUPABASE_URL not set; authenticated routes will degrade"),
        }
        if config.marketplace_api_key.is_none() {
            tracing::warn!("MARKETPLACE key not set; plan quotes are disabled");
        }
        if config.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; chat responses are disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
