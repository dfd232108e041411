use crate::errors::{AppError, ResultExt};
use crate::models::{InsuranceProfile, UpsertInsuranceRequest};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Read/write access to the per-patient insurance profile.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns the stored profile, or `None` when the patient has no row yet.
    async fn get(&self, patient_id: Uuid) -> Result<Option<InsuranceProfile>, AppError>;

    /// Inserts or overwrites the patient's row and returns what was stored.
    async fn upsert(
        &self,
        patient_id: Uuid,
        fields: &UpsertInsuranceRequest,
    ) -> Result<InsuranceProfile, AppError>;
}

/// Which connection the store ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Service role, bypasses row-level security.
    Elevated,
    Restricted,
}

/// Postgres-backed profile store.
pub struct PgProfileStore {
    pool: PgPool,
    privilege: Privilege,
}

impl PgProfileStore {
    /// Picks the elevated pool when one is configured, the restricted one otherwise.
    pub fn new(restricted: PgPool, elevated: Option<PgPool>) -> Self {
        let (pool, privilege) = match elevated {
            Some(pool) => (pool, Privilege::Elevated),
            None => (restricted, Privilege::Restricted),
        };
        tracing::info!("Insurance store using {:?} connection", privilege);
        Self { pool, privilege }
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, patient_id: Uuid) -> Result<Option<InsuranceProfile>, AppError> {
        let profile = sqlx::query_as::<_, InsuranceProfile>(
            "SELECT * FROM insurance_info WHERE patient_id = $1 LIMIT 1",
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to read insurance_info for {}", patient_id))?;

        tracing::debug!(
            "insurance_info lookup for {}: {}",
            patient_id,
            if profile.is_some() { "found" } else { "empty" }
        );
        Ok(profile)
    }

    async fn upsert(
        &self,
        patient_id: Uuid,
        fields: &UpsertInsuranceRequest,
    ) -> Result<InsuranceProfile, AppError> {
        let profile = sqlx::query_as::<_, InsuranceProfile>(
            r#"
            INSERT INTO insurance_info (
                patient_id, insurance_provider, policy_number, group_number, member_id,
                coverage_type, copay_amount, deductible_amount, deductible_met,
                out_of_pocket_max, out_of_pocket_met, expires_at,
                zip_code, county_name, county_fips, state, plan_year,
                household_size, household_income, member_ages, tobacco_use_adults,
                preferred_providers, medications, pharmacy_zip, marketplace_consent
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
            )
            ON CONFLICT (patient_id) DO UPDATE SET
                insurance_provider = EXCLUDED.insurance_provider,
                policy_number = EXCLUDED.policy_number,
                group_number = EXCLUDED.group_number,
                member_id = EXCLUDED.member_id,
                coverage_type = EXCLUDED.coverage_type,
                copay_amount = EXCLUDED.copay_amount,
                deductible_amount = EXCLUDED.deductible_amount,
                deductible_met = EXCLUDED.deductible_met,
                out_of_pocket_max = EXCLUDED.out_of_pocket_max,
                out_of_pocket_met = EXCLUDED.out_of_pocket_met,
                expires_at = EXCLUDED.expires_at,
                zip_code = EXCLUDED.zip_code,
                county_name = EXCLUDED.county_name,
                county_fips = EXCLUDED.county_fips,
                state = EXCLUDED.state,
                plan_year = EXCLUDED.plan_year,
                household_size = EXCLUDED.household_size,
                household_income = EXCLUDED.household_income,
                member_ages = EXCLUDED.member_ages,
                tobacco_use_adults = EXCLUDED.tobacco_use_adults,
                preferred_providers = EXCLUDED.preferred_providers,
                medications = EXCLUDED.medications,
                pharmacy_zip = EXCLUDED.pharmacy_zip,
                marketplace_consent = EXCLUDED.marketplace_consent,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(patient_id)
        .bind(&fields.insurance_provider)
        .bind(&fields.policy_number)
        .bind(&fields.group_number)
        .bind(&fields.member_id)
        .bind(&fields.coverage_type)
        .bind(fields.copay_amount)
        .bind(fields.deductible_amount)
        .bind(fields.deductible_met)
        .bind(fields.out_of_pocket_max)
        .bind(fields.out_of_pocket_met)
        .bind(fields.expires_at)
        .bind(&fields.zip_code)
        .bind(&fields.county_name)
        .bind(&fields.county_fips)
        .bind(&fields.state)
        .bind(fields.plan_year)
        .bind(fields.household_size)
        .bind(fields.household_income)
        .bind(&fields.member_ages)
        .bind(fields.tobacco_use_adults)
        .bind(&fields.preferred_providers)
        .bind(&fields.medications)
        .bind(&fields.pharmacy_zip)
        .bind(fields.marketplace_consent)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert insurance_info for {}", patient_id))?;

        tracing::info!("✓ insurance_info upserted for {}", patient_id);
        Ok(profile)
    }
}
