//! Postgres-backed profile store. Needs a live database:
//!
//! ```sh
//! TEST_DATABASE_URL=postgresql://... cargo test --test storage_integration -- --ignored
//! ```

use patient_portal_api::db::Database;
use patient_portal_api::models::UpsertInsuranceRequest;
use patient_portal_api::profile_store::{PgProfileStore, Privilege, ProfileStore};
use uuid::Uuid;

async fn store() -> PgProfileStore {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let db = Database::new(&url, None).await.expect("database reachable");
    PgProfileStore::new(db.pool, db.service_pool)
}

#[tokio::test]
#[ignore]
async fn test_upsert_twice_keeps_one_row() {
    let store = store().await;
    assert_eq!(store.privilege(), Privilege::Restricted);

    let patient_id = Uuid::new_v4();
    let fields = UpsertInsuranceRequest {
        insurance_provider: "Aetna".to_string(),
        policy_number: "POL-1".to_string(),
        member_id: "MEM-1".to_string(),
        zip_code: Some("10001".to_string()),
        member_ages: Some(vec![34, 2]),
        medications: Some(vec!["metformin".to_string()]),
        preferred_providers: Some(serde_json::json!(["Dr. Lee"])),
        ..Default::default()
    };

    let first = store.upsert(patient_id, &fields).await.unwrap();
    let second = store.upsert(patient_id, &fields).await.unwrap();

    assert_eq!(first.patient_id, patient_id);
    assert_eq!(first.created_at, second.created_at);
    assert_eq!(second.member_ages, Some(vec![34, 2]));

    let loaded = store.get(patient_id).await.unwrap().unwrap();
    assert_eq!(loaded.zip_code.as_deref(), Some("10001"));
}

#[tokio::test]
#[ignore]
async fn test_unknown_patient_reads_none() {
    let store = store().await;
    assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
}
