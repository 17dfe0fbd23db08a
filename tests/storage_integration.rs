use chrono::{Duration, Utc};
use std::env;
use uuid::Uuid;

use riva_leads::db::Database;
use riva_leads::db_storage::PgStore;
use riva_leads::models::{DistributionStatus, NewLead};
use riva_leads::store::{LeadStore, SignupStore};

async fn connect() -> anyhow::Result<PgStore> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    db.migrate().await?;
    Ok(PgStore::new(db.pool.clone()))
}

/// Lead insert plus fan-out against a real Postgres.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn lead_fan_out_smoke_test() -> anyhow::Result<()> {
    let store = connect().await?;

    let lead = store
        .insert_lead(&NewLead {
            email: Some(format!("smoke-{}@example.com", Uuid::new_v4())),
            source: Some("smoke-test".to_string()),
            metadata: serde_json::json!({"run": "storage_integration"}),
            ..Default::default()
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let clients = store
        .active_clients()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let ids: Vec<Uuid> = clients.iter().map(|c| c.id).collect();

    let inserted = store
        .insert_distributions(lead.id, &ids)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(inserted, ids.len());

    // Re-inserting the same pairs is a no-op.
    let again = store
        .insert_distributions(lead.id, &ids)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(again, 0);

    let updated = store
        .set_distribution_status(lead.id, DistributionStatus::Delivered)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(updated as usize, ids.len());

    Ok(())
}

/// The signup sweep never touches rows newer than the cutoff.
#[tokio::test]
#[ignore]
async fn expire_stale_smoke_test() -> anyhow::Result<()> {
    let store = connect().await?;

    let expired = store
        .expire_stale(Utc::now() - Duration::days(7))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("expired {} stale signups", expired);

    let (items, total) = store
        .list(1, 10)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(items.len() as i64 <= total);

    Ok(())
}
