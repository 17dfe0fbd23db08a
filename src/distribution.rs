use crate::errors::AppError;
use crate::store::LeadStore;
use uuid::Uuid;

/// Offers a lead to every client active at this moment.
///
/// One `pending` row per active client is written in a single batch. Clients
/// activated later never receive this lead.
pub async fn fan_out(store: &dyn LeadStore, lead_id: Uuid) -> Result<usize, AppError> {
    let clients = store.active_clients().await?;
    if clients.is_empty() {
        tracing::info!("No active clients; lead {} not distributed", lead_id);
        return Ok(0);
    }

    let client_ids: Vec<Uuid> = clients.iter().map(|c| c.id).collect();
    let inserted = store.insert_distributions(lead_id, &client_ids).await?;

    tracing::info!(
        "Distributed lead {} to {}/{} active clients",
        lead_id,
        inserted,
        client_ids.len()
    );
    Ok(inserted)
}
