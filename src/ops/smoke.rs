use crate::client::ApiClient;
use crate::error::Result;

/// Read-only checks run against a live API by the CI test step.
pub async fn smoke(api: &ApiClient) -> Result<()> {
    let health = api.health().await?;
    tracing::info!(%health, "health ok");
    let reservations = api.reservations().await?;
    tracing::info!(count = reservations.len(), "reservations ok");
    let absences = api.absences().await?;
    tracing::info!(count = absences.len(), "absences ok");
    Ok(())
}
