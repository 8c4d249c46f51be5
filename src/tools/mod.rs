pub mod absences;
pub mod booking;
pub mod image;
pub mod registry;

use std::sync::Arc;

use crate::absences::AbsenceStore;
use crate::interfaces::assistant::AssistantBackend;
use crate::reservations::ReservationStore;

pub use registry::ToolRegistry;

/// Registry with every function the assistant is configured to call.
pub async fn default_registry(
    reservations: ReservationStore,
    absences: AbsenceStore,
    backend: Arc<dyn AssistantBackend>,
) -> ToolRegistry {
    let registry = ToolRegistry::new();
    registry
        .register_tool(Arc::new(booking::BookBoxTool::new(reservations.clone())))
        .await;
    registry
        .register_tool(Arc::new(booking::ListReservationsTool::new(
            reservations.clone(),
        )))
        .await;
    registry
        .register_tool(Arc::new(booking::UpdateReservationTool::new(reservations)))
        .await;
    registry
        .register_tool(Arc::new(absences::ReportAbsenceTool::new(absences.clone())))
        .await;
    registry
        .register_tool(Arc::new(absences::ListAbsencesTool::new(absences.clone())))
        .await;
    registry
        .register_tool(Arc::new(absences::UpdateAbsenceTool::new(absences)))
        .await;
    registry
        .register_tool(Arc::new(image::GenerateImageTool::new(backend)))
        .await;
    registry
}
