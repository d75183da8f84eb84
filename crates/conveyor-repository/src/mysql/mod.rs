//! MySQL repository implementations.

mod dead_letter_repository;
mod job_repository;
mod schedule_repository;
mod webhook_event_repository;
mod worker_repository;

pub use dead_letter_repository::MySqlDeadLetterRepository;
pub use job_repository::MySqlJobRepository;
pub use schedule_repository::MySqlScheduleRepository;
pub use webhook_event_repository::MySqlWebhookEventRepository;
pub use worker_repository::MySqlWorkerRepository;

use conveyor_core::ConveyorError;

/// Maps an invalid enum string found in a row to an error.
pub(crate) fn invalid_column(column: &str, value: &str) -> ConveyorError {
    ConveyorError::Internal(format!("Invalid {} in database: {}", column, value))
}
