//! # Conveyor Core
//!
//! Domain model, error types, and telemetry bootstrap for the Conveyor
//! job-queue service. Everything here is shared by the persistence layer
//! and the queueing engine.

pub mod domain;
pub mod error;
pub mod result;
pub mod telemetry;

pub use domain::entities::{DeadLetterJob, Job, Schedule, WebhookEvent, WorkerRecord};
pub use domain::value_objects::{JobPriority, JobStatus, WebhookStatus, WorkerStatus};
pub use error::ConveyorError;
pub use result::ConveyorResult;
