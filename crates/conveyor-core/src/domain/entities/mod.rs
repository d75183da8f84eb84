//! Domain entities persisted by the durable store.

mod dead_letter;
mod job;
mod schedule;
mod webhook_event;
mod worker;

pub use dead_letter::DeadLetterJob;
pub use job::Job;
pub use schedule::Schedule;
pub use webhook_event::WebhookEvent;
pub use worker::WorkerRecord;
