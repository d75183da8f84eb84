//! # Conveyor Repository
//!
//! MySQL persistence layer: the system of record for jobs, schedules,
//! workers, dead-letter entries, and webhook events. The queue index only
//! ever holds derived references; every authoritative field lives here.

pub mod mysql;
pub mod pool;
pub mod traits;

pub use mysql::{
    MySqlDeadLetterRepository, MySqlJobRepository, MySqlScheduleRepository,
    MySqlWebhookEventRepository, MySqlWorkerRepository,
};
pub use pool::DatabasePool;
pub use traits::{
    DeadLetterRepository, DeadLetterStats, JobRepository, ScheduleRepository,
    WebhookEventRepository, WorkerRepository,
};
