// Scheduled jobs triggered by the host platform's job scheduler

pub mod group_reminder;

use crate::errors::JobError;
use crate::repositories::PersistenceContext;
use async_trait::async_trait;

pub use group_reminder::{GroupReminderConfig, GroupReminderJob, ReminderOutcome, ReminderServices};

/// ScheduledJob trait defines the interface the job scheduler invokes on each trigger
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run once and return the human-readable result summary
    async fn execute(&self, context: &mut dyn PersistenceContext) -> Result<String, JobError>;
}
