// Workflow actions invoked by the host platform's workflow engine

pub mod create_pledge;
pub mod values;

use crate::errors::StoreError;
use crate::repositories::{PersistenceContext, WorkflowAttributeValues};
use async_trait::async_trait;

pub use create_pledge::{CreateFinancialPledge, PledgeActionConfig, PledgeOutcome, PledgeServices};

/// What a workflow action reports back to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    pub error_messages: Vec<String>,
}

impl ActionResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error_messages: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_messages: vec![message.into()],
        }
    }
}

/// ActionComponent trait defines the interface for a single workflow step.
///
/// Validation problems are reported through [`ActionResult`]; an `Err` means the
/// store itself failed.
#[async_trait]
pub trait ActionComponent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        values: &dyn WorkflowAttributeValues,
        context: &mut dyn PersistenceContext,
    ) -> Result<ActionResult, StoreError>;
}
