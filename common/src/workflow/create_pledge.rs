// Create financial pledge workflow action
//
// Resolves person, campus, group, account, frequency, dates and amount from
// workflow attribute values, then writes exactly one pledge. Any failed
// lookup stops the action before anything is written.

use super::values::{parse_amount_value, parse_date_value, parse_guid_value};
use super::{ActionComponent, ActionResult};
use crate::config::PledgeActionSettings;
use crate::errors::{StoreError, ValidationError};
use crate::models::{FinancialPledge, FINANCIAL_FREQUENCY_DEFINED_TYPE};
use crate::repositories::{
    CampusRepository, DefinedValueRepository, Entity, FinancialAccountRepository,
    GroupRepository, PersistenceContext, PersonRepository, WorkflowAttributeValues,
};
use crate::telemetry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const INVALID_PERSON: &str = "Invalid Person Attribute or Value!";
pub const INVALID_GROUP: &str = "Invalid Group Attribute or Value!";
pub const INVALID_ACCOUNT: &str = "Invalid Financial Account Attribute or Value!";
pub const INVALID_FREQUENCY: &str = "Invalid Pledge Frequency Attribute or Value!";
pub const INVALID_START_DATE: &str = "Invalid Start Date Attribute or Value!";
pub const INVALID_END_DATE: &str = "Invalid End Date Attribute or Value!";
pub const INVALID_AMOUNT: &str = "Invalid Amount Attribute or Value!";

/// Whether the pledge must be tied to a group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRequirement {
    /// Use the group when it resolves, otherwise create the pledge without one
    #[default]
    Optional,
    /// Fail the action when the group does not resolve
    Required,
}

/// Attribute keys the action reads, each naming a workflow attribute
#[derive(Debug, Clone, Default)]
pub struct PledgeActionConfig {
    pub person_attribute: Option<Uuid>,
    pub campus_attribute: Option<Uuid>,
    pub group_attribute: Option<Uuid>,
    pub financial_account_attribute: Option<Uuid>,
    pub amount_attribute: Option<Uuid>,
    pub start_date_attribute: Option<Uuid>,
    pub end_date_attribute: Option<Uuid>,
    pub pledge_frequency_attribute: Option<Uuid>,
    pub group_requirement: GroupRequirement,
}

impl PledgeActionConfig {
    /// Blank keys stay unset (the action then reports the matching error);
    /// keys that are not guids are rejected here.
    pub fn from_settings(settings: &PledgeActionSettings) -> Result<Self, ValidationError> {
        Ok(Self {
            person_attribute: attribute_key("person_attribute", &settings.person_attribute)?,
            campus_attribute: attribute_key("campus_attribute", &settings.campus_attribute)?,
            group_attribute: attribute_key("group_attribute", &settings.group_attribute)?,
            financial_account_attribute: attribute_key(
                "financial_account_attribute",
                &settings.financial_account_attribute,
            )?,
            amount_attribute: attribute_key("amount_attribute", &settings.amount_attribute)?,
            start_date_attribute: attribute_key(
                "start_date_attribute",
                &settings.start_date_attribute,
            )?,
            end_date_attribute: attribute_key("end_date_attribute", &settings.end_date_attribute)?,
            pledge_frequency_attribute: attribute_key(
                "pledge_frequency_attribute",
                &settings.pledge_frequency_attribute,
            )?,
            group_requirement: settings.group_requirement,
        })
    }
}

fn attribute_key(field: &str, value: &Option<String>) -> Result<Option<Uuid>, ValidationError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|e| ValidationError::InvalidFieldValue {
                field: format!("pledge.{}", field),
                reason: e.to_string(),
            }),
    }
}

/// Lookups the action resolves references through
#[derive(Clone)]
pub struct PledgeServices {
    pub people: Arc<dyn PersonRepository>,
    pub campuses: Arc<dyn CampusRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub accounts: Arc<dyn FinancialAccountRepository>,
    pub defined_values: Arc<dyn DefinedValueRepository>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PledgeOutcome {
    Created {
        pledge: FinancialPledge,
        campus_id: Option<i64>,
    },
    Rejected(&'static str),
}

pub struct CreateFinancialPledge {
    config: PledgeActionConfig,
    services: PledgeServices,
    currency_symbol: String,
}

/// Stop the action with `message` unless the lookup produced a value
macro_rules! require {
    ($value:expr, $message:expr) => {
        match $value {
            Some(v) => v,
            None => {
                warn!(reason = $message, "Financial pledge not created");
                telemetry::record_pledge_failure($message);
                return Ok(PledgeOutcome::Rejected($message));
            }
        }
    };
}

impl CreateFinancialPledge {
    pub fn new(
        config: PledgeActionConfig,
        services: PledgeServices,
        currency_symbol: impl Into<String>,
    ) -> Self {
        Self {
            config,
            services,
            currency_symbol: currency_symbol.into(),
        }
    }

    /// Resolve every reference, then add and commit one pledge
    #[instrument(skip_all)]
    pub async fn create(
        &self,
        values: &dyn WorkflowAttributeValues,
        context: &mut dyn PersistenceContext,
    ) -> Result<PledgeOutcome, StoreError> {
        let value = |key: Option<Uuid>| -> Option<String> {
            key.and_then(|k| values.value(k))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let person_alias = match value(self.config.person_attribute).and_then(|v| parse_guid_value(&v)) {
            Some(guid) => self.services.people.get_alias(guid).await?,
            None => None,
        };
        let person_alias = require!(person_alias, INVALID_PERSON);

        let campus = match value(self.config.campus_attribute).and_then(|v| parse_guid_value(&v)) {
            Some(guid) => self.services.campuses.get(guid).await?,
            None => None,
        };
        let campus_id = campus.map(|c| c.id);

        let group = match value(self.config.group_attribute).and_then(|v| parse_guid_value(&v)) {
            Some(guid) => self.services.groups.get(guid).await?,
            None => None,
        };
        let group_id = match self.config.group_requirement {
            GroupRequirement::Required => Some(require!(group, INVALID_GROUP).id),
            GroupRequirement::Optional => group.map(|g| g.id),
        };

        let account = match value(self.config.financial_account_attribute)
            .and_then(|v| parse_guid_value(&v))
        {
            Some(guid) => self.services.accounts.get(guid).await?,
            None => None,
        };
        let account = require!(account, INVALID_ACCOUNT);

        let frequency = match value(self.config.pledge_frequency_attribute)
            .and_then(|v| parse_guid_value(&v))
        {
            Some(guid) => self
                .services
                .defined_values
                .get(guid)
                .await?
                .filter(|dv| dv.defined_type_guid == FINANCIAL_FREQUENCY_DEFINED_TYPE),
            None => None,
        };
        let frequency = require!(frequency, INVALID_FREQUENCY);

        let start_date = require!(
            value(self.config.start_date_attribute).and_then(|v| parse_date_value(&v)),
            INVALID_START_DATE
        );
        let end_date = require!(
            value(self.config.end_date_attribute).and_then(|v| parse_date_value(&v)),
            INVALID_END_DATE
        );
        let total_amount = require!(
            value(self.config.amount_attribute)
                .and_then(|v| parse_amount_value(&v, &self.currency_symbol)),
            INVALID_AMOUNT
        );

        let pledge = FinancialPledge {
            guid: Uuid::new_v4(),
            person_alias_id: person_alias.id,
            account_id: account.id,
            group_id,
            start_date,
            end_date,
            pledge_frequency_value_id: frequency.id,
            total_amount,
        };

        context.add(Entity::Pledge(pledge.clone())).await?;
        context.commit().await?;

        info!(
            pledge = %pledge.guid,
            person_alias_id = pledge.person_alias_id,
            campus_id = ?campus_id,
            group_id = ?pledge.group_id,
            account = %account.name,
            frequency = %frequency.value,
            total_amount = %pledge.total_amount,
            "Financial pledge created"
        );
        telemetry::record_pledge_created();

        Ok(PledgeOutcome::Created { pledge, campus_id })
    }
}

#[async_trait]
impl ActionComponent for CreateFinancialPledge {
    fn name(&self) -> &'static str {
        "Financial Pledge Add"
    }

    async fn execute(
        &self,
        values: &dyn WorkflowAttributeValues,
        context: &mut dyn PersistenceContext,
    ) -> Result<ActionResult, StoreError> {
        Ok(match self.create(values, context).await? {
            PledgeOutcome::Created { .. } => ActionResult::succeeded(),
            PledgeOutcome::Rejected(message) => ActionResult::failed(message),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings_keeps_blank_keys_unset() {
        let settings = PledgeActionSettings {
            person_attribute: Some("7a1d7f5e-1c84-4c25-9a4a-6b9f0d1f0a01".to_string()),
            group_attribute: Some("  ".to_string()),
            group_requirement: GroupRequirement::Required,
            ..PledgeActionSettings::default()
        };
        let config = PledgeActionConfig::from_settings(&settings).unwrap();
        assert!(config.person_attribute.is_some());
        assert!(config.group_attribute.is_none());
        assert!(config.amount_attribute.is_none());
        assert_eq!(config.group_requirement, GroupRequirement::Required);
    }

    #[test]
    fn test_config_rejects_malformed_key() {
        let settings = PledgeActionSettings {
            amount_attribute: Some("Amount".to_string()),
            ..PledgeActionSettings::default()
        };
        assert!(PledgeActionConfig::from_settings(&settings).is_err());
    }

    #[test]
    fn test_group_requirement_deserializes_lowercase() {
        let req: GroupRequirement = serde_json::from_str("\"required\"").unwrap();
        assert_eq!(req, GroupRequirement::Required);
        assert_eq!(GroupRequirement::default(), GroupRequirement::Optional);
    }

    #[test]
    fn test_action_result_constructors() {
        assert!(ActionResult::succeeded().success);
        let failed = ActionResult::failed(INVALID_ACCOUNT);
        assert!(!failed.success);
        assert_eq!(failed.error_messages, vec![INVALID_ACCOUNT.to_string()]);
    }
}
