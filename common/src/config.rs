// Configuration management with layered configuration (file, env)

use crate::errors::ValidationError;
use crate::workflow::create_pledge::GroupRequirement;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub observability: ObservabilityConfig,
    pub store: StoreConfig,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub group_reminder: GroupReminderSettings,
    #[serde(default)]
    pub pledge: PledgeActionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

/// Where the runner loads its entity snapshot from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub fixture_path: String,
    #[serde(default)]
    pub write_back: bool,
}

/// Host platform values exposed to templates and transports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub public_application_root: String,
    #[serde(default)]
    pub theme_root: Option<String>,
    pub organization_name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

fn default_timezone() -> String {
    "America/Chicago".to_string()
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

/// Typed view of [`PlatformConfig`] handed to operations
#[derive(Debug, Clone)]
pub struct PlatformContext {
    pub public_application_root: String,
    pub theme_root: Option<String>,
    pub organization_name: String,
    pub timezone: Tz,
    pub currency_symbol: String,
}

impl PlatformConfig {
    pub fn context(&self) -> Result<PlatformContext, ValidationError> {
        let timezone =
            Tz::from_str(&self.timezone).map_err(|e| ValidationError::InvalidFieldValue {
                field: "platform.timezone".to_string(),
                reason: e.to_string(),
            })?;

        Ok(PlatformContext {
            public_application_root: self.public_application_root.clone(),
            theme_root: self.theme_root.clone(),
            organization_name: self.organization_name.clone(),
            timezone,
            currency_symbol: self.currency_symbol.clone(),
        })
    }
}

/// How reminders leave the system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Send one SMS per member straight through the transport
    #[default]
    Direct,
    /// Build one communication record per group and dispatch it
    Communication,
}

/// Raw job data map for the group reminder job.
///
/// Every field is optional here; [`crate::jobs::group_reminder::GroupReminderConfig`]
/// turns it into a typed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReminderSettings {
    #[serde(default)]
    pub root_group: Option<String>,
    #[serde(default)]
    pub look_ahead: Option<i64>,
    #[serde(default = "default_ignore_group_locations")]
    pub ignore_group_locations: bool,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub enabled_commands: Option<String>,
    #[serde(default)]
    pub delivery: DeliveryMode,
    #[serde(default)]
    pub save_communication: bool,
}

fn default_ignore_group_locations() -> bool {
    true
}

impl Default for GroupReminderSettings {
    fn default() -> Self {
        Self {
            root_group: None,
            look_ahead: None,
            ignore_group_locations: default_ignore_group_locations(),
            from: None,
            message: None,
            enabled_commands: None,
            delivery: DeliveryMode::default(),
            save_communication: false,
        }
    }
}

/// Attribute keys for the create-pledge workflow action
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PledgeActionSettings {
    #[serde(default)]
    pub person_attribute: Option<String>,
    #[serde(default)]
    pub campus_attribute: Option<String>,
    #[serde(default)]
    pub group_attribute: Option<String>,
    #[serde(default)]
    pub financial_account_attribute: Option<String>,
    #[serde(default)]
    pub amount_attribute: Option<String>,
    #[serde(default)]
    pub start_date_attribute: Option<String>,
    #[serde(default)]
    pub end_date_attribute: Option<String>,
    #[serde(default)]
    pub pledge_frequency_attribute: Option<String>,
    #[serde(default)]
    pub group_requirement: GroupRequirement,
    /// Workflow attribute values keyed by attribute guid, used by the runner
    #[serde(default)]
    pub workflow_values: HashMap<String, String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.observability.log_level.is_empty() {
            return Err("Observability log_level cannot be empty".to_string());
        }

        if self.store.fixture_path.is_empty() {
            return Err("Store fixture_path cannot be empty".to_string());
        }

        if self.platform.public_application_root.is_empty() {
            return Err("Platform public_application_root cannot be empty".to_string());
        }
        if Tz::from_str(&self.platform.timezone).is_err() {
            return Err(format!(
                "Platform timezone '{}' is not a valid IANA timezone",
                self.platform.timezone
            ));
        }

        if let Some(look_ahead) = self.group_reminder.look_ahead {
            if look_ahead < 0 {
                return Err("Group reminder look_ahead cannot be negative".to_string());
            }
        }
        for (field, value) in [
            ("group_reminder.root_group", &self.group_reminder.root_group),
            ("group_reminder.from", &self.group_reminder.from),
        ] {
            check_guid(field, value)?;
        }

        for (field, value) in [
            ("pledge.person_attribute", &self.pledge.person_attribute),
            ("pledge.campus_attribute", &self.pledge.campus_attribute),
            ("pledge.group_attribute", &self.pledge.group_attribute),
            (
                "pledge.financial_account_attribute",
                &self.pledge.financial_account_attribute,
            ),
            ("pledge.amount_attribute", &self.pledge.amount_attribute),
            ("pledge.start_date_attribute", &self.pledge.start_date_attribute),
            ("pledge.end_date_attribute", &self.pledge.end_date_attribute),
            (
                "pledge.pledge_frequency_attribute",
                &self.pledge.pledge_frequency_attribute,
            ),
        ] {
            check_guid(field, value)?;
        }

        Ok(())
    }
}

/// Blank values are allowed (they mean "not configured"); anything else must be a guid
fn check_guid(field: &str, value: &Option<String>) -> Result<(), String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() && Uuid::parse_str(v).is_err() => {
            Err(format!("{} must be a guid, got '{}'", field, v))
        }
        _ => Ok(()),
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
            },
            store: StoreConfig {
                fixture_path: "data/store.json".to_string(),
                write_back: false,
            },
            platform: PlatformConfig {
                public_application_root: "http://localhost/".to_string(),
                theme_root: None,
                organization_name: "Our Church".to_string(),
                timezone: default_timezone(),
                currency_symbol: default_currency_symbol(),
            },
            group_reminder: GroupReminderSettings::default(),
            pledge: PledgeActionSettings::default(),
        }
    }
}
