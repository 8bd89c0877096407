use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Defined type holding the SMS "From" numbers
pub const COMMUNICATION_SMS_FROM_DEFINED_TYPE: Uuid =
    Uuid::from_u128(0x611BDE1F_7405_4D16_8626_CCFEDB0E62BE);

/// Defined type holding pledge frequencies (weekly, monthly, ...)
pub const FINANCIAL_FREQUENCY_DEFINED_TYPE: Uuid =
    Uuid::from_u128(0x059F69C0_BF9B_4D53_B7CD_2D3B7C647C5F);

/// Attribute on an SMS "From" defined value naming the person alias that receives replies
pub const RESPONSE_RECIPIENT_ATTRIBUTE: &str = "ResponseRecipient";

// Helper functions for Tz serialization
fn serialize_tz<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(tz.name())
}

fn deserialize_tz<'de, D>(deserializer: D) -> Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Tz::from_str(&s).map_err(serde::de::Error::custom)
}

// ============================================================================
// Group Models
// ============================================================================

/// Schedule a group (or one of its locations) meets on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub guid: Uuid,
    pub name: String,
    pub kind: ScheduleKind,
}

/// ScheduleKind defines how occurrences are generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleKind {
    Cron {
        expression: String,
        #[serde(serialize_with = "serialize_tz", deserialize_with = "deserialize_tz")]
        timezone: Tz,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_date: Option<DateTime<Utc>>,
    },
    Weekly {
        day_of_week: Weekday,
        /// Local meeting time, `HH:MM`
        time_of_day: String,
        #[serde(serialize_with = "serialize_tz", deserialize_with = "deserialize_tz")]
        timezone: Tz,
    },
    OneTime {
        start_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub guid: Uuid,
    pub name: String,
    #[serde(default)]
    pub parent_group_id: Option<i64>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub locations: Vec<GroupLocation>,
    #[serde(default)]
    pub members: Vec<GroupMember>,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupLocation {
    pub id: i64,
    pub location_name: String,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMemberStatus {
    Inactive,
    Active,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: i64,
    pub group_id: i64,
    pub status: GroupMemberStatus,
    pub person: Person,
}

// ============================================================================
// Person Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub guid: Uuid,
    pub nick_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub primary_alias_id: Option<i64>,
    #[serde(default)]
    pub phone_numbers: Vec<PhoneNumber>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.nick_name, self.last_name)
    }

    /// Whether any number on file may receive text messages
    pub fn has_messaging_number(&self) -> bool {
        self.phone_numbers.iter().any(|pn| pn.is_messaging_enabled)
    }

    /// First number that is both messaging-enabled and valid
    pub fn sms_number(&self) -> Option<&PhoneNumber> {
        self.phone_numbers
            .iter()
            .find(|pn| pn.is_messaging_enabled && pn.is_valid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub number: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default)]
    pub is_messaging_enabled: bool,
    #[serde(default = "default_is_valid")]
    pub is_valid: bool,
}

fn default_country_code() -> String {
    "1".to_string()
}

fn default_is_valid() -> bool {
    true
}

impl PhoneNumber {
    /// Digits-only number prefixed with `+` and the country code
    pub fn formatted_with_country_code(&self) -> String {
        let digits: String = self.number.chars().filter(char::is_ascii_digit).collect();
        format!("+{}{}", self.country_code, digits)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonAlias {
    pub id: i64,
    pub guid: Uuid,
    pub person_id: i64,
}

// ============================================================================
// Lookup Models
// ============================================================================

/// A value from a platform-defined list (SMS numbers, pledge frequencies, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinedValue {
    pub id: i64,
    pub guid: Uuid,
    pub defined_type_guid: Uuid,
    pub value: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campus {
    pub id: i64,
    pub guid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialAccount {
    pub id: i64,
    pub guid: Uuid,
    pub name: String,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

// ============================================================================
// Persisted Output Models
// ============================================================================

/// Commitment to give `total_amount` to an account over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialPledge {
    pub guid: Uuid,
    pub person_alias_id: i64,
    pub account_id: i64,
    #[serde(default)]
    pub group_id: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pledge_frequency_value_id: i64,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStatus {
    Approved,
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Delivered,
}

/// Outbound SMS communication addressed to one or more people
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    pub guid: Uuid,
    pub sender_person_alias_id: i64,
    pub sms_from_value_id: i64,
    pub message: String,
    pub status: CommunicationStatus,
    pub recipients: Vec<CommunicationRecipient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationRecipient {
    pub person_alias_id: i64,
    pub number: String,
    /// Body rendered for this recipient
    pub message: String,
    pub status: RecipientStatus,
}
