// Group reminder SMS job
//
// Finds child groups of a root group that meet within the look-ahead window
// and texts a personalized reminder to every active member with a usable
// mobile number.

use super::ScheduledJob;
use crate::config::{DeliveryMode, GroupReminderSettings, PlatformContext};
use crate::errors::{JobError, ValidationError};
use crate::messaging::{CommunicationDispatcher, SmsMedium, SmsMessage, SmsTransport};
use crate::models::{
    Communication, CommunicationRecipient, CommunicationStatus, Group, GroupMember,
    GroupMemberStatus, Person, RecipientStatus, Schedule, COMMUNICATION_SMS_FROM_DEFINED_TYPE,
    RESPONSE_RECIPIENT_ATTRIBUTE,
};
use crate::repositories::{
    DefinedValueRepository, Entity, GroupRepository, PersistenceContext, PersonRepository,
};
use crate::schedule::{is_due_before, representative_schedule};
use crate::substitution::merge_fields::{common_merge_fields, reminder_merge_fields};
use crate::substitution::{EnabledCommands, MergeFields, TemplateRenderer};
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Typed configuration for [`GroupReminderJob`]
#[derive(Debug, Clone)]
pub struct GroupReminderConfig {
    pub root_group: Uuid,
    pub look_ahead_days: i64,
    pub include_location_schedules: bool,
    pub from: Uuid,
    pub message: String,
    pub enabled_commands: EnabledCommands,
    pub delivery: DeliveryMode,
    pub save_communication: bool,
}

impl GroupReminderConfig {
    /// Validate the raw job data map.
    ///
    /// Returns `Ok(None)` when the root group, from number or message is blank:
    /// the job is not configured and a run does nothing.
    pub fn from_settings(settings: &GroupReminderSettings) -> Result<Option<Self>, ValidationError> {
        let (root_group, from, message) = match (
            non_blank(&settings.root_group),
            non_blank(&settings.from),
            non_blank(&settings.message),
        ) {
            (Some(root), Some(from), Some(message)) => (root, from, message),
            _ => return Ok(None),
        };

        Ok(Some(Self {
            root_group: parse_guid("group_reminder.root_group", root_group)?,
            look_ahead_days: look_ahead_days(settings.look_ahead)?,
            include_location_schedules: !settings.ignore_group_locations,
            from: parse_guid("group_reminder.from", from)?,
            message: message.to_string(),
            enabled_commands: settings
                .enabled_commands
                .as_deref()
                .map(EnabledCommands::parse)
                .unwrap_or_default(),
            delivery: settings.delivery,
            save_communication: settings.save_communication,
        }))
    }
}

/// Missing means 0 days; negative or unrepresentable spans are rejected
fn look_ahead_days(value: Option<i64>) -> Result<i64, ValidationError> {
    let days = value.unwrap_or(0);
    if days < 0 || Duration::try_days(days).is_none() {
        return Err(look_ahead_out_of_range(days));
    }
    Ok(days)
}

fn look_ahead_out_of_range(days: i64) -> ValidationError {
    ValidationError::InvalidFieldValue {
        field: "group_reminder.look_ahead".to_string(),
        reason: format!("{} days is out of range", days),
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn parse_guid(field: &str, value: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(value.trim()).map_err(|e| ValidationError::InvalidFieldValue {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Collaborators the job reads from and sends through
#[derive(Clone)]
pub struct ReminderServices {
    pub groups: Arc<dyn GroupRepository>,
    pub people: Arc<dyn PersonRepository>,
    pub defined_values: Arc<dyn DefinedValueRepository>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub sms: SmsMedium,
    pub dispatcher: Arc<dyn CommunicationDispatcher>,
}

/// One member addressed by a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderRecipient {
    pub person_id: i64,
    pub group_id: i64,
    pub schedule_id: Option<i64>,
    pub number: String,
    pub body: String,
}

/// Result of one run
#[derive(Debug, Clone, Default)]
pub struct ReminderOutcome {
    pub messaged_count: u64,
    /// Names of every group that met within the window, in iteration order
    pub affected_groups: Vec<String>,
    pub recipients: Vec<ReminderRecipient>,
}

impl ReminderOutcome {
    /// Result text reported back to the job scheduler
    pub fn summary(&self) -> String {
        if self.affected_groups.is_empty() {
            return "No group members messaged.".to_string();
        }
        let noun = if self.affected_groups.len() > 1 {
            "groups"
        } else {
            "group"
        };
        format!(
            "{} group members were attempted to be messaged in the following {} {}",
            self.messaged_count,
            noun,
            self.affected_groups.join(", ")
        )
    }
}

/// Who the reminders come from
struct Sender {
    from_value_id: i64,
    person_alias_id: i64,
    person: Person,
}

pub struct GroupReminderJob {
    config: Option<GroupReminderConfig>,
    platform: PlatformContext,
    services: ReminderServices,
}

impl GroupReminderJob {
    pub fn new(
        config: Option<GroupReminderConfig>,
        platform: PlatformContext,
        services: ReminderServices,
    ) -> Self {
        Self {
            config,
            platform,
            services,
        }
    }

    /// Run the job as of `now`
    #[instrument(skip(self, context), fields(job = self.name()))]
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        context: &mut dyn PersistenceContext,
    ) -> Result<ReminderOutcome, JobError> {
        let config = match &self.config {
            Some(config) => config,
            None => {
                info!("Group reminder job is not configured, nothing to do");
                telemetry::record_reminder_run("not_configured");
                return Ok(ReminderOutcome::default());
            }
        };

        let cutoff = Duration::try_days(config.look_ahead_days)
            .filter(|span| *span >= Duration::zero())
            .and_then(|span| now.checked_add_signed(span))
            .ok_or_else(|| look_ahead_out_of_range(config.look_ahead_days))?;
        let due_groups = self.find_due_groups(config, now, cutoff).await?;

        if due_groups.is_empty() {
            info!(cutoff = %cutoff, "No groups meet within the look-ahead window");
            telemetry::record_reminder_run("no_groups");
            return Ok(ReminderOutcome::default());
        }

        let sender = self.resolve_sender(config.from).await?;
        self.services
            .renderer
            .check(&config.message, &config.enabled_commands)?;
        let transport = match config.delivery {
            DeliveryMode::Direct => Some(self.services.sms.active_transport()?),
            DeliveryMode::Communication => None,
        };

        info!(
            groups = due_groups.len(),
            sender = %sender.person.full_name(),
            delivery = ?config.delivery,
            "Sending group reminders"
        );

        let common = common_merge_fields(&self.platform, now);
        let mut outcome = ReminderOutcome {
            affected_groups: due_groups.iter().map(|g| g.to_string()).collect(),
            ..ReminderOutcome::default()
        };

        for group in &due_groups {
            let members: Vec<&GroupMember> = group
                .members
                .iter()
                .filter(|m| {
                    m.status == GroupMemberStatus::Active && m.person.has_messaging_number()
                })
                .collect();
            if members.is_empty() {
                continue;
            }

            let schedule = representative_schedule(group, now);
            let before = outcome.messaged_count;

            match &transport {
                Some(transport) => {
                    self.send_direct(
                        config,
                        &**transport,
                        &sender,
                        &common,
                        group,
                        &members,
                        schedule,
                        now,
                        &mut outcome,
                    )
                    .await?;
                }
                None => {
                    self.send_communication(
                        config, context, &sender, &common, group, &members, schedule, now,
                        &mut outcome,
                    )
                    .await?;
                }
            }

            let sent = outcome.messaged_count - before;
            info!(group = %group, eligible = members.len(), counted = sent, "Group processed");
            telemetry::record_reminder_messages(&group.name, sent);
        }

        telemetry::record_reminder_run("messaged");
        Ok(outcome)
    }

    /// Direct children of the root group meeting before `cutoff`
    async fn find_due_groups(
        &self,
        config: &GroupReminderConfig,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Group>, JobError> {
        let root = self
            .services
            .groups
            .get(config.root_group)
            .await?
            .ok_or_else(|| JobError::RootGroupNotFound(config.root_group.to_string()))?;

        let children = self.services.groups.child_groups(root.id).await?;
        Ok(children
            .into_iter()
            .filter(|g| is_due_before(g, cutoff, config.include_location_schedules, now))
            .collect())
    }

    /// Resolve the "From" number and the person who receives replies to it
    async fn resolve_sender(&self, from: Uuid) -> Result<Sender, JobError> {
        let from_value = self
            .services
            .defined_values
            .get(from)
            .await?
            .filter(|v| v.defined_type_guid == COMMUNICATION_SMS_FROM_DEFINED_TYPE)
            .ok_or_else(|| JobError::SenderNotFound(format!("SMS from value {}", from)))?;

        let alias_guid = from_value
            .attributes
            .get(RESPONSE_RECIPIENT_ATTRIBUTE)
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or_else(|| {
                JobError::SenderNotFound(format!(
                    "{} has no {} attribute",
                    from_value.value, RESPONSE_RECIPIENT_ATTRIBUTE
                ))
            })?;

        let alias = self
            .services
            .people
            .get_alias(alias_guid)
            .await?
            .ok_or_else(|| JobError::SenderNotFound(format!("person alias {}", alias_guid)))?;

        let person = self
            .services
            .people
            .get_person(alias.person_id)
            .await?
            .ok_or_else(|| JobError::SenderNotFound(format!("person {}", alias.person_id)))?;

        Ok(Sender {
            from_value_id: from_value.id,
            person_alias_id: alias.id,
            person,
        })
    }

    fn render(
        &self,
        config: &GroupReminderConfig,
        common: &MergeFields,
        group: &Group,
        member: &GroupMember,
        schedule: Option<&Schedule>,
        now: DateTime<Utc>,
    ) -> Result<String, JobError> {
        let fields =
            reminder_merge_fields(common, group, member, schedule, now, self.platform.timezone);
        Ok(self
            .services
            .renderer
            .render(&config.message, &fields, &config.enabled_commands)?)
    }

    /// One SMS per member; only members with a usable number are counted
    #[allow(clippy::too_many_arguments)]
    async fn send_direct(
        &self,
        config: &GroupReminderConfig,
        transport: &dyn SmsTransport,
        sender: &Sender,
        common: &MergeFields,
        group: &Group,
        members: &[&GroupMember],
        schedule: Option<&Schedule>,
        now: DateTime<Utc>,
        outcome: &mut ReminderOutcome,
    ) -> Result<(), JobError> {
        for member in members {
            let number = match member.person.sms_number() {
                Some(pn) => pn.formatted_with_country_code(),
                None => continue,
            };

            let body = self.render(config, common, group, member, schedule, now)?;
            let message = SmsMessage {
                from_value_id: sender.from_value_id,
                body,
            };
            transport
                .send(
                    &message,
                    std::slice::from_ref(&number),
                    &self.platform.public_application_root,
                    self.platform.theme_root.as_deref(),
                )
                .await?;

            outcome.messaged_count += 1;
            outcome.recipients.push(ReminderRecipient {
                person_id: member.person.id,
                group_id: group.id,
                schedule_id: schedule.map(|s| s.id),
                number,
                body: message.body,
            });
        }
        Ok(())
    }

    /// One communication per group. Every eligible member is counted, even
    /// those skipped for lack of a usable number or alias.
    #[allow(clippy::too_many_arguments)]
    async fn send_communication(
        &self,
        config: &GroupReminderConfig,
        context: &mut dyn PersistenceContext,
        sender: &Sender,
        common: &MergeFields,
        group: &Group,
        members: &[&GroupMember],
        schedule: Option<&Schedule>,
        now: DateTime<Utc>,
        outcome: &mut ReminderOutcome,
    ) -> Result<(), JobError> {
        let mut recipients = Vec::new();

        for member in members {
            outcome.messaged_count += 1;

            let number = match member.person.sms_number() {
                Some(pn) => pn.formatted_with_country_code(),
                None => continue,
            };
            let person_alias_id = match member.person.primary_alias_id {
                Some(id) => id,
                None => continue,
            };

            let body = self.render(config, common, group, member, schedule, now)?;
            outcome.recipients.push(ReminderRecipient {
                person_id: member.person.id,
                group_id: group.id,
                schedule_id: schedule.map(|s| s.id),
                number: number.clone(),
                body: body.clone(),
            });
            recipients.push(CommunicationRecipient {
                person_alias_id,
                number,
                message: body,
                status: RecipientStatus::Pending,
            });
        }

        if recipients.is_empty() {
            return Ok(());
        }

        let mut communication = Communication {
            guid: Uuid::new_v4(),
            sender_person_alias_id: sender.person_alias_id,
            sms_from_value_id: sender.from_value_id,
            message: config.message.clone(),
            status: CommunicationStatus::Approved,
            recipients,
        };

        let key = context
            .add(Entity::Communication(communication.clone()))
            .await?;
        context.commit().await?;

        let dispatched = self.services.dispatcher.dispatch(&mut communication).await;

        // An unsaved communication is removed whether or not the send went through
        if !config.save_communication {
            context.delete(key).await?;
            context.commit().await?;
        }
        dispatched?;
        communication.status = CommunicationStatus::Sent;

        info!(
            communication = %communication.guid,
            recipients = communication.recipients.len(),
            saved = config.save_communication,
            "Communication sent"
        );
        Ok(())
    }
}

#[async_trait]
impl ScheduledJob for GroupReminderJob {
    fn name(&self) -> &'static str {
        "Send Group Reminder SMS"
    }

    async fn execute(&self, context: &mut dyn PersistenceContext) -> Result<String, JobError> {
        match self.run_at(Utc::now(), context).await {
            Ok(outcome) => Ok(outcome.summary()),
            Err(e) => {
                tracing::error!(error = %e, "Group reminder job failed");
                telemetry::record_reminder_run("failed");
                Err(e)
            }
        }
    }
}
