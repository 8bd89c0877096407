// Merge-field builders for reminder templates

use super::{merge_field_maps, MergeFields};
use crate::config::PlatformContext;
use crate::models::{Group, GroupMember, GroupMemberStatus, Person, Schedule};
use crate::schedule::NextOccurrence;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use std::collections::HashMap;

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Platform-wide fields available to every template
pub fn common_merge_fields(platform: &PlatformContext, now: DateTime<Utc>) -> MergeFields {
    let mut fields = HashMap::new();
    fields.insert(
        "OrganizationName".to_string(),
        json!(platform.organization_name),
    );
    fields.insert(
        "PublicApplicationRoot".to_string(),
        json!(platform.public_application_root),
    );
    fields.insert(
        "Now".to_string(),
        json!(now
            .with_timezone(&platform.timezone)
            .format(DATE_TIME_FORMAT)
            .to_string()),
    );
    fields
}

pub fn group_value(group: &Group) -> Value {
    json!({
        "Id": group.id,
        "Guid": group.guid.to_string(),
        "Name": group.name,
        "ParentGroupId": group.parent_group_id,
        "MemberCount": group.members.len(),
    })
}

pub fn person_value(person: &Person) -> Value {
    json!({
        "Id": person.id,
        "Guid": person.guid.to_string(),
        "NickName": person.nick_name,
        "LastName": person.last_name,
        "FullName": person.full_name(),
        "Email": person.email,
        "PrimaryAliasId": person.primary_alias_id,
    })
}

pub fn group_member_value(member: &GroupMember) -> Value {
    let status = match member.status {
        GroupMemberStatus::Active => "Active",
        GroupMemberStatus::Inactive => "Inactive",
        GroupMemberStatus::Pending => "Pending",
    };
    json!({
        "Id": member.id,
        "GroupId": member.group_id,
        "GroupMemberStatus": status,
        "Person": person_value(&member.person),
    })
}

/// Schedule fields, with the next start rendered in the platform timezone
pub fn schedule_value(schedule: Option<&Schedule>, now: DateTime<Utc>, timezone: Tz) -> Value {
    let schedule = match schedule {
        Some(s) => s,
        None => return Value::Null,
    };
    let next = schedule.next_start(now).map(|t| t.with_timezone(&timezone));
    json!({
        "Id": schedule.id,
        "Guid": schedule.guid.to_string(),
        "Name": schedule.name,
        "NextStartDateTime": next.map(|t| t.format(DATE_TIME_FORMAT).to_string()),
        "NextStartDate": next.map(|t| t.format("%A, %B %-d").to_string()),
        "NextStartTime": next.map(|t| t.format("%-I:%M %p").to_string()),
    })
}

/// Fields for one reminder: Group, GroupMember, Person, Schedule over the common fields
pub fn reminder_merge_fields(
    common: &MergeFields,
    group: &Group,
    member: &GroupMember,
    schedule: Option<&Schedule>,
    now: DateTime<Utc>,
    timezone: Tz,
) -> MergeFields {
    let mut specific = HashMap::new();
    specific.insert("Group".to_string(), group_value(group));
    specific.insert("GroupMember".to_string(), group_member_value(member));
    specific.insert("Person".to_string(), person_value(&member.person));
    specific.insert(
        "Schedule".to_string(),
        schedule_value(schedule, now, timezone),
    );
    merge_field_maps(common.clone(), specific)
}
