// Property-based and scenario tests for the group reminder SMS job

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::config::{DeliveryMode, PlatformContext};
use common::errors::{JobError, RenderError, TransportError};
use common::jobs::{
    GroupReminderConfig, GroupReminderJob, ReminderOutcome, ReminderServices, ScheduledJob,
};
use common::messaging::{CommunicationDispatcher, SmsMedium, SmsMessage, SmsTransport};
use common::models::{
    Communication, DefinedValue, Group, GroupLocation, GroupMember, GroupMemberStatus, Person,
    PersonAlias, PhoneNumber, RecipientStatus, Schedule, ScheduleKind,
    COMMUNICATION_SMS_FROM_DEFINED_TYPE, RESPONSE_RECIPIENT_ATTRIBUTE,
};
use common::repositories::memory::StoreSnapshot;
use common::repositories::InMemoryStore;
use common::substitution::{EnabledCommands, MergeTemplate};
use mockall::mock;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const ROOT_GROUP: Uuid = Uuid::from_u128(0x2c1f5a7e_3b42_4d8e_9a61_0f4c6b8d2e10);
const SMS_FROM: Uuid = Uuid::from_u128(0x8e3a1b6c_5d27_4f90_b3c4_7a1e9d2f6b31);
const SENDER_ALIAS: Uuid = Uuid::from_u128(0xd2b6e8f4_1a3c_4e57_9b20_6c8d0f2a4e60);

const TEMPLATE: &str = "Hi {{ Person.NickName }}, {{ Group.Name }} meets {{ Schedule.NextStartTime }}";

mock! {
    pub Dispatcher {}

    #[async_trait]
    impl CommunicationDispatcher for Dispatcher {
        async fn dispatch(&self, communication: &mut Communication) -> Result<(), TransportError>;
    }
}

/// Transport that remembers every (destination, body) it was asked to send
#[derive(Default)]
struct RecordingTransport {
    inactive: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsTransport for RecordingTransport {
    fn is_active(&self) -> bool {
        !self.inactive
    }

    async fn send(
        &self,
        message: &SmsMessage,
        destinations: &[String],
        _app_root: &str,
        _theme_root: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut sent = self.sent.lock().unwrap();
        for destination in destinations {
            sent.push((destination.clone(), message.body.clone()));
        }
        Ok(())
    }
}

// Wednesday noon UTC
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
}

fn platform() -> PlatformContext {
    PlatformContext {
        public_application_root: "https://www.example.org/".to_string(),
        theme_root: None,
        organization_name: "Crosspoint".to_string(),
        timezone: chrono_tz::America::Chicago,
        currency_symbol: "$".to_string(),
    }
}

fn one_time(id: i64, start_at: DateTime<Utc>) -> Schedule {
    Schedule {
        id,
        guid: Uuid::new_v4(),
        name: format!("Schedule {}", id),
        kind: ScheduleKind::OneTime { start_at },
    }
}

fn phone(digits: &str, messaging: bool, valid: bool) -> PhoneNumber {
    PhoneNumber {
        number: digits.to_string(),
        country_code: "1".to_string(),
        is_messaging_enabled: messaging,
        is_valid: valid,
    }
}

fn person(id: i64, nick_name: &str, phones: Vec<PhoneNumber>, alias: Option<i64>) -> Person {
    Person {
        id,
        guid: Uuid::new_v4(),
        nick_name: nick_name.to_string(),
        last_name: "Decker".to_string(),
        email: None,
        primary_alias_id: alias,
        phone_numbers: phones,
    }
}

fn member(group_id: i64, status: GroupMemberStatus, person: Person) -> GroupMember {
    GroupMember {
        id: group_id * 100 + person.id,
        group_id,
        status,
        person,
    }
}

fn child_group(id: i64, name: &str, schedule: Option<Schedule>, members: Vec<GroupMember>) -> Group {
    Group {
        id,
        guid: Uuid::new_v4(),
        name: name.to_string(),
        parent_group_id: Some(1),
        schedule,
        locations: vec![],
        members,
    }
}

/// Child group meeting `start` with one active member "Ted" who can receive texts
fn simple_group(id: i64, name: &str, start: DateTime<Utc>) -> Group {
    child_group(
        id,
        name,
        Some(one_time(id * 10, start)),
        vec![member(
            id,
            GroupMemberStatus::Active,
            person(id * 1000, "Ted", vec![phone("(602) 555-0123", true, true)], Some(id * 1000 + 1)),
        )],
    )
}

fn store_with(children: Vec<Group>) -> Arc<InMemoryStore> {
    let mut groups = vec![Group {
        id: 1,
        guid: ROOT_GROUP,
        name: "Small Groups".to_string(),
        parent_group_id: None,
        schedule: None,
        locations: vec![],
        members: vec![],
    }];
    groups.extend(children);

    let mut attributes = HashMap::new();
    attributes.insert(
        RESPONSE_RECIPIENT_ATTRIBUTE.to_string(),
        SENDER_ALIAS.to_string(),
    );

    Arc::new(InMemoryStore::new(StoreSnapshot {
        groups,
        people: vec![person(50, "Alisha", vec![], Some(60))],
        person_aliases: vec![PersonAlias {
            id: 60,
            guid: SENDER_ALIAS,
            person_id: 50,
        }],
        defined_values: vec![DefinedValue {
            id: 301,
            guid: SMS_FROM,
            defined_type_guid: COMMUNICATION_SMS_FROM_DEFINED_TYPE,
            value: "+16025550100".to_string(),
            attributes,
        }],
        ..StoreSnapshot::default()
    }))
}

fn config(look_ahead_days: i64, delivery: DeliveryMode) -> GroupReminderConfig {
    GroupReminderConfig {
        root_group: ROOT_GROUP,
        look_ahead_days,
        include_location_schedules: false,
        from: SMS_FROM,
        message: TEMPLATE.to_string(),
        enabled_commands: EnabledCommands::none(),
        delivery,
        save_communication: false,
    }
}

fn job(
    config: GroupReminderConfig,
    store: &Arc<InMemoryStore>,
    transport: Arc<RecordingTransport>,
    dispatcher: Arc<dyn CommunicationDispatcher>,
) -> GroupReminderJob {
    let services = ReminderServices {
        groups: store.clone(),
        people: store.clone(),
        defined_values: store.clone(),
        renderer: Arc::new(MergeTemplate::new().unwrap()),
        sms: SmsMedium::new(transport),
        dispatcher,
    };
    GroupReminderJob::new(Some(config), platform(), services)
}

fn unused_dispatcher() -> Arc<dyn CommunicationDispatcher> {
    let mut dispatcher = MockDispatcher::new();
    dispatcher.expect_dispatch().never();
    Arc::new(dispatcher)
}

async fn run_direct(
    config: GroupReminderConfig,
    store: &Arc<InMemoryStore>,
) -> (Result<ReminderOutcome, JobError>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let job = job(config, store, transport.clone(), unused_dispatcher());
    let mut context = store.context();
    (job.run_at(now(), &mut context).await, transport)
}

/// *For any* group start offset and look-ahead, the group is selected iff its
/// next start is after now and strictly before now + look-ahead days.
#[test]
fn property_group_selection_matches_cutoff() {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    proptest!(|(
        offset_hours in -48i64..240i64,
        look_ahead_days in 0i64..10i64
    )| {
        let start = now() + Duration::hours(offset_hours);
        let store = store_with(vec![simple_group(2, "Young Adults", start)]);

        let (result, transport) = runtime.block_on(run_direct(config(look_ahead_days, DeliveryMode::Direct), &store));
        let outcome = result.unwrap();

        let expected = start > now() && start < now() + Duration::days(look_ahead_days);
        prop_assert_eq!(outcome.affected_groups.contains(&"Young Adults".to_string()), expected);
        prop_assert_eq!(transport.sent().len(), usize::from(expected));
    });
}

/// *For any* mix of phone numbers, a member only receives a text when one of
/// their numbers is both messaging-enabled and valid.
#[test]
fn property_members_without_usable_number_receive_nothing() {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    proptest!(|(flags in proptest::collection::vec((any::<bool>(), any::<bool>()), 0..4))| {
        let phones: Vec<PhoneNumber> = flags
            .iter()
            .enumerate()
            .map(|(i, (messaging, valid))| phone(&format!("60255501{:02}", i), *messaging, *valid))
            .collect();
        let usable = flags.iter().any(|(messaging, valid)| *messaging && *valid);

        let group = child_group(
            2,
            "Young Adults",
            Some(one_time(20, now() + Duration::hours(6))),
            vec![member(2, GroupMemberStatus::Active, person(7, "Ted", phones, Some(70)))],
        );
        let store = store_with(vec![group]);

        let (result, transport) = runtime.block_on(run_direct(config(1, DeliveryMode::Direct), &store));
        let outcome = result.unwrap();

        prop_assert_eq!(transport.sent().len(), usize::from(usable));
        prop_assert_eq!(outcome.messaged_count, u64::from(usable));
    });
}

#[tokio::test]
async fn test_group_one_day_out_needs_two_day_look_ahead() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::days(1))]);

    let (result, transport) = run_direct(config(2, DeliveryMode::Direct), &store).await;
    assert_eq!(result.unwrap().affected_groups, vec!["Young Adults".to_string()]);
    assert_eq!(transport.sent().len(), 1);

    let (result, transport) = run_direct(config(0, DeliveryMode::Direct), &store).await;
    let outcome = result.unwrap();
    assert!(outcome.affected_groups.is_empty());
    assert_eq!(outcome.summary(), "No group members messaged.");
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_direct_send_renders_personalized_body() {
    // 2024-05-16 12:00 UTC is 7:00 AM in Chicago
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::days(1))]);

    let (result, transport) = run_direct(config(2, DeliveryMode::Direct), &store).await;
    let outcome = result.unwrap();

    assert_eq!(
        transport.sent(),
        vec![(
            "+16025550123".to_string(),
            "Hi Ted, Young Adults meets 7:00 AM".to_string()
        )]
    );
    assert_eq!(outcome.recipients.len(), 1);
    assert_eq!(outcome.recipients[0].schedule_id, Some(20));
}

#[tokio::test]
async fn test_inactive_and_pending_members_are_skipped() {
    let group = child_group(
        2,
        "Young Adults",
        Some(one_time(20, now() + Duration::hours(3))),
        vec![
            member(2, GroupMemberStatus::Active, person(7, "Ted", vec![phone("6025550101", true, true)], Some(70))),
            member(2, GroupMemberStatus::Inactive, person(8, "Noah", vec![phone("6025550102", true, true)], Some(80))),
            member(2, GroupMemberStatus::Pending, person(9, "Cindy", vec![phone("6025550103", true, true)], Some(90))),
        ],
    );
    let store = store_with(vec![group]);

    let (result, transport) = run_direct(config(1, DeliveryMode::Direct), &store).await;
    assert_eq!(result.unwrap().messaged_count, 1);
    assert_eq!(transport.sent()[0].0, "+16025550101");
}

#[tokio::test]
async fn test_rerun_within_window_sends_again() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(5))]);
    let transport = Arc::new(RecordingTransport::default());
    let job = job(config(1, DeliveryMode::Direct), &store, transport.clone(), unused_dispatcher());

    for _ in 0..2 {
        let mut context = store.context();
        job.run_at(now(), &mut context).await.unwrap();
    }

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);
}

#[tokio::test]
async fn test_summary_pluralizes_for_several_groups() {
    let store = store_with(vec![
        simple_group(2, "Young Adults", now() + Duration::hours(5)),
        simple_group(3, "Men's Breakfast", now() + Duration::hours(8)),
    ]);

    let (result, _) = run_direct(config(1, DeliveryMode::Direct), &store).await;
    assert_eq!(
        result.unwrap().summary(),
        "2 group members were attempted to be messaged in the following groups Young Adults, Men's Breakfast"
    );

    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(5))]);
    let (result, _) = run_direct(config(1, DeliveryMode::Direct), &store).await;
    assert_eq!(
        result.unwrap().summary(),
        "1 group members were attempted to be messaged in the following group Young Adults"
    );
}

#[tokio::test]
async fn test_location_schedules_only_count_when_enabled() {
    let location_schedule = Schedule {
        name: "Fellowship Hall Sunday".to_string(),
        ..one_time(30, now() + Duration::hours(4))
    };
    let mut group = simple_group(2, "Young Adults", now() + Duration::days(5));
    group.schedule = None;
    group.locations = vec![GroupLocation {
        id: 700,
        location_name: "Fellowship Hall".to_string(),
        schedules: vec![location_schedule],
    }];
    let store = store_with(vec![group]);

    let (result, transport) = run_direct(config(1, DeliveryMode::Direct), &store).await;
    assert!(result.unwrap().affected_groups.is_empty());
    assert!(transport.sent().is_empty());

    let mut with_locations = config(1, DeliveryMode::Direct);
    with_locations.include_location_schedules = true;
    let (result, transport) = run_direct(with_locations, &store).await;
    let outcome = result.unwrap();
    assert_eq!(outcome.affected_groups, vec!["Young Adults".to_string()]);
    assert_eq!(outcome.recipients[0].schedule_id, Some(30));
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_communication_mode_counts_every_eligible_member() {
    let group = child_group(
        2,
        "Young Adults",
        Some(one_time(20, now() + Duration::hours(3))),
        vec![
            member(2, GroupMemberStatus::Active, person(7, "Ted", vec![phone("6025550101", true, true)], Some(70))),
            // messaging-enabled but invalid: eligible, no usable number
            member(2, GroupMemberStatus::Active, person(8, "Noah", vec![phone("6025550102", true, false)], Some(80))),
            // usable number but no alias to address
            member(2, GroupMemberStatus::Active, person(9, "Cindy", vec![phone("6025550103", true, true)], None)),
        ],
    );
    let store = store_with(vec![group]);

    let recipient_counts = Arc::new(Mutex::new(Vec::new()));
    let seen = recipient_counts.clone();
    let mut dispatcher = MockDispatcher::new();
    dispatcher.expect_dispatch().times(1).returning(move |communication| {
        seen.lock().unwrap().push(communication.recipients.len());
        for recipient in communication.recipients.iter_mut() {
            recipient.status = RecipientStatus::Delivered;
        }
        Ok(())
    });

    let transport = Arc::new(RecordingTransport::default());
    let job = job(
        config(1, DeliveryMode::Communication),
        &store,
        transport.clone(),
        Arc::new(dispatcher),
    );
    let mut context = store.context();
    let outcome = job.run_at(now(), &mut context).await.unwrap();

    assert_eq!(outcome.messaged_count, 3);
    assert_eq!(outcome.recipients.len(), 1);
    assert_eq!(*recipient_counts.lock().unwrap(), vec![1]);
    assert!(transport.sent().is_empty());
    // not saved: the communication is removed after dispatch
    assert!(store.snapshot().await.communications.is_empty());
}

#[tokio::test]
async fn test_communication_mode_keeps_record_when_saving() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(3))]);

    let mut dispatcher = MockDispatcher::new();
    dispatcher.expect_dispatch().times(1).returning(|_| Ok(()));

    let mut cfg = config(1, DeliveryMode::Communication);
    cfg.save_communication = true;
    let job = job(cfg, &store, Arc::new(RecordingTransport::default()), Arc::new(dispatcher));
    let mut context = store.context();
    job.run_at(now(), &mut context).await.unwrap();

    let communications = store.snapshot().await.communications;
    assert_eq!(communications.len(), 1);
    assert_eq!(communications[0].message, TEMPLATE);
    assert_eq!(communications[0].sms_from_value_id, 301);
    assert_eq!(communications[0].sender_person_alias_id, 60);
    assert_eq!(
        communications[0].recipients[0].message,
        "Hi Ted, Young Adults meets 10:00 AM"
    );
}

#[tokio::test]
async fn test_dispatch_failure_is_fatal() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(3))]);

    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_dispatch()
        .times(1)
        .returning(|_| Err(TransportError::SendFailed("gateway timeout".to_string())));

    let job = job(
        config(1, DeliveryMode::Communication),
        &store,
        Arc::new(RecordingTransport::default()),
        Arc::new(dispatcher),
    );
    let mut context = store.context();
    let err = job.run_at(now(), &mut context).await.unwrap_err();
    assert!(matches!(err, JobError::Transport(TransportError::SendFailed(_))));
    // not saved: the record is removed even though the send failed
    assert!(store.snapshot().await.communications.is_empty());
}

#[tokio::test]
async fn test_dispatch_failure_keeps_saved_communication() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(3))]);

    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_dispatch()
        .times(1)
        .returning(|_| Err(TransportError::SendFailed("gateway timeout".to_string())));

    let mut cfg = config(1, DeliveryMode::Communication);
    cfg.save_communication = true;
    let job = job(cfg, &store, Arc::new(RecordingTransport::default()), Arc::new(dispatcher));
    let mut context = store.context();
    assert!(job.run_at(now(), &mut context).await.is_err());
    assert_eq!(store.snapshot().await.communications.len(), 1);
}

#[tokio::test]
async fn test_look_ahead_beyond_calendar_fails_the_run() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(3))]);

    let (result, transport) = run_direct(config(1_000_000_000, DeliveryMode::Direct), &store).await;
    assert!(matches!(result.unwrap_err(), JobError::InvalidConfiguration(_)));
    assert!(transport.sent().is_empty());

    let (result, _) = run_direct(config(-1, DeliveryMode::Direct), &store).await;
    assert!(matches!(result.unwrap_err(), JobError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn test_missing_sender_is_fatal() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(3))]);
    let mut cfg = config(1, DeliveryMode::Direct);
    cfg.from = Uuid::new_v4();

    let (result, transport) = run_direct(cfg, &store).await;
    let err = result.unwrap_err();
    assert!(matches!(err, JobError::SenderNotFound(_)));
    assert!(err.to_string().starts_with("Unable to fetch sender"));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_inactive_transport_is_fatal() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(3))]);
    let transport = Arc::new(RecordingTransport {
        inactive: true,
        ..RecordingTransport::default()
    });
    let job = job(config(1, DeliveryMode::Direct), &store, transport.clone(), unused_dispatcher());
    let mut context = store.context();

    let err = job.run_at(now(), &mut context).await.unwrap_err();
    assert_eq!(err.to_string(), "No valid SMS transport active");
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_disabled_template_command_stops_before_sending() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(3))]);
    let mut cfg = config(1, DeliveryMode::Direct);
    cfg.message = "{% execute %}rm -rf{% endexecute %} Hi {{ Person.NickName }}".to_string();

    let (result, transport) = run_direct(cfg, &store).await;
    assert!(matches!(
        result.unwrap_err(),
        JobError::Render(RenderError::CommandNotEnabled(_))
    ));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_missing_root_group_is_fatal() {
    let store = store_with(vec![]);
    let mut cfg = config(1, DeliveryMode::Direct);
    cfg.root_group = Uuid::new_v4();

    let (result, _) = run_direct(cfg, &store).await;
    assert!(matches!(result.unwrap_err(), JobError::RootGroupNotFound(_)));
}

#[tokio::test]
async fn test_unconfigured_job_reports_nothing_messaged() {
    let store = store_with(vec![simple_group(2, "Young Adults", now() + Duration::hours(3))]);
    let transport = Arc::new(RecordingTransport::default());
    let services = ReminderServices {
        groups: store.clone(),
        people: store.clone(),
        defined_values: store.clone(),
        renderer: Arc::new(MergeTemplate::new().unwrap()),
        sms: SmsMedium::new(transport.clone()),
        dispatcher: unused_dispatcher(),
    };
    let job = GroupReminderJob::new(None, platform(), services);
    let mut context = store.context();

    assert_eq!(job.name(), "Send Group Reminder SMS");
    let summary = job.execute(&mut context).await.unwrap();
    assert_eq!(summary, "No group members messaged.");
    assert!(transport.sent().is_empty());
}
