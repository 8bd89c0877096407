// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting
///
/// `RUST_LOG` takes precedence over the configured `log_level`.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    describe_metrics();

    tracing::info!(
        log_level = log_level,
        "Structured logging initialized with JSON formatting"
    );

    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "reminder_job_runs_total",
        "Group reminder job runs, labelled by outcome"
    );
    describe_counter!(
        "reminder_messages_total",
        "Group members counted as messaged by the reminder job"
    );
    describe_counter!("pledges_created_total", "Financial pledges persisted");
    describe_counter!(
        "pledge_action_failures_total",
        "Create-pledge actions that stopped on a validation error"
    );
}

#[inline]
pub fn record_reminder_run(outcome: &'static str) {
    counter!("reminder_job_runs_total", "outcome" => outcome).increment(1);
}

#[inline]
pub fn record_reminder_messages(group_name: &str, count: u64) {
    counter!("reminder_messages_total", "group" => group_name.to_string()).increment(count);
}

#[inline]
pub fn record_pledge_created() {
    counter!("pledges_created_total").increment(1);
}

#[inline]
pub fn record_pledge_failure(reason: &'static str) {
    counter!("pledge_action_failures_total", "reason" => reason).increment(1);
}
