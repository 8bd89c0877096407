// Worker binary entry point
//
// Runs one operation against the fixture store and prints its result:
//   worker group-reminder [config-dir]
//   worker create-pledge [config-dir]

use anyhow::Result;
use common::config::{PlatformContext, Settings};
use common::jobs::{GroupReminderConfig, GroupReminderJob, ReminderServices, ScheduledJob};
use common::messaging::{LogSmsTransport, SmsMedium, TransportDispatcher};
use common::repositories::{InMemoryStore, StaticWorkflowValues};
use common::substitution::MergeTemplate;
use common::telemetry;
use common::workflow::{
    ActionComponent, CreateFinancialPledge, PledgeActionConfig, PledgeServices,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

const USAGE: &str = "usage: worker <group-reminder|create-pledge> [config-dir]";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let command = args.next().ok_or_else(|| anyhow::anyhow!(USAGE))?;
    let config_dir = args.next();

    // Load configuration
    let settings = match &config_dir {
        Some(dir) => Settings::load_from_path(dir),
        None => Settings::load(),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize tracing
    telemetry::init_logging(&settings.observability.log_level)?;

    info!(command = %command, config_dir = ?config_dir, "Starting worker");

    let platform = settings.platform.context().map_err(|e| {
        error!(error = %e, "Invalid platform configuration");
        anyhow::anyhow!("Platform configuration error: {}", e)
    })?;

    // Load the entity store
    let fixture_path = Path::new(&settings.store.fixture_path);
    let store = Arc::new(InMemoryStore::load_from_path(fixture_path).await.map_err(|e| {
        error!(error = %e, path = %fixture_path.display(), "Failed to load store");
        anyhow::anyhow!("Store initialization error: {}", e)
    })?);

    info!("Store loaded");

    let summary = match command.as_str() {
        "group-reminder" => run_group_reminder(&settings, platform, &store).await?,
        "create-pledge" => run_create_pledge(&settings, &platform, &store).await?,
        other => {
            error!(command = %other, "Unknown command");
            return Err(anyhow::anyhow!(USAGE));
        }
    };

    if settings.store.write_back {
        store.save_to_path(fixture_path).await.map_err(|e| {
            error!(error = %e, "Failed to write store");
            anyhow::anyhow!("Store write error: {}", e)
        })?;
    }

    info!(summary = %summary, "Worker run complete");
    println!("{}", summary);
    Ok(())
}

async fn run_group_reminder(
    settings: &Settings,
    platform: PlatformContext,
    store: &Arc<InMemoryStore>,
) -> Result<String> {
    let config = GroupReminderConfig::from_settings(&settings.group_reminder)
        .map_err(|e| anyhow::anyhow!("Group reminder configuration error: {}", e))?;

    let renderer = MergeTemplate::new()
        .map_err(|e| anyhow::anyhow!("Template renderer initialization error: {}", e))?;
    let sms = SmsMedium::new(Arc::new(LogSmsTransport));
    let dispatcher = TransportDispatcher::new(
        sms.clone(),
        platform.public_application_root.clone(),
        platform.theme_root.clone(),
    );

    let services = ReminderServices {
        groups: store.clone(),
        people: store.clone(),
        defined_values: store.clone(),
        renderer: Arc::new(renderer),
        sms,
        dispatcher: Arc::new(dispatcher),
    };

    let job = GroupReminderJob::new(config, platform, services);
    let mut context = store.context();

    info!(job = job.name(), "Executing job");
    job.execute(&mut context).await.map_err(|e| {
        error!(error = %e, job = job.name(), "Job failed");
        anyhow::anyhow!("{} failed: {}", job.name(), e)
    })
}

async fn run_create_pledge(
    settings: &Settings,
    platform: &PlatformContext,
    store: &Arc<InMemoryStore>,
) -> Result<String> {
    let config = PledgeActionConfig::from_settings(&settings.pledge)
        .map_err(|e| anyhow::anyhow!("Pledge action configuration error: {}", e))?;
    let values = StaticWorkflowValues::from_string_map(&settings.pledge.workflow_values)
        .map_err(|e| anyhow::anyhow!("Workflow values error: {}", e))?;

    let services = PledgeServices {
        people: store.clone(),
        campuses: store.clone(),
        groups: store.clone(),
        accounts: store.clone(),
        defined_values: store.clone(),
    };
    let action = CreateFinancialPledge::new(config, services, platform.currency_symbol.clone());
    let mut context = store.context();

    info!(action = action.name(), "Executing workflow action");
    let result = action.execute(&values, &mut context).await.map_err(|e| {
        error!(error = %e, action = action.name(), "Workflow action failed");
        anyhow::anyhow!("{} failed: {}", action.name(), e)
    })?;

    if result.success {
        Ok("Financial pledge created.".to_string())
    } else {
        Ok(result.error_messages.join("\n"))
    }
}
