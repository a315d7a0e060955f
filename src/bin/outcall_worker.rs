//! Background worker for outbound-call campaigns.
//!
//! Usage:
//!
//! ```text
//! outcall-worker [--config <path>] run
//! outcall-worker [--config <path>] sweep
//! outcall-worker [--config <path>] diagnose <campaign-id>
//! ```
//!
//! `run` starts the named work queues plus the recurring sweep and stops on
//! Ctrl-C. `sweep` polls every active campaign once. `diagnose` writes the
//! campaign's diagnostic envelope to stdout as JSON.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mockable::DefaultClock;
use outcall::api::CampaignOperations;
use outcall::cache::TtlStatsCache;
use outcall::campaign::{
    adapters::PostgresCampaignStore,
    domain::CampaignId,
    services::{CampaignLifecycleService, CampaignStatsService},
};
use outcall::classifier::{adapters::OpenAiCompatibleClassifier, domain::PromptTemplate};
use outcall::config::OutcallConfig;
use outcall::provider::adapters::HttpCallProvider;
use outcall::reconcile::{FollowUpGenerator, IdentitySync, ReconcileSettings, StatusReconciler};
use outcall::retry::RetryPolicy;
use outcall::scheduler::{
    Orchestrator, OrchestratorParts, PollSchedule, QueueSettings, WorkQueues, run_sweep_loop,
};
use outcall::telemetry::init_tracing;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

type WorkerOrchestrator =
    Orchestrator<PostgresCampaignStore, HttpCallProvider, OpenAiCompatibleClassifier, DefaultClock>;

#[derive(Debug, Parser)]
#[command(name = "outcall-worker", about = "Reconciles outbound-call campaigns")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run queue workers and the recurring sweep until Ctrl-C.
    Run,
    /// Poll every calling or completed campaign once.
    Sweep,
    /// Print stage counts, unbound assignments and poll-run state.
    Diagnose {
        /// Campaign identifier.
        campaign_id: Uuid,
    },
}

struct Components {
    store: Arc<PostgresCampaignStore>,
    provider: Arc<HttpCallProvider>,
    clock: Arc<DefaultClock>,
    orchestrator: Arc<WorkerOrchestrator>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = OutcallConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.logging)?;
    let components = build(&config)?;

    match cli.command {
        Command::Run => run(&config, &components).await,
        Command::Sweep => {
            let report = components.orchestrator.sweep().await?;
            info!(
                campaigns = report.campaigns,
                passes = report.passes,
                busy = report.busy,
                failed = report.failed,
                "one-off sweep done"
            );
            Ok(())
        }
        Command::Diagnose { campaign_id } => {
            diagnose(&config, components, CampaignId::from_uuid(campaign_id)).await
        }
    }
}

fn build(config: &OutcallConfig) -> Result<Components> {
    let Some(database_url) = config.database.url.as_deref() else {
        bail!("database.url is not configured; set it or OUTCALL_DATABASE_URL");
    };
    let store = Arc::new(PostgresCampaignStore::connect(
        database_url,
        config.database.max_connections,
    )?);
    let provider = Arc::new(HttpCallProvider::from_config(&config.provider)?);
    let classifier = Arc::new(OpenAiCompatibleClassifier::from_config(&config.classifier)?);
    let clock = Arc::new(DefaultClock);

    let identity = IdentitySync::new(
        Arc::clone(&store),
        Arc::clone(&provider),
        Arc::clone(&clock),
        RetryPolicy::new(config.reconcile.max_attempts, config.reconcile.retry_delay()),
        config.reconcile.page_size,
    );
    let status = StatusReconciler::new(
        Arc::clone(&store),
        Arc::clone(&provider),
        Arc::clone(&clock),
        ReconcileSettings::from_config(&config.reconcile),
    );
    let generator = FollowUpGenerator::new(Arc::clone(&store), classifier, Arc::clone(&clock))
        .with_retry(RetryPolicy::new(
            config.classifier.max_attempts,
            config.classifier.retry_delay(),
        ));
    let follow_ups = match &config.classifier.prompt_template {
        Some(source) => generator.with_template(PromptTemplate::new(source.as_str())),
        None => generator,
    };
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        OrchestratorParts {
            identity,
            status,
            follow_ups,
            page_size: config.reconcile.page_size,
            stale_after: config.poll_run.stale_after(),
        },
    ));

    Ok(Components {
        store,
        provider,
        clock,
        orchestrator,
    })
}

async fn run(config: &OutcallConfig, components: &Components) -> Result<()> {
    let cancel = CancellationToken::new();
    let queues = WorkQueues::start(
        &components.orchestrator,
        QueueSettings::from_config(&config.queues),
        cancel.clone(),
    );
    components.orchestrator.attach_queues(&queues);
    let schedule = PollSchedule::from_config(&config.schedule);
    info!(
        workers_per_queue = config.queues.workers_per_queue,
        sweep_interval_secs = schedule.sweep_interval().as_secs(),
        "worker started"
    );

    tokio::select! {
        () = run_sweep_loop(&queues, schedule.sweep_interval(), &cancel) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("shutdown requested");
        }
    }
    queues.shutdown().await;
    info!("worker stopped");
    Ok(())
}

async fn diagnose(
    config: &OutcallConfig,
    components: Components,
    campaign_id: CampaignId,
) -> Result<()> {
    let Components {
        store,
        provider,
        clock,
        orchestrator,
    } = components;
    let lifecycle = CampaignLifecycleService::new(Arc::clone(&store), provider, Arc::clone(&clock))
        .with_strategy(config.provider.strategy.clone());
    let stats = CampaignStatsService::new(
        Arc::clone(&store),
        Arc::new(TtlStatsCache::new(config.cache.stats_ttl(), clock)),
    );
    let operations = CampaignOperations::new(store, lifecycle, orchestrator, stats);

    let envelope = operations.diagnose(campaign_id).await;
    let body = serde_json::to_string_pretty(&envelope).context("encoding diagnosis")?;
    writeln!(io::stdout().lock(), "{body}").context("writing diagnosis")?;
    if !envelope.is_success() {
        bail!("diagnose failed with {}", envelope.code);
    }
    Ok(())
}
