//! Lifecycle Engine: moves small-business customers through stage timelines,
//! keeps engagement tiers current and runs scripted account-manager calls.

mod seed;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use lifecycle_conversation::{ConversationCatalog, ConversationSession};
use lifecycle_core::config::AppConfig;
use lifecycle_core::ports::{EffectContext, SideEffectExecutor};
use lifecycle_core::types::{Customer, PipelineStage};
use lifecycle_core::SystemClock;
use lifecycle_orchestrator::memory::{DryRunDispatcher, InMemoryActivity, InMemoryCustomers, InMemoryProgressRepository};
use lifecycle_orchestrator::{Collaborators, LoggingHandler, Orchestrator, SideEffectRegistry};
use lifecycle_timeline::TimelineStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "lifecycle-engine")]
#[command(about = "Customer lifecycle orchestration engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, global = true, env = "LIFECYCLE__NODE_ID")]
    node_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the dispatch, advance and tier sweeps
    Run {
        /// Seconds between dispatch sweeps (overrides config)
        #[arg(long)]
        dispatch_interval: Option<u64>,

        /// Seconds between day-advance sweeps (overrides config)
        #[arg(long)]
        advance_interval: Option<u64>,

        /// Seconds between tier sweeps (overrides config)
        #[arg(long)]
        tier_interval: Option<u64>,

        /// Duration of the seeded stage timelines
        #[arg(long, default_value_t = 90)]
        days: u32,

        /// Number of demo customers to enroll
        #[arg(long, default_value_t = 0)]
        demo_customers: usize,

        /// Run each sweep once, print the reports and exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Publish the default timeline for a stage and print it
    SeedTimeline {
        #[arg(long, default_value = "hook")]
        stage: PipelineStage,

        #[arg(long, default_value_t = 90)]
        days: u32,

        /// JSON file holding published timelines; created when missing
        #[arg(long)]
        store: Option<PathBuf>,

        /// Replace the stage's active timeline in the store
        #[arg(long, default_value_t = false, requires = "store")]
        force: bool,
    },
    /// Talk through a dialog tree on stdin
    Converse {
        #[arg(long, default_value = "Joe's Pizza")]
        business_name: String,

        #[arg(long)]
        contact_name: Option<String>,

        #[arg(long, default_value = "Sam")]
        am_name: String,

        #[arg(long, default_value = "initial_call")]
        trigger: String,

        #[arg(long)]
        stage: Option<PipelineStage>,
    },
}

const DEMO_BUSINESSES: [&str; 6] = [
    "Joe's Pizza",
    "Harbor Florist",
    "Northside Fitness",
    "Blue Door Bakery",
    "Maple Street Dental",
    "Riverside Books",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lifecycle_engine=info,lifecycle_orchestrator=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }

    match cli.command {
        Command::Run {
            dispatch_interval,
            advance_interval,
            tier_interval,
            days,
            demo_customers,
            once,
        } => {
            if let Some(secs) = dispatch_interval {
                config.orchestrator.dispatch_interval_secs = secs;
            }
            if let Some(secs) = advance_interval {
                config.orchestrator.advance_interval_secs = secs;
            }
            if let Some(secs) = tier_interval {
                config.orchestrator.tier_interval_secs = secs;
            }
            run(config, days, demo_customers, once).await
        }
        Command::SeedTimeline {
            stage,
            days,
            store,
            force,
        } => {
            let timelines = match &store {
                Some(path) => seed::load_store(path)?,
                None => TimelineStore::new(),
            };
            let timeline = seed::publish_default(&timelines, stage, days, force)?;
            if let Some(path) = &store {
                seed::save_store(&timelines, path)?;
            }
            println!("{}", serde_json::to_string_pretty(timeline.as_ref())?);
            Ok(())
        }
        Command::Converse {
            business_name,
            contact_name,
            am_name,
            trigger,
            stage,
        } => {
            let context = seed::call_context(business_name, contact_name, am_name);
            converse(&trigger, stage, context).await
        }
    }
}

fn start_metrics(config: &AppConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.metrics.host.parse()?, config.metrics.port);
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(port = config.metrics.port, "Metrics exporter started");
    Ok(())
}

async fn run(config: AppConfig, days: u32, demo_customers: usize, once: bool) -> anyhow::Result<()> {
    info!(
        node_id = %config.node_id,
        chunk_size = config.orchestrator.chunk_size,
        max_workers = config.orchestrator.max_workers,
        dispatch_interval_secs = config.orchestrator.dispatch_interval_secs,
        advance_interval_secs = config.orchestrator.advance_interval_secs,
        tier_interval_secs = config.orchestrator.tier_interval_secs,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        if let Err(e) = start_metrics(&config) {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    let timelines = Arc::new(TimelineStore::new());
    for stage in PipelineStage::all() {
        seed::publish_default(&timelines, stage, days, false)?;
    }

    let customers = Arc::new(InMemoryCustomers::new());
    let activity = Arc::new(InMemoryActivity::new());
    let orchestrator = Orchestrator::new(
        &config,
        Collaborators {
            timelines,
            progress: Arc::new(InMemoryProgressRepository::new()),
            customers: customers.clone(),
            activity: activity.clone(),
            dispatcher: Arc::new(DryRunDispatcher::new()),
            effects: Arc::new(SideEffectRegistry::uniform(Arc::new(LoggingHandler))),
            clock: Arc::new(SystemClock),
        },
    )?;

    let coldest = config.tiers.coldest_tier();
    for i in 0..demo_customers {
        let name = DEMO_BUSINESSES[i % DEMO_BUSINESSES.len()];
        let mut customer = Customer::new(format!("{name} #{}", i + 1), PipelineStage::Hook, coldest);
        customer.email = Some(format!("owner{}@example.com", i + 1));
        // Profiles range from name and email only up to fully filled in.
        let filled = i % 4;
        if filled >= 1 {
            customer.phone = Some(format!("555-01{:02}", i % 100));
            customer.profile.industry_category = Some("Local services".to_string());
        }
        if filled >= 2 {
            customer.profile.address_line1 = Some(format!("{} Main Street", i + 1));
            customer.profile.city = Some("Springfield".to_string());
            customer.profile.state = Some("IL".to_string());
        }
        if filled >= 3 {
            customer.profile.business_description = Some(format!("{name} serves the neighbourhood"));
            customer.profile.products_services = Some("Walk-in and online orders".to_string());
        }
        let id = customer.id;
        customers.upsert(customer);

        // Spread the demo population across engagement levels.
        activity.update(id, |h| {
            h.email_opens = (i as u32 * 3) % 12;
            h.email_clicks = (i as u32 * 2) % 6;
            h.content_views = (i as u32) % 8;
            h.replies = (i as u32) % 3;
        });

        orchestrator.assign_timeline_for_stage(id)?;
    }
    info!(customers = demo_customers, "Demo customers enrolled");

    if once {
        let dispatch = orchestrator.dispatch_due_actions().await?;
        let advance = orchestrator.advance_days().await?;
        let tiers = orchestrator.reevaluate_tiers().await?;
        let summary = serde_json::json!({
            "dispatch": dispatch,
            "advance": advance,
            "tiers": tiers,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let orch = orchestrator.clone();
    let every = Duration::from_secs(config.orchestrator.dispatch_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = orch.dispatch_due_actions().await {
                error!(error = %e, "Dispatch sweep failed");
            }
        }
    });

    let orch = orchestrator.clone();
    let every = Duration::from_secs(config.orchestrator.advance_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = orch.advance_days().await {
                error!(error = %e, "Advance sweep failed");
            }
        }
    });

    let orch = orchestrator.clone();
    let every = Duration::from_secs(config.orchestrator.tier_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = orch.reevaluate_tiers().await {
                error!(error = %e, "Tier sweep failed");
            }
        }
    });

    info!("Lifecycle engine is running");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}

async fn converse(
    trigger: &str,
    stage: Option<PipelineStage>,
    context: HashMap<String, String>,
) -> anyhow::Result<()> {
    let catalog = seed::conversation_catalog()?;
    let tree = catalog
        .find_for_context(trigger, stage)
        .ok_or_else(|| anyhow::anyhow!("no active dialog tree for trigger '{trigger}'"))?;
    let matcher = Arc::new(catalog.matcher()?);
    let effects = SideEffectRegistry::uniform(Arc::new(LoggingHandler));
    let customer_id = Uuid::new_v4();
    let origin = format!("dialog:{}", tree.slug);

    let (session, opening) = ConversationSession::open(tree, matcher, context)?;
    let mut session = session.with_customer(customer_id);
    println!("agent> {}", opening.text());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !session.is_completed() {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let reply = session.respond(&line)?;
        println!("agent> {}", reply.text());

        let ctx = EffectContext::new(customer_id, origin.as_str());
        for effect in &reply.side_effects {
            if let Err(e) = effects.execute(effect, &ctx).await {
                warn!(kind = %effect.kind, error = %e, "Side effect failed");
            }
        }
    }

    info!(turns = session.transcript().len(), completed = session.is_completed(), "Conversation ended");
    Ok(())
}
