use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use guidance_bus::{FanoutPublisher, JsonLinesPublisher, MemoryTopic, Message, Publisher};
use plan_delegator::{
    bsm::BsmComposer, BsmBroadcast, BsmCoreData, DelegatorConfig, DelegatorOptions,
    DelegatorRuntime, DelegatorTelemetry, HttpPlannerConnector, ManeuverPlan, PlanDelegator,
    PlannerRegistry, PoseStamped, RuntimeInputs, StateCache, TrajectoryPlan, TwistStamped,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const SOURCE: &str = "plan-delegator-node";

#[derive(Parser, Debug)]
#[command(
    name = "plan_delegator",
    version,
    about = "Delegates maneuver plans to trajectory planners"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the delegation loop, reading updates from stdin as JSON lines.
    Run {
        #[arg(long)]
        config: PathBuf,
        /// Disables the periodic safety-message broadcast.
        #[arg(long)]
        no_bsm: bool,
    },
    /// Validates a config and prints the resolved settings.
    Check {
        #[arg(long)]
        config: PathBuf,
        /// Planner names whose endpoints should be shown.
        #[arg(long = "planner")]
        planners: Vec<String>,
    },
}

/// One stdin line.
#[derive(Debug, Deserialize)]
struct InboundLine {
    topic: String,
    payload: Value,
}

struct Topics {
    plans: Arc<MemoryTopic<ManeuverPlan>>,
    poses: Arc<MemoryTopic<PoseStamped>>,
    twists: Arc<MemoryTopic<TwistStamped>>,
}

impl Topics {
    fn new(capacity: usize) -> Self {
        Self {
            plans: Arc::new(MemoryTopic::new(capacity)),
            poses: Arc::new(MemoryTopic::new(capacity)),
            twists: Arc::new(MemoryTopic::new(capacity)),
        }
    }

    fn inputs(&self) -> RuntimeInputs {
        RuntimeInputs {
            plans: self.plans.clone(),
            poses: self.poses.clone(),
            twists: self.twists.clone(),
        }
    }

    async fn route(&self, line: &str) -> Result<()> {
        let inbound: InboundLine = serde_json::from_str(line).context("parsing inbound line")?;
        match inbound.topic.as_str() {
            "maneuver_plan" => {
                let plan: ManeuverPlan =
                    serde_json::from_value(inbound.payload).context("decoding maneuver plan")?;
                self.plans
                    .publish(Message::new(SOURCE, "maneuver_plan", plan))
                    .await
            }
            "pose" => {
                let pose: PoseStamped =
                    serde_json::from_value(inbound.payload).context("decoding pose")?;
                self.poses.publish(Message::new(SOURCE, "pose", pose)).await
            }
            "twist" => {
                let twist: TwistStamped =
                    serde_json::from_value(inbound.payload).context("decoding twist")?;
                self.twists.publish(Message::new(SOURCE, "twist", twist)).await
            }
            other => bail!("unknown topic {other:?}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, no_bsm } => run(config, no_bsm).await,
        Commands::Check { config, planners } => check(&config, &planners),
    }
}

fn install_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_telemetry(config: &DelegatorConfig) -> Result<DelegatorTelemetry> {
    let settings = &config.telemetry;
    let mut builder = DelegatorTelemetry::builder(&settings.module).min_level(settings.log_level()?);
    if let Some(path) = &settings.log_path {
        builder = builder.log_path(path);
    }
    let events: Arc<dyn Publisher<Value>> = match &config.node.event_log {
        Some(path) => Arc::new(
            JsonLinesPublisher::new(path)
                .with_context(|| format!("opening event log {}", path.display()))?,
        ),
        None => Arc::new(MemoryTopic::<Value>::new(config.node.topic_capacity)),
    };
    builder.event_publisher(events).build()
}

async fn run(config_path: PathBuf, no_bsm: bool) -> Result<()> {
    let config = DelegatorConfig::load(&config_path)?;
    install_tracing(&config.telemetry.level);
    let telemetry = build_telemetry(&config)?;
    let settings = &config.delegator;

    let trajectory_log = JsonLinesPublisher::new(&config.node.trajectory_log).with_context(|| {
        format!(
            "opening trajectory log {}",
            config.node.trajectory_log.display()
        )
    })?;
    let trajectories = Arc::new(MemoryTopic::<TrajectoryPlan>::new(config.node.topic_capacity));
    let sink: Arc<dyn Publisher<TrajectoryPlan>> = Arc::new(
        FanoutPublisher::new()
            .with_sink(Arc::new(trajectory_log))
            .with_sink(trajectories.clone()),
    );

    let connector =
        HttpPlannerConnector::new(&config.transport.base_url, settings.planner_call_timeout())?;
    let registry = PlannerRegistry::new(settings.endpoint_naming(), Arc::new(connector));
    let delegator = Arc::new(
        PlanDelegator::new(
            DelegatorOptions::from(settings),
            registry,
            StateCache::new(),
            sink,
        )
        .with_telemetry(telemetry.clone()),
    );

    let safety = Arc::new(MemoryTopic::<BsmCoreData>::new(config.node.topic_capacity));
    let bsm = (!no_bsm).then(|| BsmBroadcast {
        composer: BsmComposer::new(config.vehicle),
        publisher: safety.clone(),
        period: settings.spin_period(),
    });

    let topics = Topics::new(config.node.topic_capacity);
    let runtime = DelegatorRuntime::start_with(
        delegator,
        settings.spin_period(),
        topics.inputs(),
        bsm,
        Some(telemetry),
    )
    .await?;
    tracing::info!(config = %config_path.display(), "plan delegator running");

    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            _ = &mut interrupt => {
                tracing::info!("interrupt received");
                break;
            }
            line = reader.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    tracing::info!("stdin closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Err(err) = topics.route(line).await {
                    tracing::warn!(error = %format!("{err:#}"), "inbound line rejected");
                }
            }
        }
    }

    let cycles = runtime.delegator().cycles_completed();
    runtime.shutdown().await?;
    tracing::info!(
        cycles,
        trajectories = trajectories.snapshot().len(),
        safety_messages = safety.snapshot().len(),
        "plan delegator stopped"
    );
    Ok(())
}

fn check(config_path: &Path, planners: &[String]) -> Result<()> {
    let config = DelegatorConfig::load(config_path)?;
    let settings = &config.delegator;
    let naming = settings.endpoint_naming();
    let endpoints: Vec<Value> = planners
        .iter()
        .map(|planner| json!({ "planner": planner, "endpoint": naming.endpoint_for(planner) }))
        .collect();
    let summary = json!({
        "spin_period_ms": u64::try_from(settings.spin_period().as_millis()).unwrap_or(u64::MAX),
        "max_trajectory_duration_ms": settings.max_trajectory_duration().num_milliseconds(),
        "planner_call_timeout_ms": settings.planner_call_timeout_ms,
        "base_url": config.transport.base_url,
        "trajectory_log": config.node.trajectory_log.display().to_string(),
        "event_log": config.node.event_log.as_ref().map(|p| p.display().to_string()),
        "telemetry_log": config.telemetry.log_path.as_ref().map(|p| p.display().to_string()),
        "vehicle": { "width": config.vehicle.width, "length": config.vehicle.length },
        "endpoints": endpoints,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
