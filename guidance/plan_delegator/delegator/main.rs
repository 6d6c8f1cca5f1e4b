//! Delegation loop: turns the cached maneuver plan into one stitched trajectory.

/// Cycle reports and loop states.
pub mod report;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use guidance_bus::{Message, Publisher};
use guidance_logging::LogLevel;
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::{
    config::DelegatorSettings,
    error::DelegatorError,
    geometry::{PoseStamped, TwistStamped},
    guards::{
        is_maneuver_expired, is_maneuver_plan_valid, is_trajectory_long_enough,
        is_trajectory_valid,
    },
    maneuver::{Maneuver, ManeuverCommon, ManeuverError},
    registry::PlannerRegistry,
    service::PlanTrajectoryRequest,
    state::StateCache,
    telemetry::DelegatorTelemetry,
    trajectory::{TrajectoryPlan, TrajectoryPoint},
};

pub use report::{CycleOutcome, CycleReport, DelegatorState, PlannedManeuver, SkippedManeuver};

/// Topic name stamped on published trajectories.
pub const TRAJECTORY_TOPIC: &str = "plan_trajectory";

/// Loop tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegatorOptions {
    /// Dispatch stops once the trajectory spans this long.
    pub max_trajectory_duration: chrono::Duration,
    /// Bound on each planner call.
    pub planner_call_timeout: Duration,
}

impl From<&DelegatorSettings> for DelegatorOptions {
    fn from(settings: &DelegatorSettings) -> Self {
        Self {
            max_trajectory_duration: settings.max_trajectory_duration(),
            planner_call_timeout: settings.planner_call_timeout(),
        }
    }
}

/// Orchestrates one cycle at a time over the shared state cache.
pub struct PlanDelegator {
    options: DelegatorOptions,
    registry: PlannerRegistry,
    cache: StateCache,
    publisher: Arc<dyn Publisher<TrajectoryPlan>>,
    telemetry: Option<DelegatorTelemetry>,
    cycle_guard: Mutex<()>,
    state: RwLock<DelegatorState>,
    cycles: AtomicU64,
}

impl std::fmt::Debug for PlanDelegator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanDelegator")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("state", &*self.state.read())
            .field("cycles", &self.cycles.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PlanDelegator {
    /// Creates the loop.
    #[must_use]
    pub fn new(
        options: DelegatorOptions,
        registry: PlannerRegistry,
        cache: StateCache,
        publisher: Arc<dyn Publisher<TrajectoryPlan>>,
    ) -> Self {
        Self {
            options,
            registry,
            cache,
            publisher,
            telemetry: None,
            cycle_guard: Mutex::new(()),
            state: RwLock::new(DelegatorState::Idle),
            cycles: AtomicU64::new(0),
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: DelegatorTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// State reached by the most recent cycle.
    #[must_use]
    pub fn state(&self) -> DelegatorState {
        *self.state.read()
    }

    /// Cycles run to completion, overlapping attempts excluded.
    #[must_use]
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Shared state cache.
    #[must_use]
    pub const fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// Planner registry.
    #[must_use]
    pub const fn registry(&self) -> &PlannerRegistry {
        &self.registry
    }

    /// Runs one cycle anchored at the current time.
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Runs one cycle anchored at `now`.
    ///
    /// Returns immediately with [`CycleOutcome::Overlapping`] if a cycle is in progress.
    #[instrument(skip(self))]
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            tracing::debug!("previous cycle still running");
            return CycleReport::overlapping(now);
        };
        let started = Instant::now();
        let mut report = CycleReport::new(now);

        self.set_state(DelegatorState::Idle);
        self.set_state(DelegatorState::AwaitingPlan);
        let snapshot = self.cache.snapshot();
        let plan = match snapshot.plan.as_deref() {
            Some(plan) if is_maneuver_plan_valid(Some(plan)) => plan,
            _ => {
                let reason = DelegatorError::InvalidPlan;
                self.log(
                    LogLevel::Debug,
                    "delegator.cycle.no_plan",
                    json!({
                        "cycle_id": report.cycle_id.to_string(),
                        "reason": reason.to_string(),
                    }),
                );
                report.failure = Some(reason);
                return self.finish(report, DelegatorState::Idle, started);
            }
        };

        self.set_state(DelegatorState::Dispatching);
        report.plan_ordered = plan.is_temporally_ordered();
        report.plan_horizon_end = plan.horizon_end();
        if !report.plan_ordered {
            // Dispatch still follows insertion order.
            self.log(
                LogLevel::Warn,
                "delegator.plan.unordered",
                json!({
                    "cycle_id": report.cycle_id.to_string(),
                    "plan_id": plan.plan_id.clone(),
                }),
            );
        }
        let pose = snapshot.pose_or_default();
        let twist = snapshot.twist_or_default();
        let mut trajectory = TrajectoryPlan::new(now);

        for (index, maneuver) in plan.iter().enumerate() {
            let common = match maneuver.validate().and_then(|()| maneuver.common()) {
                Ok(common) => common,
                Err(err) => {
                    let reason = match err {
                        ManeuverError::UnknownVariant { type_id } => {
                            DelegatorError::UnknownVariant { type_id }
                        }
                        other => DelegatorError::InvalidManeuver {
                            reason: other.to_string(),
                        },
                    };
                    self.skip(&mut report, index, maneuver, reason, LogLevel::Warn);
                    continue;
                }
            };
            if is_maneuver_expired(common, now) {
                self.skip(
                    &mut report,
                    index,
                    maneuver,
                    DelegatorError::ManeuverExpired,
                    LogLevel::Info,
                );
                continue;
            }

            match self
                .plan_maneuver(maneuver, common, &trajectory, &pose, &twist)
                .await
            {
                Ok(segment) => {
                    let stitched = trajectory.append_segment(segment);
                    report.planned.push(PlannedManeuver {
                        index,
                        planner: common.planner_name.clone(),
                        appended: stitched.appended,
                        dropped: stitched.dropped,
                    });
                }
                // Maneuver-local error, or nothing usable yet: the next maneuver
                // starts from vehicle state.
                Err(err) if !err.stops_dispatch() || !is_trajectory_valid(&trajectory) => {
                    self.skip(&mut report, index, maneuver, err, LogLevel::Warn);
                    continue;
                }
                Err(err) => {
                    self.log(
                        LogLevel::Warn,
                        "delegator.dispatch.stopped",
                        json!({
                            "cycle_id": report.cycle_id.to_string(),
                            "index": index,
                            "error": err.to_string(),
                            "points": trajectory.len(),
                        }),
                    );
                    report.failure = Some(err);
                    break;
                }
            }

            if is_trajectory_long_enough(&trajectory, self.options.max_trajectory_duration) {
                report.horizon_reached = true;
                break;
            }
        }

        self.set_state(DelegatorState::Finalizing);
        report.points = trajectory.len();
        report.span = trajectory.span();
        if !is_trajectory_valid(&trajectory) {
            let reason = DelegatorError::DegenerateTrajectory {
                points: trajectory.len(),
            };
            self.log(
                LogLevel::Warn,
                "delegator.cycle.discarded",
                json!({
                    "cycle_id": report.cycle_id.to_string(),
                    "error": reason.to_string(),
                }),
            );
            report.outcome = CycleOutcome::Discarded(reason);
            return self.finish(report, DelegatorState::Idle, started);
        }

        let source = self
            .telemetry
            .as_ref()
            .map_or("plan-delegator", DelegatorTelemetry::module)
            .to_string();
        let message = Message::new(source, TRAJECTORY_TOPIC, trajectory);
        if let Err(err) = self.publisher.publish(message).await {
            let reason = DelegatorError::Publish(err.to_string());
            self.log(
                LogLevel::Error,
                "delegator.cycle.publish_failed",
                json!({
                    "cycle_id": report.cycle_id.to_string(),
                    "error": reason.to_string(),
                }),
            );
            report.outcome = CycleOutcome::Discarded(reason);
            return self.finish(report, DelegatorState::Idle, started);
        }

        report.outcome = CycleOutcome::Published;
        self.finish(report, DelegatorState::Published, started)
    }

    /// Calls the planner owning `maneuver` and returns a well-formed segment.
    async fn plan_maneuver(
        &self,
        maneuver: &Maneuver,
        common: &ManeuverCommon,
        trajectory: &TrajectoryPlan,
        pose: &PoseStamped,
        twist: &TwistStamped,
    ) -> Result<Vec<TrajectoryPoint>, DelegatorError> {
        let planner = common.planner_name.as_str();
        let connection = self.registry.get_connection(planner)?;
        let request = PlanTrajectoryRequest::new(
            maneuver.clone(),
            trajectory.clone(),
            pose.clone(),
            twist.clone(),
        );
        let timeout = self.options.planner_call_timeout;
        let response = tokio::time::timeout(timeout, connection.plan_trajectory(request))
            .await
            .map_err(|_| DelegatorError::PlannerTimeout {
                planner: planner.to_string(),
                timeout,
            })??;
        if let Some(reason) = response.malformed_reason() {
            return Err(DelegatorError::PlannerCallFailed {
                planner: planner.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(response
            .into_points()
            .into_iter()
            .map(|point| {
                if point.planner_name.is_empty() {
                    point.with_planner(planner)
                } else {
                    point
                }
            })
            .collect())
    }

    fn skip(
        &self,
        report: &mut CycleReport,
        index: usize,
        maneuver: &Maneuver,
        reason: DelegatorError,
        level: LogLevel,
    ) {
        self.log(
            level,
            "delegator.maneuver.skipped",
            json!({
                "cycle_id": report.cycle_id.to_string(),
                "index": index,
                "maneuver": maneuver.label(),
                "reason": reason.to_string(),
            }),
        );
        report.skipped.push(SkippedManeuver {
            index,
            maneuver: maneuver.label(),
            reason,
        });
    }

    fn finish(
        &self,
        mut report: CycleReport,
        state: DelegatorState,
        started: Instant,
    ) -> CycleReport {
        report.elapsed = started.elapsed();
        self.set_state(state);
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if report.is_published() {
            self.log(LogLevel::Info, "delegator.cycle.published", report.to_json());
        }
        self.event(&format!("delegator.cycle.{}", report.outcome.label()), report.to_json());
        report
    }

    fn set_state(&self, state: DelegatorState) {
        *self.state.write() = state;
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }

    fn event(&self, event_type: &str, payload: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            tel.event(event_type, payload);
        }
    }
}
