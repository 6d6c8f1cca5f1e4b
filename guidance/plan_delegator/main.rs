//! Delegator runtime: periodic trigger, inbound update handlers and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use guidance_bus::{Message, Publisher, Subscriber};
use guidance_logging::LogLevel;
use serde_json::json;
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    bsm::{BsmComposer, BsmCoreData},
    delegator::{CycleReport, PlanDelegator},
    geometry::{PoseStamped, TwistStamped},
    maneuver::ManeuverPlan,
    telemetry::DelegatorTelemetry,
};

/// Inbound topics feeding the state cache.
#[derive(Clone)]
pub struct RuntimeInputs {
    /// Maneuver plan updates.
    pub plans: Arc<dyn Subscriber<ManeuverPlan>>,
    /// Pose updates.
    pub poses: Arc<dyn Subscriber<PoseStamped>>,
    /// Twist updates.
    pub twists: Arc<dyn Subscriber<TwistStamped>>,
}

/// Periodic safety-message broadcast composed from the cached pose and twist.
pub struct BsmBroadcast {
    /// Record composer.
    pub composer: BsmComposer,
    /// Destination for composed records.
    pub publisher: Arc<dyn Publisher<BsmCoreData>>,
    /// Broadcast period.
    pub period: Duration,
}

/// Owns the trigger task and the update handlers.
pub struct DelegatorRuntime {
    delegator: Arc<PlanDelegator>,
    shutdown: watch::Sender<bool>,
    reports: watch::Receiver<Option<CycleReport>>,
    handles: Vec<JoinHandle<()>>,
    telemetry: Option<DelegatorTelemetry>,
}

impl DelegatorRuntime {
    /// Subscribes to the inputs and spawns every task.
    pub async fn start(
        delegator: Arc<PlanDelegator>,
        spin_period: Duration,
        inputs: RuntimeInputs,
    ) -> Result<Self> {
        Self::start_with(delegator, spin_period, inputs, None, None).await
    }

    /// Like [`Self::start`], with optional telemetry and safety-message broadcast.
    pub async fn start_with(
        delegator: Arc<PlanDelegator>,
        spin_period: Duration,
        inputs: RuntimeInputs,
        bsm: Option<BsmBroadcast>,
        telemetry: Option<DelegatorTelemetry>,
    ) -> Result<Self> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (report_tx, reports) = watch::channel(None);
        let mut handles = Vec::with_capacity(5);

        let cache = delegator.cache().clone();
        let plans = inputs.plans.subscribe().await.context("subscribing plans")?;
        handles.push(spawn_update_handler("maneuver_plan", plans, shutdown_rx.clone(), {
            let cache = cache.clone();
            move |plan| cache.update_plan(plan)
        }));
        let poses = inputs.poses.subscribe().await.context("subscribing poses")?;
        handles.push(spawn_update_handler("pose", poses, shutdown_rx.clone(), {
            let cache = cache.clone();
            move |pose| cache.update_pose(pose)
        }));
        let twists = inputs.twists.subscribe().await.context("subscribing twists")?;
        handles.push(spawn_update_handler("twist", twists, shutdown_rx.clone(), {
            let cache = cache.clone();
            move |twist| cache.update_twist(twist)
        }));

        handles.push(spawn_trigger(
            Arc::clone(&delegator),
            spin_period,
            report_tx,
            shutdown_rx.clone(),
        ));
        if let Some(bsm) = bsm {
            handles.push(spawn_bsm(bsm, cache, shutdown_rx));
        }

        if let Some(tel) = &telemetry {
            let _ = tel.log(
                LogLevel::Info,
                "delegator.runtime.started",
                json!({ "spin_period_ms": u64::try_from(spin_period.as_millis()).unwrap_or(u64::MAX) }),
            );
        }

        Ok(Self {
            delegator,
            shutdown,
            reports,
            handles,
            telemetry,
        })
    }

    /// Underlying delegation loop.
    #[must_use]
    pub const fn delegator(&self) -> &Arc<PlanDelegator> {
        &self.delegator
    }

    /// Watch channel carrying the most recent cycle report.
    #[must_use]
    pub fn reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.clone()
    }

    /// Signals every task to stop and waits for them.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            handle.await.context("joining runtime task")?;
        }
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Info,
                "delegator.runtime.stopped",
                json!({ "cycles": self.delegator.cycles_completed() }),
            );
        }
        Ok(())
    }
}

fn spawn_update_handler<T, F>(
    topic: &'static str,
    mut updates: tokio::sync::broadcast::Receiver<Message<T>>,
    mut shutdown: watch::Receiver<bool>,
    apply: F,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = updates.recv() => match received {
                    Ok(message) => apply(message.payload),
                    // Only the newest value matters; keep reading.
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic, skipped, "update handler lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!(topic, "update handler stopped");
    })
}

fn spawn_trigger(
    delegator: Arc<PlanDelegator>,
    period: Duration,
    reports: watch::Sender<Option<CycleReport>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let report = delegator.run_cycle().await;
                    let _ = reports.send(Some(report));
                }
            }
        }
    })
}

fn spawn_bsm(
    bsm: BsmBroadcast,
    cache: crate::state::StateCache,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let BsmBroadcast {
        mut composer,
        publisher,
        period,
    } = bsm;
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let snapshot = cache.snapshot();
                    let record = composer.compose(
                        Utc::now(),
                        snapshot.pose.as_ref(),
                        snapshot.twist.as_ref(),
                        None,
                    );
                    let message = Message::new("plan-delegator", "bsm", record);
                    if let Err(err) = publisher.publish(message).await {
                        tracing::warn!(error = %err, "bsm publish failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::VehicleSettings,
        delegator::{CycleOutcome, DelegatorOptions},
        error::DelegatorError,
        maneuver::{LaneFollowingManeuver, Maneuver, ManeuverCommon},
        registry::{EndpointNaming, InProcessConnector, PlannerRegistry, PlannerService},
        service::{PlanTrajectoryRequest, PlanTrajectoryResponse},
        state::StateCache,
        trajectory::{TrajectoryPlan, TrajectoryPoint},
    };
    use async_trait::async_trait;
    use guidance_bus::MemoryTopic;

    struct Cruise;

    #[async_trait]
    impl PlannerService for Cruise {
        async fn plan(
            &self,
            request: PlanTrajectoryRequest,
        ) -> Result<PlanTrajectoryResponse, DelegatorError> {
            let start = request.maneuver.start_time().map_err(|err| {
                DelegatorError::PlannerCallFailed {
                    planner: "cruise".into(),
                    reason: err.to_string(),
                }
            })?;
            let points = (0..=8)
                .map(|s| TrajectoryPoint::new(start + chrono::Duration::seconds(s), s as f64, 0.0))
                .collect();
            Ok(PlanTrajectoryResponse::new(TrajectoryPlan::from_points(start, points)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn updates_flow_into_published_trajectories() {
        let plans = Arc::new(MemoryTopic::<ManeuverPlan>::new(4));
        let poses = Arc::new(MemoryTopic::<PoseStamped>::new(4));
        let twists = Arc::new(MemoryTopic::<TwistStamped>::new(4));
        let trajectories = Arc::new(MemoryTopic::<TrajectoryPlan>::new(4));
        let safety = Arc::new(MemoryTopic::<BsmCoreData>::new(4));

        let connector = InProcessConnector::new().with_service("/p/cruise", Arc::new(Cruise));
        let delegator = Arc::new(PlanDelegator::new(
            DelegatorOptions {
                max_trajectory_duration: chrono::Duration::seconds(6),
                planner_call_timeout: Duration::from_millis(50),
            },
            PlannerRegistry::new(EndpointNaming::new("/p/", ""), Arc::new(connector)),
            StateCache::new(),
            trajectories.clone(),
        ));
        let runtime = DelegatorRuntime::start_with(
            delegator,
            Duration::from_millis(100),
            RuntimeInputs {
                plans: plans.clone(),
                poses: poses.clone(),
                twists: twists.clone(),
            },
            Some(BsmBroadcast {
                composer: BsmComposer::seeded(VehicleSettings::default(), 1),
                publisher: safety.clone(),
                period: Duration::from_millis(100),
            }),
            None,
        )
        .await
        .unwrap();

        let now = Utc::now();
        let maneuver = Maneuver::LaneFollowing(LaneFollowingManeuver {
            common: ManeuverCommon::new("cruise", now, now + chrono::Duration::seconds(60), 0.0, 200.0),
            start_speed: 10.0,
            end_speed: 10.0,
            lane_id: "1".into(),
        });
        plans
            .publish(Message::new("test", "maneuver_plan", ManeuverPlan::new(vec![maneuver])))
            .await
            .unwrap();
        poses
            .publish(Message::new("test", "pose", PoseStamped::default()))
            .await
            .unwrap();

        let mut reports = runtime.reports();
        loop {
            reports.changed().await.unwrap();
            let published = reports
                .borrow()
                .as_ref()
                .is_some_and(|report| report.outcome == CycleOutcome::Published);
            if published {
                break;
            }
        }

        assert_eq!(trajectories.latest().unwrap().payload.len(), 9);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!safety.snapshot().is_empty());
        // No twist was ever published.
        let latest = safety.latest().unwrap().payload;
        assert!((latest.speed - crate::bsm::SPEED_UNAVAILABLE).abs() < f64::EPSILON);
        runtime.shutdown().await.unwrap();
        assert_eq!(plans.receiver_count(), 0);
    }
}
