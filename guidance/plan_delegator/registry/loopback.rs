use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{PlannerConnection, PlannerConnector};
use crate::{
    error::DelegatorError,
    service::{PlanTrajectoryRequest, PlanTrajectoryResponse},
};

/// Planner implementation hosted inside the current process.
#[async_trait]
pub trait PlannerService: Send + Sync {
    /// Plans a segment for the request maneuver.
    async fn plan(
        &self,
        request: PlanTrajectoryRequest,
    ) -> Result<PlanTrajectoryResponse, DelegatorError>;
}

/// Resolves endpoints against services registered in memory.
#[derive(Default, Clone)]
pub struct InProcessConnector {
    services: Arc<RwLock<IndexMap<String, Arc<dyn PlannerService>>>>,
}

impl std::fmt::Debug for InProcessConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessConnector")
            .field("endpoints", &self.endpoints())
            .finish()
    }
}

impl InProcessConnector {
    /// Creates a connector with no service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the service answering at `endpoint`.
    pub fn register(&self, endpoint: impl Into<String>, service: Arc<dyn PlannerService>) {
        self.services.write().insert(endpoint.into(), service);
    }

    /// Builder form of [`Self::register`].
    #[must_use]
    pub fn with_service(self, endpoint: impl Into<String>, service: Arc<dyn PlannerService>) -> Self {
        self.register(endpoint, service);
        self
    }

    /// Registered endpoints.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }
}

impl PlannerConnector for InProcessConnector {
    fn connect(
        &self,
        planner: &str,
        endpoint: &str,
    ) -> Result<Arc<dyn PlannerConnection>, DelegatorError> {
        let service = self.services.read().get(endpoint).cloned().ok_or_else(|| {
            DelegatorError::PlannerUnavailable {
                planner: planner.to_string(),
                reason: format!("no in-process service at {endpoint}"),
            }
        })?;
        Ok(Arc::new(InProcessConnection {
            planner: planner.to_string(),
            endpoint: endpoint.to_string(),
            service,
        }))
    }
}

struct InProcessConnection {
    planner: String,
    endpoint: String,
    service: Arc<dyn PlannerService>,
}

#[async_trait]
impl PlannerConnection for InProcessConnection {
    fn planner_name(&self) -> &str {
        &self.planner
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn plan_trajectory(
        &self,
        request: PlanTrajectoryRequest,
    ) -> Result<PlanTrajectoryResponse, DelegatorError> {
        self.service.plan(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::{PoseStamped, TwistStamped},
        maneuver::{LaneFollowingManeuver, Maneuver, ManeuverCommon},
        trajectory::{TrajectoryPlan, TrajectoryPoint},
    };
    use chrono::{Duration, Utc};

    struct EchoStart;

    #[async_trait]
    impl PlannerService for EchoStart {
        async fn plan(
            &self,
            request: PlanTrajectoryRequest,
        ) -> Result<PlanTrajectoryResponse, DelegatorError> {
            let start = request.maneuver.start_time().map_err(|err| {
                DelegatorError::PlannerCallFailed {
                    planner: "echo".into(),
                    reason: err.to_string(),
                }
            })?;
            Ok(PlanTrajectoryResponse::new(TrajectoryPlan::from_points(
                start,
                vec![TrajectoryPoint::new(start, request.vehicle_state.x_pos_global, 0.0)],
            )))
        }
    }

    #[tokio::test]
    async fn routes_to_registered_service() {
        let connector = InProcessConnector::new().with_service("/echo", Arc::new(EchoStart));
        let connection = connector.connect("echo", "/echo").unwrap();
        let now = Utc::now();
        let maneuver = Maneuver::LaneFollowing(LaneFollowingManeuver {
            common: ManeuverCommon::new("echo", now, now + Duration::seconds(3), 0.0, 30.0),
            start_speed: 10.0,
            end_speed: 10.0,
            lane_id: "1".into(),
        });
        let request = PlanTrajectoryRequest::new(
            maneuver,
            TrajectoryPlan::new(now),
            PoseStamped::default(),
            TwistStamped::default(),
        );
        let response = connection.plan_trajectory(request).await.unwrap();
        assert_eq!(response.points().len(), 1);
        assert_eq!(response.points()[0].target_time, now);
    }

    #[test]
    fn unknown_endpoint_is_unavailable() {
        let connector = InProcessConnector::new();
        assert!(matches!(
            connector.connect("ghost", "/ghost"),
            Err(DelegatorError::PlannerUnavailable { .. })
        ));
    }
}
