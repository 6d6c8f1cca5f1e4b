//! Planner connections keyed by planner name.
//!
//! The registry creates at most one connection per planner and hands the same
//! handle to every caller afterwards. Entries live for the registry lifetime.

/// HTTP/JSON planner transport.
pub mod http;
/// In-process planner transport.
pub mod loopback;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    error::DelegatorError,
    service::{PlanTrajectoryRequest, PlanTrajectoryResponse},
};

pub use http::HttpPlannerConnector;
pub use loopback::{InProcessConnector, PlannerService};

/// Live handle to one trajectory-planner service.
#[async_trait]
pub trait PlannerConnection: Send + Sync {
    /// Planner this connection talks to.
    fn planner_name(&self) -> &str;

    /// Resolved service endpoint.
    fn endpoint(&self) -> &str;

    /// Asks the planner for a segment covering the request maneuver.
    async fn plan_trajectory(
        &self,
        request: PlanTrajectoryRequest,
    ) -> Result<PlanTrajectoryResponse, DelegatorError>;
}

impl fmt::Debug for dyn PlannerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannerConnection")
            .field("planner", &self.planner_name())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

/// Creates connections for the registry.
pub trait PlannerConnector: Send + Sync {
    /// Opens a connection to `endpoint` on behalf of `planner`.
    ///
    /// Failures are reported as [`DelegatorError::PlannerUnavailable`].
    fn connect(
        &self,
        planner: &str,
        endpoint: &str,
    ) -> Result<Arc<dyn PlannerConnection>, DelegatorError>;
}

/// Maps a planner name to its service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointNaming {
    /// Prepended to the planner name.
    pub prefix: String,
    /// Appended to the planner name.
    pub suffix: String,
}

impl EndpointNaming {
    /// Creates the naming rule.
    #[must_use]
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// `prefix + planner + suffix`.
    #[must_use]
    pub fn endpoint_for(&self, planner: &str) -> String {
        format!("{}{planner}{}", self.prefix, self.suffix)
    }
}

/// Memoizing map from planner name to connection.
#[derive(Clone)]
pub struct PlannerRegistry {
    naming: EndpointNaming,
    connector: Arc<dyn PlannerConnector>,
    connections: Arc<RwLock<IndexMap<String, Arc<dyn PlannerConnection>>>>,
}

impl fmt::Debug for PlannerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannerRegistry")
            .field("naming", &self.naming)
            .field("planners", &self.planner_names())
            .finish_non_exhaustive()
    }
}

impl PlannerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(naming: EndpointNaming, connector: Arc<dyn PlannerConnector>) -> Self {
        Self {
            naming,
            connector,
            connections: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Returns the cached connection for `planner`, creating it on first use.
    ///
    /// A failed connect leaves no entry behind, so the next cycle tries again.
    pub fn get_connection(
        &self,
        planner: &str,
    ) -> Result<Arc<dyn PlannerConnection>, DelegatorError> {
        if let Some(existing) = self.connections.read().get(planner) {
            return Ok(Arc::clone(existing));
        }

        let mut connections = self.connections.write();
        // Another caller may have inserted while we waited for the write lock.
        if let Some(existing) = connections.get(planner) {
            return Ok(Arc::clone(existing));
        }
        let endpoint = self.naming.endpoint_for(planner);
        let connection = self.connector.connect(planner, &endpoint)?;
        debug!(planner, endpoint = %endpoint, "planner connection created");
        connections.insert(planner.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    /// Number of cached connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Planner names in first-use order.
    #[must_use]
    pub fn planner_names(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    /// Endpoint naming rule in use.
    #[must_use]
    pub const fn naming(&self) -> &EndpointNaming {
        &self.naming
    }
}
