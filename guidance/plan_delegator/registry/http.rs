use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;

use super::{PlannerConnection, PlannerConnector};
use crate::{
    error::DelegatorError,
    service::{PlanTrajectoryRequest, PlanTrajectoryResponse},
};

/// Base URL plus endpoint does not form a valid URL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid planner url {url}: {reason}")]
pub struct InvalidPlannerUrl {
    /// Rejected URL text.
    pub url: String,
    /// Parser message.
    pub reason: String,
}

/// Connects to planners exposed as HTTP services under a common base URL.
#[derive(Debug, Clone)]
pub struct HttpPlannerConnector {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpPlannerConnector {
    /// Builds the connector. `request_timeout` bounds each POST at the client level.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("plan-delegator/0.1")
            .build()
            .context("building planner http client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            request_timeout,
        })
    }

    /// Full URL for an endpoint path.
    pub fn url_for(&self, endpoint: &str) -> Result<Url, InvalidPlannerUrl> {
        let raw = format!("{}{endpoint}", self.base_url.trim_end_matches('/'));
        Url::parse(&raw).map_err(|err| InvalidPlannerUrl {
            url: raw,
            reason: err.to_string(),
        })
    }
}

impl PlannerConnector for HttpPlannerConnector {
    fn connect(
        &self,
        planner: &str,
        endpoint: &str,
    ) -> Result<Arc<dyn PlannerConnection>, DelegatorError> {
        let url = self
            .url_for(endpoint)
            .map_err(|err| DelegatorError::PlannerUnavailable {
                planner: planner.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Arc::new(HttpPlannerConnection {
            client: self.client.clone(),
            planner: planner.to_string(),
            endpoint: endpoint.to_string(),
            url,
            timeout: self.request_timeout,
        }))
    }
}

/// One planner reached over HTTP.
#[derive(Debug)]
struct HttpPlannerConnection {
    client: Client,
    planner: String,
    endpoint: String,
    url: Url,
    timeout: Duration,
}

impl HttpPlannerConnection {
    fn call_failed(&self, reason: impl Into<String>) -> DelegatorError {
        DelegatorError::PlannerCallFailed {
            planner: self.planner.clone(),
            reason: reason.into(),
        }
    }

    fn classify(&self, err: &reqwest::Error) -> DelegatorError {
        if err.is_timeout() {
            DelegatorError::PlannerTimeout {
                planner: self.planner.clone(),
                timeout: self.timeout,
            }
        } else if err.is_connect() {
            DelegatorError::PlannerUnavailable {
                planner: self.planner.clone(),
                reason: err.to_string(),
            }
        } else {
            self.call_failed(err.to_string())
        }
    }
}

#[async_trait]
impl PlannerConnection for HttpPlannerConnection {
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
        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.classify(&err))?
            .error_for_status()
            .map_err(|err| self.call_failed(format!("bad status: {err}")))?;
        response
            .json::<PlanTrajectoryResponse>()
            .await
            .map_err(|err| self.call_failed(format!("invalid response body: {err}")))
    }
}
