//! Pre-flight reachability check for the database and the remote service.
//!
//! Both probes run concurrently, each with its own short timeout. A probe
//! that times out counts as disconnected.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::remote::RemoteAnonymizer;
use crate::upload::ObjectStore;

/// One reachability probe.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Endpoint shown in status output, if there is one.
    fn endpoint(&self) -> Option<String> {
        None
    }

    async fn probe(&self) -> Result<(), String>;
}

/// `GET /health` on the remote anonymization service.
pub struct ApiHealthProbe {
    remote: Arc<dyn RemoteAnonymizer>,
}

impl ApiHealthProbe {
    pub fn new(remote: Arc<dyn RemoteAnonymizer>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl HealthProbe for ApiHealthProbe {
    fn name(&self) -> &str {
        "api"
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.remote.endpoint().to_string())
    }

    async fn probe(&self) -> Result<(), String> {
        let health = self.remote.health().await.map_err(|e| e.to_string())?;
        if health.is_healthy() {
            Ok(())
        } else {
            Err(format!("API returned unexpected status: {}", health.status))
        }
    }
}

/// Bounded read (`select=id&limit=1`) against a PostgREST table.
pub struct RestTableProbe {
    base_url: String,
    api_key: String,
    table: String,
    client: reqwest::Client,
}

impl RestTableProbe {
    pub fn new(base_url: &str, api_key: &str, table: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!("{}/rest/v1/{}?select=id&limit=1", self.base_url, self.table)
    }
}

#[async_trait]
impl HealthProbe for RestTableProbe {
    fn name(&self) -> &str {
        "database"
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    async fn probe(&self) -> Result<(), String> {
        let resp = self
            .client
            .get(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| format!("{e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }
        Ok(())
    }
}

/// Reachability of an object store, standing in for the database when
/// storage is local.
pub struct StoreProbe {
    store: Arc<dyn ObjectStore>,
}

impl StoreProbe {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthProbe for StoreProbe {
    fn name(&self) -> &str {
        "database"
    }

    fn endpoint(&self) -> Option<String> {
        Some(format!("{} store", self.store.name()))
    }

    async fn probe(&self) -> Result<(), String> {
        self.store.probe().await
    }
}

/// Result of one probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Combined health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Offline,
}

impl OverallStatus {
    pub fn combine(database: bool, api: bool) -> Self {
        match (database, api) {
            (true, true) => OverallStatus::Healthy,
            (false, false) => OverallStatus::Offline,
            _ => OverallStatus::Degraded,
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OverallStatus::Healthy => "healthy",
            OverallStatus::Degraded => "degraded",
            OverallStatus::Offline => "offline",
        })
    }
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    pub overall: OverallStatus,
    pub database: ServiceStatus,
    pub api: ServiceStatus,
}

impl ConnectivityReport {
    pub fn new(database: ServiceStatus, api: ServiceStatus) -> Self {
        Self {
            overall: OverallStatus::combine(database.connected, api.connected),
            database,
            api,
        }
    }

    /// User-facing one-line summary.
    pub fn message(&self) -> String {
        if self.overall == OverallStatus::Healthy {
            return "All systems operational".to_string();
        }
        let mut issues = Vec::new();
        if !self.database.connected {
            issues.push("Database unavailable");
        }
        if !self.api.connected {
            issues.push("API unavailable");
        }
        issues.join(", ")
    }

    /// `(database, api)` latencies in milliseconds.
    pub fn per_service_latency_ms(&self) -> (u64, u64) {
        (self.database.latency_ms, self.api.latency_ms)
    }
}

/// Runs the database and API probes.
pub struct ConnectivityGate {
    database: Arc<dyn HealthProbe>,
    api: Arc<dyn HealthProbe>,
    timeout: Duration,
}

impl ConnectivityGate {
    pub fn new(database: Arc<dyn HealthProbe>, api: Arc<dyn HealthProbe>, timeout: Duration) -> Self {
        Self {
            database,
            api,
            timeout,
        }
    }

    pub async fn check(&self) -> ConnectivityReport {
        let (database, api) = futures_util::future::join(
            run_probe(self.database.as_ref(), self.timeout),
            run_probe(self.api.as_ref(), self.timeout),
        )
        .await;

        let report = ConnectivityReport::new(database, api);
        match report.overall {
            OverallStatus::Healthy => tracing::debug!("Connectivity: {}", report.message()),
            OverallStatus::Degraded => tracing::warn!("Connectivity degraded: {}", report.message()),
            OverallStatus::Offline => tracing::error!("Connectivity offline: {}", report.message()),
        }
        report
    }
}

async fn run_probe(probe: &dyn HealthProbe, timeout: Duration) -> ServiceStatus {
    let start = Instant::now();
    let outcome = tokio::time::timeout(timeout, probe.probe()).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(_) => Some(format!("timed out after {}ms", timeout.as_millis())),
    };
    if let Some(e) = &error {
        tracing::debug!("{} probe failed in {latency_ms}ms: {e}", probe.name());
    }

    ServiceStatus {
        connected: error.is_none(),
        error,
        latency_ms,
        endpoint: probe.endpoint(),
    }
}
