use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use guidance_logging::LogLevel;
use serde::Deserialize;

use crate::registry::EndpointNaming;

/// Complete service configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelegatorConfig {
    /// Loop timing and planner naming.
    #[serde(default)]
    pub delegator: DelegatorSettings,
    /// Planner transport.
    #[serde(default)]
    pub transport: TransportSettings,
    /// Structured log output.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    /// Node wiring.
    #[serde(default)]
    pub node: NodeSettings,
    /// Vehicle dimensions reported in safety messages.
    #[serde(default)]
    pub vehicle: VehicleSettings,
}

impl DelegatorConfig {
    /// Loads and validates a TOML file. Relative paths resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading delegator config {}", path.display()))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("loading {}", path.display()))?;
        let base = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.resolve_paths(&base);
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("parsing delegator config")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the loop cannot honour.
    pub fn validate(&self) -> Result<()> {
        let loop_settings = &self.delegator;
        if !(loop_settings.spin_rate_hz.is_finite() && loop_settings.spin_rate_hz > 0.0) {
            bail!("spin_rate_hz must be positive, got {}", loop_settings.spin_rate_hz);
        }
        if !(loop_settings.max_trajectory_duration_secs.is_finite()
            && loop_settings.max_trajectory_duration_secs > 0.0)
        {
            bail!(
                "max_trajectory_duration_secs must be positive, got {}",
                loop_settings.max_trajectory_duration_secs
            );
        }
        if loop_settings.planner_call_timeout_ms == 0 {
            bail!("planner_call_timeout_ms must be positive");
        }
        let spin_period = Duration::try_from_secs_f64(1.0 / loop_settings.spin_rate_hz)
            .with_context(|| {
                format!(
                    "spin_rate_hz {} gives an unrepresentable period",
                    loop_settings.spin_rate_hz
                )
            })?;
        if loop_settings.planner_call_timeout() >= spin_period {
            bail!(
                "planner_call_timeout_ms ({}) must be shorter than one spin period ({} ms)",
                loop_settings.planner_call_timeout_ms,
                spin_period.as_millis()
            );
        }
        if self.node.topic_capacity == 0 {
            bail!("node.topic_capacity must be at least 1");
        }
        if self.vehicle.width <= 0.0 || self.vehicle.length <= 0.0 {
            bail!("vehicle dimensions must be positive");
        }
        self.telemetry.log_level()?;
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |candidate: &mut PathBuf| {
            if candidate.is_relative() {
                *candidate = base.join(&*candidate);
            }
        };
        resolve(&mut self.node.trajectory_log);
        if let Some(path) = self.telemetry.log_path.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.node.event_log.as_mut() {
            resolve(path);
        }
    }
}

/// Loop timing and planner naming.
#[derive(Debug, Clone, Deserialize)]
pub struct DelegatorSettings {
    /// Trigger frequency (Hz).
    #[serde(default = "default_spin_rate_hz")]
    pub spin_rate_hz: f64,
    /// Horizon after which dispatch stops (s).
    #[serde(default = "default_max_trajectory_duration_secs")]
    pub max_trajectory_duration_secs: f64,
    /// Prepended to planner names to form endpoints.
    #[serde(default = "default_planner_service_prefix")]
    pub planner_service_prefix: String,
    /// Appended to planner names to form endpoints.
    #[serde(default = "default_planner_service_suffix")]
    pub planner_service_suffix: String,
    /// Per-call planner timeout (ms).
    #[serde(default = "default_planner_call_timeout_ms")]
    pub planner_call_timeout_ms: u64,
}

impl Default for DelegatorSettings {
    fn default() -> Self {
        Self {
            spin_rate_hz: default_spin_rate_hz(),
            max_trajectory_duration_secs: default_max_trajectory_duration_secs(),
            planner_service_prefix: default_planner_service_prefix(),
            planner_service_suffix: default_planner_service_suffix(),
            planner_call_timeout_ms: default_planner_call_timeout_ms(),
        }
    }
}

impl DelegatorSettings {
    /// Interval between triggers. Saturates for rates that validation rejects.
    #[must_use]
    pub fn spin_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.spin_rate_hz).unwrap_or(Duration::MAX)
    }

    /// Horizon as a chrono duration.
    #[must_use]
    pub fn max_trajectory_duration(&self) -> chrono::Duration {
        let millis = (self.max_trajectory_duration_secs * 1000.0).round();
        #[allow(clippy::cast_possible_truncation)]
        chrono::Duration::milliseconds(millis as i64)
    }

    /// Per-call timeout.
    #[must_use]
    pub const fn planner_call_timeout(&self) -> Duration {
        Duration::from_millis(self.planner_call_timeout_ms)
    }

    /// Endpoint naming rule.
    #[must_use]
    pub fn endpoint_naming(&self) -> EndpointNaming {
        EndpointNaming::new(&self.planner_service_prefix, &self.planner_service_suffix)
    }
}

/// Planner transport.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSettings {
    /// Base URL planner endpoints are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Structured log output.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    /// JSON-lines log file; logging to file is off when absent.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Minimum level written (`debug`, `info`, `warn`, `error`).
    #[serde(default = "default_level")]
    pub level: String,
    /// Module name stamped on records.
    #[serde(default = "default_module")]
    pub module: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_path: None,
            level: default_level(),
            module: default_module(),
        }
    }
}

impl TelemetrySettings {
    /// Parsed minimum level.
    pub fn log_level(&self) -> Result<LogLevel> {
        self.level
            .parse::<LogLevel>()
            .with_context(|| format!("invalid telemetry.level {:?}", self.level))
    }
}

/// Node wiring.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    /// File receiving published trajectories as JSON lines.
    #[serde(default = "default_trajectory_log")]
    pub trajectory_log: PathBuf,
    /// File receiving telemetry events; events stay in memory when absent.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
    /// Capacity of each in-process topic.
    #[serde(default = "default_topic_capacity")]
    pub topic_capacity: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            trajectory_log: default_trajectory_log(),
            event_log: None,
            topic_capacity: default_topic_capacity(),
        }
    }
}

/// Vehicle dimensions (m).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VehicleSettings {
    /// Overall width.
    #[serde(default = "default_vehicle_width")]
    pub width: f64,
    /// Overall length.
    #[serde(default = "default_vehicle_length")]
    pub length: f64,
}

impl Default for VehicleSettings {
    fn default() -> Self {
        Self {
            width: default_vehicle_width(),
            length: default_vehicle_length(),
        }
    }
}

const fn default_spin_rate_hz() -> f64 {
    10.0
}

const fn default_max_trajectory_duration_secs() -> f64 {
    6.0
}

fn default_planner_service_prefix() -> String {
    "/guidance/plugins/".into()
}

fn default_planner_service_suffix() -> String {
    "/plan_trajectory".into()
}

const fn default_planner_call_timeout_ms() -> u64 {
    50
}

fn default_base_url() -> String {
    "http://127.0.0.1:8710".into()
}

fn default_level() -> String {
    LogLevel::Info.label().into()
}

fn default_module() -> String {
    "plan-delegator".into()
}

fn default_trajectory_log() -> PathBuf {
    PathBuf::from("trajectories.jsonl")
}

const fn default_topic_capacity() -> usize {
    64
}

const fn default_vehicle_width() -> f64 {
    1.8
}

const fn default_vehicle_length() -> f64 {
    4.6
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_uses_defaults() {
        let config = DelegatorConfig::from_toml_str("").unwrap();
        assert!((config.delegator.spin_rate_hz - 10.0).abs() < f64::EPSILON);
        assert_eq!(
            config.delegator.max_trajectory_duration(),
            chrono::Duration::seconds(6)
        );
        assert_eq!(
            config.delegator.endpoint_naming().endpoint_for("inlanecruising"),
            "/guidance/plugins/inlanecruising/plan_trajectory"
        );
        assert_eq!(config.delegator.spin_period(), Duration::from_millis(100));
        assert_eq!(config.telemetry.log_level().unwrap(), LogLevel::Info);
    }

    #[test]
    fn rejects_non_positive_rates() {
        let err = DelegatorConfig::from_toml_str("[delegator]\nspin_rate_hz = 0.0\n").unwrap_err();
        assert!(format!("{err:#}").contains("spin_rate_hz"));
        assert!(
            DelegatorConfig::from_toml_str("[delegator]\nmax_trajectory_duration_secs = -1.0\n")
                .is_err()
        );
    }

    #[test]
    fn timeout_must_fit_inside_spin_period() {
        let raw = "[delegator]\nspin_rate_hz = 10.0\nplanner_call_timeout_ms = 100\n";
        let err = DelegatorConfig::from_toml_str(raw).unwrap_err();
        assert!(format!("{err:#}").contains("shorter than one spin period"));
        let ok = "[delegator]\nspin_rate_hz = 2.0\nplanner_call_timeout_ms = 400\n";
        assert!(DelegatorConfig::from_toml_str(ok).is_ok());
    }

    #[test]
    fn tiny_spin_rate_is_rejected_not_a_panic() {
        let err = DelegatorConfig::from_toml_str("[delegator]\nspin_rate_hz = 1e-300\n").unwrap_err();
        assert!(format!("{err:#}").contains("unrepresentable period"));

        let settings = DelegatorSettings {
            spin_rate_hz: 1e-300,
            ..DelegatorSettings::default()
        };
        assert_eq!(settings.spin_period(), Duration::MAX);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(DelegatorConfig::from_toml_str("[telemetry]\nlevel = \"loud\"\n").is_err());
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("delegator.toml");
        fs::write(
            &path,
            "[telemetry]\nlog_path = \"logs/delegator.log\"\n[node]\ntrajectory_log = \"out.jsonl\"\n",
        )
        .unwrap();
        let config = DelegatorConfig::load(&path).unwrap();
        assert_eq!(config.node.trajectory_log, dir.path().join("out.jsonl"));
        assert_eq!(
            config.telemetry.log_path.unwrap(),
            dir.path().join("logs/delegator.log")
        );
    }
}
