use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use auditq::audit::{CommandLauncher, EngineConfig, RetryPolicy};
use auditq::scheduler::{CategoryPolicy, Percentages};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub store: StoreConfig,
    pub batch: BatchConfig,
    pub policy: CategoryPolicy,
    pub audit: AuditConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("targets.yml"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("auditq")
                .join("outcomes.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub percentages: Percentages,
    pub inter_attempt_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: 10,
            percentages: Percentages::default(),
            inter_attempt_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_ms: u64,
    pub grace_ms: u64,
    pub max_message_len: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        let lighthouse = CommandLauncher::lighthouse();
        Self {
            program: lighthouse.program().to_string(),
            args: lighthouse.args().to_vec(),
            timeout_ms: 60000,
            grace_ms: 5000,
            max_message_len: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub closed_multiplier: u32,
    pub network_multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 5000,
            closed_multiplier: 3,
            network_multiplier: 4,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            store: StoreConfig::default(),
            batch: BatchConfig::default(),
            policy: CategoryPolicy::default(),
            audit: AuditConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: explicit path, then the user config dir, then
    /// `./auditq.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => log::warn!("Failed to load config from {}: {:#}", candidate.display(), e),
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn candidates() -> Vec<PathBuf> {
        let name = env!("CARGO_PKG_NAME");
        let file = format!("{}.yml", name);
        let mut candidates: Vec<PathBuf> = dirs::config_dir()
            .map(|dir| dir.join(name).join(&file))
            .into_iter()
            .collect();
        candidates.push(PathBuf::from(file));
        candidates
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.policy.validate().context("Invalid category policy")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn launcher(&self) -> CommandLauncher {
        CommandLauncher::new(self.audit.program.clone(), self.audit.args.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.base_delay_ms),
            self.retry.closed_multiplier,
            self.retry.network_multiplier,
        )
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            timeout: Duration::from_millis(self.audit.timeout_ms),
            grace: Duration::from_millis(self.audit.grace_ms),
            max_message_len: self.audit.max_message_len,
            retry: self.retry_policy(),
        }
    }

    pub fn inter_attempt_delay(&self) -> Duration {
        Duration::from_millis(self.batch.inter_attempt_delay_ms)
    }
}
