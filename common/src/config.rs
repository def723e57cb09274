use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::command::CommandSpec;
use crate::error::ConfigError;
use crate::time::CenturyPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_status_tool")]
    pub program: PathBuf,
}

fn default_status_tool() -> PathBuf { PathBuf::from(crate::DEFAULT_STATUS_TOOL) }

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            program: default_status_tool(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimeConfig {
    /// Fixed century base for two-digit years; the POSIX pivot when unset.
    pub century: Option<i32>,
}

impl TimeConfig {
    pub fn century_policy(&self) -> CenturyPolicy {
        match self.century {
            Some(base) => CenturyPolicy::Fixed(base),
            None => CenturyPolicy::Pivot,
        }
    }
}

/// How the fake GPU hashpipe instance is started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    #[serde(default = "default_producer_program")]
    pub program: PathBuf,
    #[serde(default = "default_taskset")]
    pub taskset: PathBuf,
    /// CPU affinity mask; the producer runs unpinned when unset.
    #[serde(default = "default_cpu_mask")]
    pub cpu_mask: Option<String>,
    #[serde(default = "default_plugin")]
    pub plugin: String,
    #[serde(default)]
    pub instance: u32,
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default)]
    pub gpu_device: u32,
    #[serde(default)]
    pub xid: u32,
    #[serde(default = "default_core")]
    pub core: u32,
    #[serde(default = "default_thread")]
    pub thread: String,
}

fn default_producer_program() -> PathBuf { PathBuf::from("hashpipe") }
fn default_taskset() -> PathBuf { PathBuf::from("taskset") }
fn default_cpu_mask() -> Option<String> { Some("0x0606".to_string()) }
fn default_plugin() -> String { "fake_gpu".to_string() }
fn default_bind_host() -> String { "localhost".to_string() }
fn default_core() -> u32 { 3 }
fn default_thread() -> String { "fake_gpu_thread".to_string() }

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            program: default_producer_program(),
            taskset: default_taskset(),
            cpu_mask: default_cpu_mask(),
            plugin: default_plugin(),
            instance: 0,
            bind_host: default_bind_host(),
            gpu_device: 0,
            xid: 0,
            core: default_core(),
            thread: default_thread(),
        }
    }
}

impl ProducerConfig {
    /// `[taskset MASK] hashpipe -p PLUGIN -I N -o BINDHOST=.. -o GPUDEV=.. -o XID=.. -c CORE THREAD`
    pub fn command(&self) -> CommandSpec {
        let hashpipe_args = vec![
            "-p".to_string(),
            self.plugin.clone(),
            "-I".to_string(),
            self.instance.to_string(),
            "-o".to_string(),
            format!("BINDHOST={}", self.bind_host),
            "-o".to_string(),
            format!("GPUDEV={}", self.gpu_device),
            "-o".to_string(),
            format!("XID={}", self.xid),
            "-c".to_string(),
            self.core.to_string(),
            self.thread.clone(),
        ];

        match &self.cpu_mask {
            Some(mask) => CommandSpec::new(&self.taskset)
                .arg(mask.as_str())
                .arg(self.program.display().to_string())
                .args(hashpipe_args),
            None => CommandSpec::new(&self.program).args(hashpipe_args),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_producer_fifo")]
    pub producer_fifo: PathBuf,
    #[serde(default = "default_writer_fifo")]
    pub writer_fifo: PathBuf,
    #[serde(default)]
    pub producer: ProducerConfig,
    /// Status-initialization helper; `set_status` next to the executable when unset.
    pub status_init: Option<PathBuf>,
    #[serde(default = "default_writer")]
    pub writer: PathBuf,
    /// Treat a failing status-initialization helper as fatal.
    #[serde(default = "default_strict_status_init")]
    pub strict_status_init: bool,
    #[serde(default = "default_producer_grace_ms")]
    pub producer_grace_ms: u64,
    #[serde(default = "default_ready_delay_ms")]
    pub ready_delay_ms: u64,
}

fn default_producer_fifo() -> PathBuf { PathBuf::from(crate::DEFAULT_PRODUCER_FIFO) }
fn default_writer_fifo() -> PathBuf { PathBuf::from(crate::DEFAULT_WRITER_FIFO) }
fn default_writer() -> PathBuf { PathBuf::from("vegasFitsWriter") }
fn default_strict_status_init() -> bool { true }
fn default_producer_grace_ms() -> u64 { 2000 }
fn default_ready_delay_ms() -> u64 { 100 }

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            producer_fifo: default_producer_fifo(),
            writer_fifo: default_writer_fifo(),
            producer: ProducerConfig::default(),
            status_init: None,
            writer: default_writer(),
            strict_status_init: default_strict_status_init(),
            producer_grace_ms: default_producer_grace_ms(),
            ready_delay_ms: default_ready_delay_ms(),
        }
    }
}

impl SupervisorConfig {
    pub fn status_init_command(&self) -> CommandSpec {
        match &self.status_init {
            Some(path) => CommandSpec::new(path),
            None => CommandSpec::new(default_status_init()),
        }
    }

    pub fn writer_command(&self) -> CommandSpec {
        CommandSpec::new(&self.writer)
    }
}

fn default_status_init() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(crate::STATUS_INIT_NAME)))
        .unwrap_or_else(|| PathBuf::from(crate::STATUS_INIT_NAME))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub output: Option<PathBuf>,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => Err(ConfigError::Format(path.to_path_buf())),
        }
    }

    /// Explicit file if given, else the system file if it exists, else defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let system = Path::new(crate::DEFAULT_CONFIG_PATH);
                if system.exists() {
                    log::debug!("Using config file {:?}", system);
                    Self::from_file(system)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overrides fields from `SCANCTL_*` variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SCANCTL_STATUS_TOOL") {
            self.registry.program = PathBuf::from(v);
        }
        if let Some(v) = lookup("SCANCTL_CENTURY") {
            let base = v.parse().map_err(|_| ConfigError::Env {
                key: "SCANCTL_CENTURY".to_string(),
                value: v.clone(),
            })?;
            self.time.century = Some(base);
        }
        if let Some(v) = lookup("SCANCTL_PRODUCER_FIFO") {
            self.supervisor.producer_fifo = PathBuf::from(v);
        }
        if let Some(v) = lookup("SCANCTL_WRITER_FIFO") {
            self.supervisor.writer_fifo = PathBuf::from(v);
        }
        if let Some(v) = lookup("SCANCTL_PRODUCER") {
            self.supervisor.producer.program = PathBuf::from(v);
        }
        if let Some(v) = lookup("SCANCTL_BIND_HOST") {
            self.supervisor.producer.bind_host = v;
        }
        if let Some(v) = lookup("SCANCTL_STATUS_INIT") {
            self.supervisor.status_init = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SCANCTL_WRITER") {
            self.supervisor.writer = PathBuf::from(v);
        }
        if let Some(v) = lookup("SCANCTL_LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}
