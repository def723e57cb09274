pub mod command;
pub mod config;
pub mod error;
pub mod registry;
pub mod scan;
pub mod time;

pub use command::{CommandOutcome, CommandSpec};
pub use config::{Config, LoggingConfig, ProducerConfig, SupervisorConfig};
pub use error::{CommandError, ConfigError, ParseError};
pub use registry::StatusRegistry;
pub use scan::{ScanAction, ScanPlan, ScanRequest};
pub use time::{
    current_dmjd, dmjd_to_secs, format_utc, parse_utc, secs_to_dmjd, CenturyPolicy, TimePoint,
};

// Control FIFOs read by the producer and the FITS writer
pub const DEFAULT_PRODUCER_FIFO: &str = "/tmp/fake_gpu_control";
pub const DEFAULT_WRITER_FIFO: &str = "/tmp/vegas_fits_control";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/scanctl/config.yaml";
pub const DEFAULT_STATUS_TOOL: &str = "hashpipe_check_status";
pub const STATUS_INIT_NAME: &str = "set_status";
