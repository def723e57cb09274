use std::path::PathBuf;

use crate::command::CommandSpec;
use crate::scan::ScanRequest;

pub const KEY_START_DMJD: &str = "STRTDMJD";
pub const KEY_SCAN_LENGTH: &str = "SCANLEN";

/// Client for the backend's status-registry command-line tool.
#[derive(Debug, Clone)]
pub struct StatusRegistry {
    program: PathBuf,
}

impl StatusRegistry {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `-k KEY -d VALUE`, VALUE printed with six decimals.
    pub fn set_real(&self, key: &str, value: f64) -> CommandSpec {
        let value = format!("{:.6}", value);
        CommandSpec::new(&self.program).args(["-k", key, "-d", value.as_str()])
    }

    /// `-k KEY -i VALUE`
    pub fn set_int(&self, key: &str, value: i64) -> CommandSpec {
        let value = value.to_string();
        CommandSpec::new(&self.program).args(["-k", key, "-i", value.as_str()])
    }

    /// `-v`, prints every key.
    pub fn dump(&self) -> CommandSpec {
        CommandSpec::new(&self.program).arg("-v")
    }

    /// Calls that store `request`, start time first.
    pub fn calls_for(&self, request: &ScanRequest) -> Vec<CommandSpec> {
        let mut calls = Vec::new();
        if let Some(dmjd) = request.start_dmjd() {
            calls.push(self.set_real(KEY_START_DMJD, dmjd));
        }
        if let Some(len) = request.scan_length {
            calls.push(self.set_int(KEY_SCAN_LENGTH, len as i64));
        }
        calls
    }
}
