use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::time::{format_utc, parse_utc, CenturyPolicy, TimePoint};

/// One scheduling step requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanAction {
    /// Absolute start, still unparsed so a bad string only drops this step.
    StartAt(String),
    /// Start this many seconds from now.
    StartIn(i64),
    ScanLength(u32),
}

/// Start time plus scan length, as handed to the status registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub start: Option<TimePoint>,
    pub scan_length: Option<u32>,
}

impl ScanRequest {
    pub fn start_dmjd(&self) -> Option<f64> {
        self.start.map(|tp| tp.dmjd())
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            start_secs: self.start.map(|tp| tp.secs()),
            start_dmjd: self.start_dmjd(),
            start_utc: self.start.and_then(|tp| tp.utc()).map(|dt| format_utc(&dt)),
            scan_length: self.scan_length,
        }
    }
}

/// Flattened, display-ready view of a request.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub start_secs: Option<f64>,
    pub start_dmjd: Option<f64>,
    pub start_utc: Option<String>,
    pub scan_length: Option<u32>,
}

/// Result of resolving actions: the request plus any steps that were dropped.
#[derive(Debug, Clone, Default)]
pub struct ScanPlan {
    pub request: ScanRequest,
    pub errors: Vec<ParseError>,
}

impl ScanPlan {
    /// Applies `actions` in order against a fixed `now`.
    ///
    /// Later start actions replace earlier ones. A start string that fails
    /// to parse is recorded in `errors` and leaves the previous start as is.
    pub fn resolve(actions: &[ScanAction], now: TimePoint, century: CenturyPolicy) -> Self {
        let mut plan = ScanPlan::default();
        for action in actions {
            match action {
                ScanAction::StartAt(text) => match parse_utc(text, century) {
                    Ok(dt) => plan.request.start = Some(TimePoint::from_utc(&dt)),
                    Err(e) => {
                        log::error!("Ignoring start time: {}", e);
                        plan.errors.push(e);
                    }
                },
                ScanAction::StartIn(secs) => plan.request.start = Some(now.offset(*secs)),
                ScanAction::ScanLength(len) => plan.request.scan_length = Some(*len),
            }
        }
        plan
    }
}
