// Container log parsing: `docker logs --timestamps` output to structured lines.
mod parse;

pub use parse::{parse_line, parse_logs};

use std::fmt;

use serde::Serialize;

/// One line of container output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    /// Leading ISO-8601 timestamp exactly as the runtime printed it.
    pub timestamp: Option<String>,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.timestamp {
            Some(ts) => write!(f, "{ts} {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}
