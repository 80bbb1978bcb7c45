use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Store-assigned record identifier.
pub type RecordId = u64;

/// Category a log record is filed under on the collector side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Log,
    Error,
    Crash,
}

impl LogType {
    pub const ALL: [LogType; 3] = [LogType::Log, LogType::Error, LogType::Crash];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Log => "log",
            LogType::Error => "error",
            LogType::Crash => "crash",
        }
    }
}

impl Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownLogType(s.to_string()))
    }
}

/// Destination triple a record is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub log_type: LogType,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(log_type: LogType, host: impl Into<String>, port: u16) -> Self {
        Self {
            log_type,
            host: host.into(),
            port,
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.log_type, self.host, self.port)
    }
}
