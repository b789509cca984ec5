use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const RESULT_TYPE: &str = "result";
pub const LOG_TYPE: &str = "log";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("line is not valid JSON: {0}")]
    Parse(String),
    #[error("unrecognized message type '{0}'")]
    UnknownType(String),
    #[error("malformed {kind} message: {detail}")]
    Malformed { kind: &'static str, detail: String },
    #[error("message encode failed: {0}")]
    Encode(String),
}

/// Per-test outcome classification carried by result messages. Unrecognized
/// status strings are mapped to `None` at decode time so the rest of the
/// message (progress, current file) still applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecStatus {
    Passed,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Log,
    Info,
    Debug,
    Other,
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LogLevelVisitor;

        impl<'de> serde::de::Visitor<'de> for LogLevelVisitor {
            type Value = LogLevel;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a log level string")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(match value.trim().to_ascii_lowercase().as_str() {
                    "error" => LogLevel::Error,
                    "warning" | "warn" => LogLevel::Warning,
                    "log" => LogLevel::Log,
                    "info" => LogLevel::Info,
                    "debug" => LogLevel::Debug,
                    // Unrecognized levels never kill a message; they just
                    // land outside both log views.
                    _ => LogLevel::Other,
                })
            }
        }

        deserializer.deserialize_str(LogLevelVisitor)
    }
}

impl LogLevel {
    /// Severity rank for the diagnostics view: error > warning > debug.
    pub fn severity(self) -> u8 {
        match self {
            LogLevel::Error => 3,
            LogLevel::Warning => 2,
            LogLevel::Debug => 1,
            _ => 0,
        }
    }

    pub fn is_info_like(self) -> bool {
        matches!(self, LogLevel::Log | LogLevel::Info)
    }

    pub fn is_diagnostic(self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Warning | LogLevel::Debug)
    }

    pub fn tag(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Log => "LOG",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Other => "OTHER",
        }
    }
}

/// One worker's progress update. `type` is omitted on the wire when the
/// sender treats result as the default message kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultUpdate {
    pub worker: String,
    #[serde(
        default,
        deserialize_with = "lenient_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<SpecStatus>,
    #[serde(default)]
    pub percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default)]
    pub stream: String,
    pub message: String,
}

fn default_log_level() -> LogLevel {
    LogLevel::Log
}

fn lenient_status<'de, D>(deserializer: D) -> Result<Option<SpecStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(|status| match status {
        "passed" => Some(SpecStatus::Passed),
        "failed" => Some(SpecStatus::Failed),
        "pending" => Some(SpecStatus::Pending),
        _ => None,
    }))
}

/// A decoded wire message. The boundary decode keeps this set closed: the
/// store never sees a dynamic map.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Result(ResultUpdate),
    Log(LogRecord),
}

impl Event {
    pub fn result(worker: impl Into<String>, status: Option<SpecStatus>, percent: f64) -> Self {
        Event::Result(ResultUpdate {
            worker: worker.into(),
            status,
            percent,
            file: None,
        })
    }

    pub fn log(level: LogLevel, stream: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Log(LogRecord {
            level,
            stream: stream.into(),
            message: message.into(),
        })
    }

    /// Encode as one newline-terminated wire line, tagging the message kind
    /// explicitly.
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let (kind, value) = match self {
            Event::Result(update) => (RESULT_TYPE, serde_json::to_value(update)),
            Event::Log(record) => (LOG_TYPE, serde_json::to_value(record)),
        };
        let mut value = value.map_err(|err| ProtocolError::Encode(err.to_string()))?;
        value["type"] = Value::from(kind);
        let mut line =
            serde_json::to_string(&value).map_err(|err| ProtocolError::Encode(err.to_string()))?;
        line.push('\n');
        Ok(line)
    }
}

/// Decode one newline-delimited line. `type` absent defaults to a result
/// message; an unrecognized `type` or a shape that fails its typed decode is
/// an error the caller drops without closing the connection.
pub fn decode_line(line: &str) -> Result<Event, ProtocolError> {
    let value: Value =
        serde_json::from_str(line.trim_end()).map_err(|err| ProtocolError::Parse(err.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(RESULT_TYPE)
        .to_string();
    match kind.as_str() {
        RESULT_TYPE => serde_json::from_value::<ResultUpdate>(value)
            .map(Event::Result)
            .map_err(|err| ProtocolError::Malformed {
                kind: RESULT_TYPE,
                detail: err.to_string(),
            }),
        LOG_TYPE => serde_json::from_value::<LogRecord>(value)
            .map(Event::Log)
            .map_err(|err| ProtocolError::Malformed {
                kind: LOG_TYPE,
                detail: err.to_string(),
            }),
        _ => Err(ProtocolError::UnknownType(kind)),
    }
}
