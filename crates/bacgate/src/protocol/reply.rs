//! Outbound terms: call results and unsolicited notifications

use bacgate_term::Term;

use crate::device::CommandEffect;
use crate::error::{DecodeError, DispatchError};

/// Result carried by a `$gen_reply`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    BadRequest,
    FailedProcessing,
}

impl Reply {
    pub fn to_term(self) -> Term {
        match self {
            Reply::Ok => Term::atom("ok"),
            Reply::BadRequest => error_term("bad_request"),
            Reply::FailedProcessing => error_term("failed_processing"),
        }
    }
}

impl From<&DecodeError> for Reply {
    fn from(_: &DecodeError) -> Self {
        Reply::BadRequest
    }
}

impl From<&DispatchError> for Reply {
    fn from(_: &DispatchError) -> Self {
        Reply::FailedProcessing
    }
}

fn error_term(reason: &str) -> Term {
    Term::tuple(vec![Term::atom("error"), Term::atom(reason)])
}

/// Severity of a forwarded log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

/// Unsolicited frame pushed to the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A field write started a command object
    Command(CommandEffect),
    Log { level: LogLevel, message: String },
    Heartbeat,
}

impl Notification {
    pub fn to_term(&self) -> Term {
        match self {
            Notification::Command(effect) => Term::tuple(vec![
                Term::atom("$event"),
                Term::tuple(vec![
                    Term::atom("command"),
                    Term::from(effect.device_id),
                    Term::from(effect.object_id),
                    Term::from(effect.value),
                ]),
            ]),
            Notification::Log { level, message } => Term::tuple(vec![
                Term::atom("log"),
                Term::atom(level.as_str()),
                Term::binary(message.as_bytes()),
            ]),
            Notification::Heartbeat => Term::atom("heartbeat"),
        }
    }
}
