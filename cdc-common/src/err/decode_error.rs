use std::fmt;
use std::fmt::Display;
use std::io;
use std::num::ParseIntError;
use std::str::Utf8Error;
use std::string::FromUtf8Error;

/// The stable error taxonomy for the pipeline (spec §7).
///
/// Each variant names an origin and a propagation rule; callers match on the
/// variant rather than the message to decide whether a failure is fatal,
/// retryable, or merely logged.
#[derive(Debug)]
pub enum ReError {
    /// A configuration document failed validation (duplicate table, bad
    /// topic template, missing TLS asset, ...). Fails `start`; no restart
    /// is attempted until the document is fixed.
    ConfigInvalid(String),

    /// The configuration file could not be read at all. Fails `start`; the
    /// watcher keeps retrying on its own schedule.
    ConfigIO(String),

    /// A transient driver error (connection lost, replication lag). Callers
    /// retry with exponential backoff.
    DriverTransient(String),

    /// An unrecoverable driver error (unknown operation code, missing
    /// replication privilege, lost replication slot). The engine moves to
    /// `FAILED`.
    DriverFatal(String),

    /// The broker is unreachable. Health becomes `DOWN`, backpressure
    /// engages.
    BrokerUnavailable(String),

    /// A row could not be serialized to the wire format. The event is
    /// skipped and counted as failed; the offset is not advanced for it.
    SerializationError(String),

    /// A single field failed normalization. The field falls back to its
    /// driver string representation; the event is still emitted.
    NormalizationWarning(String),

    /// The offset store failed to persist a position. Logged; the driver
    /// keeps its in-memory cursor and will redeliver on restart.
    OffsetStoreError(String),

    /// `start`/`stop` was called in violation of the state-machine
    /// contract (§4.4). Returned synchronously; no state change occurs.
    EngineBusy(String),

    /// A would-never-happen invariant violation. If this appears, it's a
    /// bug in this codebase, not in the caller or the source system.
    Bug(String),

    IoError(io::Error),
    Utf8Error(Utf8Error),
    FromUtf8Error(FromUtf8Error),
    ParseIntError(ParseIntError),
}

impl Display for ReError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReError::ConfigInvalid(s) => write!(f, "invalid configuration: {}", s),
            ReError::ConfigIO(s) => write!(f, "configuration I/O error: {}", s),
            ReError::DriverTransient(s) => write!(f, "transient driver error: {}", s),
            ReError::DriverFatal(s) => write!(f, "fatal driver error: {}", s),
            ReError::BrokerUnavailable(s) => write!(f, "broker unavailable: {}", s),
            ReError::SerializationError(s) => write!(f, "serialization error: {}", s),
            ReError::NormalizationWarning(s) => write!(f, "normalization warning: {}", s),
            ReError::OffsetStoreError(s) => write!(f, "offset store error: {}", s),
            ReError::EngineBusy(s) => write!(f, "engine busy: {}", s),
            ReError::Bug(s) => write!(f, "bug: {}", s),
            ReError::IoError(err) => write!(f, "{}", err),
            ReError::Utf8Error(err) => write!(f, "{}", err),
            ReError::FromUtf8Error(err) => write!(f, "{}", err),
            ReError::ParseIntError(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ReError {}

impl From<io::Error> for ReError {
    fn from(error: io::Error) -> Self {
        ReError::IoError(error)
    }
}

impl From<Utf8Error> for ReError {
    fn from(error: Utf8Error) -> Self {
        ReError::Utf8Error(error)
    }
}

impl From<FromUtf8Error> for ReError {
    fn from(error: FromUtf8Error) -> Self {
        ReError::FromUtf8Error(error)
    }
}

impl From<ParseIntError> for ReError {
    fn from(error: ParseIntError) -> Self {
        ReError::ParseIntError(error)
    }
}

impl ReError {
    /// `true` for the handful of variants a caller should retry with
    /// backoff rather than surface to the state machine.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReError::DriverTransient(_) | ReError::BrokerUnavailable(_))
    }

    /// `true` for variants that must move the engine to `FAILED`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReError::DriverFatal(_) | ReError::Bug(_))
    }
}
