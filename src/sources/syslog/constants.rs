//! Syslog 接收器常量

use std::time::Duration;

pub use crate::sources::tcp::DEFAULT_MAX_FRAME_BYTES;

/// Record name handed to sinks.
pub const MEASUREMENT: &str = "syslog";

/// Default listen authority, served as `tcp://0.0.0.0:6514`.
pub const DEFAULT_HOST_PORT: &str = "0.0.0.0:6514";
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SDPARAM_SEPARATOR: &str = "_";

/// Backoff after a failed `accept` (e.g. fd exhaustion).
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

// field / tag keys of an emitted record
pub const FIELD_VERSION: &str = "version";
pub const FIELD_SEVERITY_CODE: &str = "severity_code";
pub const FIELD_FACILITY_CODE: &str = "facility_code";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_PROCID: &str = "procid";
pub const FIELD_MSGID: &str = "msgid";
pub const FIELD_MESSAGE: &str = "message";
pub const TAG_SEVERITY: &str = "severity";
pub const TAG_FACILITY: &str = "facility";
pub const TAG_HOSTNAME: &str = "hostname";
pub const TAG_APPNAME: &str = "appname";
