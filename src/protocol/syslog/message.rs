use bytes::Bytes;
use chrono::{DateTime, FixedOffset};

/// Nil value marker of the RFC 5424 header and structured-data part.
pub const NIL: &str = "-";

/// Severity names, indexed by severity code.
pub const SEVERITY_NAMES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

/// Facility names, indexed by facility code (RFC 3164 / RFC 5424 table).
pub const FACILITY_NAMES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "uucp", "clock", "authpriv",
    "ftp", "ntp", "audit", "alert", "clock2", "local0", "local1", "local2", "local3", "local4",
    "local5", "local6", "local7",
];

pub fn severity_name(code: u8) -> &'static str {
    SEVERITY_NAMES
        .get(code as usize)
        .copied()
        .unwrap_or("unknown")
}

pub fn facility_name(code: u8) -> &'static str {
    FACILITY_NAMES
        .get(code as usize)
        .copied()
        .unwrap_or("unknown")
}

/// One `[SD-ID param="value" ...]` block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdElement {
    pub id: String,
    pub params: Vec<(String, String)>,
}

/// Decoded RFC 5424 message. `None` means the source token was the nil
/// marker (or, for a partial decode, that parsing never got that far).
/// MSG is kept as the raw payload bytes; it is not required to be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: u16,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub hostname: Option<String>,
    pub appname: Option<String>,
    pub procid: Option<String>,
    pub msgid: Option<String>,
    pub severity: u8,
    pub facility: u8,
    pub structured_data: Vec<SdElement>,
    pub message: Option<Bytes>,
}

impl Message {
    pub fn new(pri: u8, version: u16) -> Self {
        Self {
            version,
            timestamp: None,
            hostname: None,
            appname: None,
            procid: None,
            msgid: None,
            severity: pri % 8,
            facility: pri / 8,
            structured_data: Vec::new(),
            message: None,
        }
    }

    /// MSG as text, when it is valid UTF-8.
    pub fn message_str(&self) -> Option<&str> {
        self.message
            .as_deref()
            .and_then(|raw| std::str::from_utf8(raw).ok())
    }

    pub fn pri(&self) -> u8 {
        self.facility * 8 + self.severity
    }

    pub fn severity_name(&self) -> &'static str {
        severity_name(self.severity)
    }

    pub fn facility_name(&self) -> &'static str {
        facility_name(self.facility)
    }
}
