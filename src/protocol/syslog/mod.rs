//! Lightweight syslog codec facade used by sources.
//!
//! The decoder turns one RFC 5424 payload into a [`Message`]; the encoder
//! goes the other way and also knows how to wrap a line in RFC 5425
//! octet-counting framing. Both are kept free of any transport concerns.

mod decoder;
mod encoder;
mod message;

pub use decoder::{GrammarError, PartialMessage, SyslogDecoder, SyslogField};
pub use encoder::SyslogEncoder;
pub use message::{
    FACILITY_NAMES, Message, NIL, SEVERITY_NAMES, SdElement, facility_name, severity_name,
};
