//! Warp Parse syslog receiver.
//!
//! Accepts RFC 5425 octet-counted syslog streams over TCP, TLS or Unix
//! domain sockets, parses every frame as RFC 5424 and hands the result to a
//! [`sources::syslog::RecordSink`] as flat, tagged records.

#[macro_use]
extern crate wp_log;

#[macro_use]
extern crate serde_derive;

pub mod protocol;
pub mod sources;
pub mod types;

pub use protocol::syslog::{Message, PartialMessage, SyslogDecoder, SyslogEncoder};
pub use sources::syslog::{
    ChannelSink, Clock, EmittedRecord, ErrorPolicy, ReceiveError, ReceiverHandle, RecordSink,
    SinkEvent, SyslogReceiver, SyslogSourceSpec, SystemClock,
};
pub use sources::tcp::{Frame, FrameError, OctetCountingCodec};
