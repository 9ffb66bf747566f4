use bytes::{BufMut, Bytes, BytesMut};
use chrono::SecondsFormat;

use super::message::{Message, NIL};

/// Formats [`Message`] values as RFC 5424 lines and RFC 5425 frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyslogEncoder;

impl SyslogEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode an RFC 5424 line (no framing, no trailing newline).
    pub fn encode_rfc5424(&self, msg: &Message) -> Bytes {
        let mut out = BytesMut::with_capacity(64 + msg.message.as_ref().map_or(0, Bytes::len));
        out.put_slice(format!("<{}>{} ", msg.pri(), msg.version).as_bytes());
        match msg.timestamp {
            Some(ts) => out.put_slice(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true).as_bytes()),
            None => out.put_slice(NIL.as_bytes()),
        }
        for field in [&msg.hostname, &msg.appname, &msg.procid, &msg.msgid] {
            out.put_u8(b' ');
            out.put_slice(field.as_deref().unwrap_or(NIL).as_bytes());
        }
        out.put_u8(b' ');
        if msg.structured_data.is_empty() {
            out.put_slice(NIL.as_bytes());
        }
        for element in &msg.structured_data {
            out.put_u8(b'[');
            out.put_slice(element.id.as_bytes());
            for (name, value) in &element.params {
                out.put_u8(b' ');
                out.put_slice(name.as_bytes());
                out.put_slice(b"=\"");
                put_escaped(&mut out, value);
                out.put_u8(b'"');
            }
            out.put_u8(b']');
        }
        if let Some(raw) = &msg.message {
            out.put_u8(b' ');
            out.put_slice(raw);
        }
        out.freeze()
    }

    /// Wrap a payload in octet-counting framing: `<len> <payload>`.
    pub fn frame_octet_counted(&self, payload: &[u8]) -> Bytes {
        let prefix = format!("{} ", payload.len());
        let mut out = BytesMut::with_capacity(prefix.len() + payload.len());
        out.put_slice(prefix.as_bytes());
        out.put_slice(payload);
        out.freeze()
    }

    pub fn encode_frame(&self, msg: &Message) -> Bytes {
        self.frame_octet_counted(&self.encode_rfc5424(msg))
    }
}

fn put_escaped(out: &mut BytesMut, value: &str) {
    for b in value.bytes() {
        if matches!(b, b'"' | b'\\' | b']') {
            out.put_u8(b'\\');
        }
        out.put_u8(b);
    }
}
