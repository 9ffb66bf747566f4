//! Flat record projection of a decoded message, plus the receipt clock.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};

use super::constants::*;
use crate::protocol::syslog::Message;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Bool(bool),
    Str(String),
    /// MSG that is not valid UTF-8, kept byte for byte.
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Text when `raw` is valid UTF-8, otherwise the untouched bytes.
    pub fn from_raw(raw: &[u8]) -> Self {
        match std::str::from_utf8(raw) {
            Ok(text) => FieldValue::Str(text.to_string()),
            Err(_) => FieldValue::Bytes(raw.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Str(s) => Some(s.as_bytes()),
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

/// What a sink receives for every emitted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedRecord {
    pub name: &'static str,
    pub fields: BTreeMap<String, FieldValue>,
    pub tags: BTreeMap<String, String>,
    pub time: DateTime<Utc>,
}

impl EmittedRecord {
    /// Project `msg`; `received_at` is used as record time when the message
    /// carries no TIMESTAMP.
    pub fn from_message(msg: &Message, separator: &str, received_at: DateTime<Utc>) -> Self {
        let mut fields = BTreeMap::new();
        let mut tags = BTreeMap::new();

        fields.insert(FIELD_VERSION.to_string(), FieldValue::UInt(u64::from(msg.version)));
        fields.insert(
            FIELD_SEVERITY_CODE.to_string(),
            FieldValue::Int(i64::from(msg.severity)),
        );
        fields.insert(
            FIELD_FACILITY_CODE.to_string(),
            FieldValue::Int(i64::from(msg.facility)),
        );
        if let Some(nanos) = msg.timestamp.and_then(|ts| ts.timestamp_nanos_opt()) {
            fields.insert(FIELD_TIMESTAMP.to_string(), FieldValue::Int(nanos));
        }
        for (key, value) in [(FIELD_PROCID, &msg.procid), (FIELD_MSGID, &msg.msgid)] {
            if let Some(v) = value {
                fields.insert(key.to_string(), FieldValue::Str(v.clone()));
            }
        }
        if let Some(raw) = &msg.message {
            fields.insert(FIELD_MESSAGE.to_string(), FieldValue::from_raw(raw));
        }

        tags.insert(TAG_SEVERITY.to_string(), msg.severity_name().to_string());
        tags.insert(TAG_FACILITY.to_string(), msg.facility_name().to_string());
        for (key, value) in [(TAG_HOSTNAME, &msg.hostname), (TAG_APPNAME, &msg.appname)] {
            if let Some(v) = value {
                tags.insert(key.to_string(), v.clone());
            }
        }

        // SD 展开：<id><sep><name>；无参数的元素记为 <id> = true
        for element in &msg.structured_data {
            if element.params.is_empty() {
                fields.insert(element.id.clone(), FieldValue::Bool(true));
                continue;
            }
            for (name, value) in &element.params {
                fields.insert(
                    format!("{}{}{}", element.id, separator, name),
                    FieldValue::Str(value.clone()),
                );
            }
        }

        let time = msg
            .timestamp
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or(received_at);
        Self {
            name: MEASUREMENT,
            fields,
            tags,
            time,
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Source of receipt times. Must be callable from many workers at once.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// Wraps a [`Clock`] so that consecutive readings strictly increase:
/// a reading not after the previous one is bumped by one nanosecond.
pub struct ReceiptClock {
    clock: Box<dyn Clock>,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl ReceiptClock {
    pub fn new(clock: impl Clock) -> Self {
        Self {
            clock: Box::new(clock),
            last: Mutex::new(None),
        }
    }

    pub fn next(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            Some(prev) if now <= prev => prev + TimeDelta::nanoseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }
}
