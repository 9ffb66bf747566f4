//! Syslog 接收器（RFC 5425 octet-counting + RFC 5424）
//!
//! 模块结构：
//! - config.rs：参数表 / TOML 解析为 `SyslogSourceSpec`
//! - policy.rs：strict / best-effort 错误策略
//! - record.rs：消息到记录的投影，接收时钟
//! - sink.rs：记录下游接口
//! - connection.rs：单连接 worker
//! - receiver.rs：accept 循环、连接数闸门、停止流程
//! - tls.rs：PEM 证书加载

mod config;
mod connection;
pub mod constants;
mod error;
mod policy;
mod receiver;
mod record;
mod sink;
mod tls;


pub use config::{ParamMap, SyslogSourceSpec, TlsConf, parse_duration};
pub use error::{ReceiveError, TransportError};
pub use policy::{Disposition, ErrorPolicy};
pub use receiver::{ReceiverHandle, SyslogReceiver};
pub use record::{Clock, EmittedRecord, FieldValue, ReceiptClock, SystemClock};
pub use sink::{ChannelSink, RecordSink, SinkEvent};
