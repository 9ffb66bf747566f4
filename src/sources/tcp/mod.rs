//! 流式传输层
//!
//! 模块结构：
//! - config.rs：监听地址解析与 TCP keep-alive
//! - framing.rs：RFC 5425 octet-counting 分帧
//! - timeout.rs：带读超时的流包装
//! - transport.rs：TCP / Unix socket 监听器

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

mod config;
pub mod framing;
mod timeout;
mod transport;

pub use config::{IpFamily, KeepAlive, ListenAddr};
pub use framing::{DEFAULT_MAX_FRAME_BYTES, Frame, FrameError, OctetCountingCodec};
pub use timeout::TimedStream;
pub use transport::{AsyncStream, BoundAddr, BoxedStream, TransportListener};

pub(crate) type ConnectionRegistry = Arc<Mutex<HashSet<u64>>>;

pub(crate) fn lock_registry(registry: &ConnectionRegistry) -> MutexGuard<'_, HashSet<u64>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}
