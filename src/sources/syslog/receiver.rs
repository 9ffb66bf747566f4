//! Accept loop, connection gate and lifecycle of one syslog listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::config::SyslogSourceSpec;
use super::connection::{WorkerShared, serve_connection};
use super::constants::ACCEPT_ERROR_BACKOFF;
use super::record::{Clock, ReceiptClock};
use super::sink::RecordSink;
use super::tls;
use crate::protocol::syslog::SyslogDecoder;
use crate::sources::tcp::{
    BoundAddr, BoxedStream, ConnectionRegistry, KeepAlive, TransportListener, lock_registry,
};
use crate::types::AnyResult;

/// Removes its connection id from the registry when the worker ends.
struct RegistryGuard {
    id: u64,
    registry: ConnectionRegistry,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        lock_registry(&self.registry).remove(&self.id);
    }
}

struct AcceptLoop {
    key: String,
    listener: TransportListener,
    keep_alive: KeepAlive,
    max_connections: usize,
    registry: ConnectionRegistry,
    next_id: AtomicU64,
    tracker: TaskTracker,
    shared: Arc<WorkerShared>,
}

impl AcceptLoop {
    async fn run(self) {
        let cancel = self.shared.cancel.clone();
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.listener.accept(self.keep_alive) => res,
            };
            match accepted {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) => {
                    error_data!("syslog listener '{}' accept error: {}", self.key, e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
        self.listener.cleanup();
        info_data!("syslog listener '{}' stopped accepting", self.key);
    }

    fn admit(&self, stream: BoxedStream, peer: String) {
        let admitted = {
            let mut active = lock_registry(&self.registry);
            if self.max_connections > 0 && active.len() >= self.max_connections {
                None
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                active.insert(id);
                Some((id, active.len()))
            }
        };
        let Some((id, active)) = admitted else {
            warn_ctrl!(
                "syslog listener '{}' reached max connections ({}), reject {}",
                self.key,
                self.max_connections,
                peer
            );
            return;
        };
        info_ctrl!(
            "syslog listener '{}' accepted {} as connection {} (active={})",
            self.key,
            peer,
            id,
            active
        );
        let guard = RegistryGuard {
            id,
            registry: self.registry.clone(),
        };
        let shared = self.shared.clone();
        self.tracker.spawn(async move {
            let _guard = guard;
            serve_connection(shared, id, peer, stream).await;
        });
    }
}

/// Entry point: binds the listener and starts accepting.
pub struct SyslogReceiver;

impl SyslogReceiver {
    pub async fn start(
        spec: SyslogSourceSpec,
        sink: impl RecordSink,
        clock: impl Clock,
    ) -> AnyResult<ReceiverHandle> {
        let tls = spec.tls.as_ref().map(tls::build_acceptor).transpose()?;
        let listener = TransportListener::bind(&spec.address).await?;
        let local_addr = listener.local_addr()?;
        let key = spec.address.to_string();
        info_ctrl!(
            "syslog listen '{}' local={} tls={} policy={:?} max_conn={} read_timeout={:?}",
            key,
            local_addr,
            tls.is_some(),
            spec.policy(),
            spec.max_connections,
            spec.read_timeout
        );

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let registry = ConnectionRegistry::default();
        let shared = Arc::new(WorkerShared {
            policy: spec.policy(),
            decoder: SyslogDecoder::new(),
            separator: spec.sdparam_separator.clone(),
            max_frame_bytes: spec.max_frame_bytes,
            read_timeout: spec.read_timeout,
            tls,
            sink: Arc::new(sink),
            clock: ReceiptClock::new(clock),
            cancel: cancel.clone(),
        });
        let accept_loop = AcceptLoop {
            key: key.clone(),
            listener,
            keep_alive: spec.keep_alive(),
            max_connections: spec.max_connections,
            registry: registry.clone(),
            next_id: AtomicU64::new(1),
            tracker: tracker.clone(),
            shared,
        };
        let accept_task = tokio::spawn(accept_loop.run());

        Ok(ReceiverHandle {
            key,
            local_addr,
            registry,
            cancel,
            tracker,
            accept_task: Some(accept_task),
        })
    }
}

/// Running receiver. Dropping it cancels everything without waiting;
/// [`ReceiverHandle::stop`] also waits for every worker to exit.
pub struct ReceiverHandle {
    key: String,
    local_addr: BoundAddr,
    registry: ConnectionRegistry,
    cancel: CancellationToken,
    tracker: TaskTracker,
    accept_task: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    pub fn local_addr(&self) -> &BoundAddr {
        &self.local_addr
    }

    pub fn active_connections(&self) -> usize {
        lock_registry(&self.registry).len()
    }

    /// Stop accepting, close every open connection and wait for all workers.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error_ctrl!("syslog listener '{}' accept task failed: {}", self.key, e);
            }
        }
        self.tracker.close();
        self.tracker.wait().await;
        info_ctrl!("syslog listener '{}' stopped", self.key);
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
