//! Per-connection worker: frames → policy → sink.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use super::error::TransportError;
use super::policy::{Disposition, ErrorPolicy};
use super::record::{EmittedRecord, ReceiptClock};
use super::sink::RecordSink;
use crate::protocol::syslog::SyslogDecoder;
use crate::sources::tcp::{BoxedStream, FrameError, OctetCountingCodec, TimedStream};

/// State shared by every worker of one receiver.
pub(crate) struct WorkerShared {
    pub policy: ErrorPolicy,
    pub decoder: SyslogDecoder,
    pub separator: String,
    pub max_frame_bytes: usize,
    pub read_timeout: Option<Duration>,
    pub tls: Option<TlsAcceptor>,
    pub sink: Arc<dyn RecordSink>,
    pub clock: ReceiptClock,
    pub cancel: CancellationToken,
}

impl WorkerShared {
    async fn dispatch(&self, conn_id: u64, disposition: Disposition) {
        if let Some(msg) = disposition.message {
            let record = EmittedRecord::from_message(&msg, &self.separator, self.clock.next());
            self.sink.emit(record).await;
        }
        if let Some(error) = disposition.error {
            warn_data!("syslog conn {} rejected frame: {}", conn_id, error);
            self.sink.report(error).await;
        }
    }

    async fn handshake(&self, conn_id: u64, stream: BoxedStream) -> Option<BoxedStream> {
        let stream = TimedStream::new(stream, self.read_timeout);
        let Some(acceptor) = &self.tls else {
            return Some(Box::new(stream));
        };
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            res = acceptor.accept(stream) => match res {
                Ok(tls) => Some(Box::new(tls)),
                Err(e) => {
                    let err = match TransportError::from_read(e, self.read_timeout) {
                        TransportError::Io(e) => TransportError::Handshake(e),
                        other => other,
                    };
                    warn_data!("syslog conn {} {}", conn_id, err);
                    None
                }
            },
        }
    }
}

/// Serve one accepted connection until the peer closes, the stream breaks,
/// the policy closes it, or the receiver stops.
pub(crate) async fn serve_connection(
    shared: Arc<WorkerShared>,
    conn_id: u64,
    peer: String,
    stream: BoxedStream,
) {
    debug_data!("syslog conn {} opened from {}", conn_id, peer);
    let Some(stream) = shared.handshake(conn_id, stream).await else {
        return;
    };
    let mut frames = FramedRead::new(stream, OctetCountingCodec::new(shared.max_frame_bytes));

    loop {
        let next = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                debug_data!("syslog conn {} closed by receiver stop", conn_id);
                break;
            }
            next = frames.next() => next,
        };
        let disposition = match next {
            None => {
                debug_data!("syslog conn {} closed by peer {}", conn_id, peer);
                break;
            }
            Some(Ok(frame)) => {
                trace_data!("syslog conn {} frame len={}", conn_id, frame.declared_len);
                shared.policy.on_frame(&shared.decoder, &frame)
            }
            Some(Err(FrameError::Io(e))) => {
                let err = TransportError::from_read(e, shared.read_timeout);
                if err.is_timeout() {
                    info_data!("syslog conn {} from {}: {}", conn_id, peer, err);
                } else {
                    warn_data!("syslog conn {} from {}: {}", conn_id, peer, err);
                }
                break;
            }
            Some(Err(e)) => shared.policy.on_frame_error(&shared.decoder, e),
        };
        let close = disposition.close;
        // 慢 sink 不能拖住 stop
        tokio::select! {
            biased;
            _ = shared.dispatch(conn_id, disposition) => {}
            _ = shared.cancel.cancelled() => {
                debug_data!("syslog conn {} dispatch abandoned by receiver stop", conn_id);
                break;
            }
        }
        if close {
            debug_data!("syslog conn {} closed by {:?} policy", conn_id, shared.policy);
            break;
        }
    }
}
