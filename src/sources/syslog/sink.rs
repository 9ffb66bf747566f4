use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::ReceiveError;
use super::record::EmittedRecord;

/// Consumer of receiver output. Called concurrently from every connection
/// worker; records of one connection arrive in frame order.
#[async_trait]
pub trait RecordSink: Send + Sync + 'static {
    async fn emit(&self, record: EmittedRecord);

    /// One call per offending frame (strict mode only).
    async fn report(&self, error: ReceiveError);
}

#[async_trait]
impl<T: RecordSink + ?Sized> RecordSink for Arc<T> {
    async fn emit(&self, record: EmittedRecord) {
        (**self).emit(record).await
    }

    async fn report(&self, error: ReceiveError) {
        (**self).report(error).await
    }
}

#[derive(Debug)]
pub enum SinkEvent {
    Record(EmittedRecord),
    Error(ReceiveError),
}

impl SinkEvent {
    pub fn into_record(self) -> Option<EmittedRecord> {
        match self {
            SinkEvent::Record(r) => Some(r),
            SinkEvent::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SinkEvent::Error(_))
    }
}

/// Forwards everything into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SinkEvent) {
        if self.tx.send(event).is_err() {
            trace_data!("channel sink receiver dropped, event discarded");
        }
    }
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn emit(&self, record: EmittedRecord) {
        self.forward(SinkEvent::Record(record));
    }

    async fn report(&self, error: ReceiveError) {
        self.forward(SinkEvent::Error(error));
    }
}
