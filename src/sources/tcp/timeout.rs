use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

/// Stream wrapper whose reads fail with `ErrorKind::TimedOut` when no data
/// arrives within `timeout`. The deadline restarts after every completed
/// read; writes pass straight through.
pub struct TimedStream<S> {
    inner: S,
    timeout: Option<Duration>,
    deadline: Pin<Box<Sleep>>,
    armed: bool,
}

impl<S> TimedStream<S> {
    /// `None` disables the read deadline.
    pub fn new(inner: S, timeout: Option<Duration>) -> Self {
        Self {
            inner,
            timeout,
            deadline: Box::pin(tokio::time::sleep(Duration::ZERO)),
            armed: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TimedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Poll::Ready(res) = Pin::new(&mut this.inner).poll_read(cx, buf) {
            this.armed = false;
            return Poll::Ready(res);
        }
        let Some(timeout) = this.timeout else {
            return Poll::Pending;
        };
        if !this.armed {
            this.deadline.as_mut().reset(Instant::now() + timeout);
            this.armed = true;
        }
        match this.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                this.armed = false;
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data received within {:?}", timeout),
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TimedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn stalled_read_times_out() {
        let (_client, server) = tokio::io::duplex(64);
        let mut timed = TimedStream::new(server, Some(Duration::from_millis(50)));
        let mut buf = [0u8; 8];
        let err = timed.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn deadline_restarts_after_each_read() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut timed = TimedStream::new(server, Some(Duration::from_millis(200)));
        let writer = tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(120)).await;
                client.write_all(b"x").await.unwrap();
            }
            client
        });
        let mut buf = [0u8; 1];
        for _ in 0..3 {
            timed.read_exact(&mut buf).await.unwrap();
        }
        let _client = writer.await.unwrap();
    }

    #[tokio::test]
    async fn no_timeout_when_disabled() {
        let (_client, server) = tokio::io::duplex(64);
        let mut timed = TimedStream::new(server, None);
        let mut buf = [0u8; 8];
        let res =
            tokio::time::timeout(Duration::from_millis(100), timed.read(&mut buf)).await;
        assert!(res.is_err(), "read should still be pending");
    }
}
