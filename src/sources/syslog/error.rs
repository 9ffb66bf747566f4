use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::syslog::GrammarError;
use crate::sources::tcp::FrameError;

/// Per-frame violation, reported to the sink in strict mode.
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("framing underflow: declared {declared} octets, received {received}")]
    FramingUnderflow { declared: usize, received: usize },
    #[error("framing overflow: declared {declared} octets, maximum is {max}")]
    FramingOverflow { declared: u64, max: usize },
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

impl ReceiveError {
    /// Map a codec error onto the per-frame taxonomy. I/O errors are
    /// connection level and a broken prefix has no frame to blame, so
    /// neither has a per-frame counterpart.
    pub fn from_frame_error(err: &FrameError) -> Option<Self> {
        match err {
            FrameError::Underflow(frame) => Some(ReceiveError::FramingUnderflow {
                declared: frame.declared_len,
                received: frame.payload.len(),
            }),
            FrameError::Overflow { declared, max } => Some(ReceiveError::FramingOverflow {
                declared: *declared,
                max: *max,
            }),
            FrameError::InvalidPrefix(_) | FrameError::Io(_) => None,
        }
    }
}

/// Connection-level failure. Logged and the connection closed; never
/// turned into a per-message error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),
    #[error("tls handshake failed: {0}")]
    Handshake(#[source] io::Error),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn from_read(err: io::Error, read_timeout: Option<Duration>) -> Self {
        match (err.kind(), read_timeout) {
            (io::ErrorKind::TimedOut, Some(d)) => TransportError::ReadTimeout(d),
            _ => TransportError::Io(err),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::ReadTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::tcp::Frame;
    use bytes::Bytes;

    #[test]
    fn frame_errors_map_to_receive_errors() {
        let underflow = FrameError::Underflow(Frame {
            declared_len: 16,
            payload: Bytes::from_static(b"<1>2"),
        });
        let err = ReceiveError::from_frame_error(&underflow).unwrap();
        assert!(matches!(
            err,
            ReceiveError::FramingUnderflow {
                declared: 16,
                received: 4
            }
        ));
        assert_eq!(
            err.to_string(),
            "framing underflow: declared 16 octets, received 4"
        );

        let io = FrameError::Io(io::Error::other("reset"));
        assert!(ReceiveError::from_frame_error(&io).is_none());
        let prefix = FrameError::InvalidPrefix("expected SP".into());
        assert!(ReceiveError::from_frame_error(&prefix).is_none());
    }

    #[test]
    fn timed_out_reads_become_read_timeout() {
        let err = TransportError::from_read(
            io::Error::new(io::ErrorKind::TimedOut, "stall"),
            Some(Duration::from_secs(5)),
        );
        assert!(err.is_timeout());
        let err = TransportError::from_read(io::Error::other("reset"), None);
        assert!(!err.is_timeout());
    }
}
