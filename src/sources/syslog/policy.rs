//! Strict vs. best-effort handling of framing and grammar violations.

use crate::protocol::syslog::{Message, SyslogDecoder};
use crate::sources::tcp::{Frame, FrameError};

use super::error::ReceiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Report every violation and emit nothing for the offending frame.
    /// A grammar error leaves the connection open; framing errors close it.
    #[default]
    Strict,
    /// Emit whatever could be decoded, never report.
    BestEffort,
}

/// Outcome of one framing/parsing step for the connection worker.
#[derive(Debug, Default)]
pub struct Disposition {
    pub message: Option<Message>,
    pub error: Option<ReceiveError>,
    /// Stop reading from the connection after this step.
    pub close: bool,
}

impl Disposition {
    fn emit(message: Message) -> Self {
        Self {
            message: Some(message),
            ..Self::default()
        }
    }

    fn report(error: ReceiveError) -> Self {
        Self {
            message: None,
            error: Some(error),
            close: false,
        }
    }

    fn report_and_close(error: ReceiveError) -> Self {
        Self {
            message: None,
            error: Some(error),
            close: true,
        }
    }

    fn close() -> Self {
        Self {
            close: true,
            ..Self::default()
        }
    }
}

impl ErrorPolicy {
    pub fn from_best_effort(best_effort: bool) -> Self {
        if best_effort {
            ErrorPolicy::BestEffort
        } else {
            ErrorPolicy::Strict
        }
    }

    pub fn is_best_effort(&self) -> bool {
        matches!(self, ErrorPolicy::BestEffort)
    }

    /// A complete frame was read; decode its payload. Framing is still in
    /// sync, so the connection keeps going in both modes.
    pub fn on_frame(&self, decoder: &SyslogDecoder, frame: &Frame) -> Disposition {
        match decoder.decode(&frame.payload) {
            Ok(msg) => Disposition::emit(msg),
            Err(partial) => match self {
                ErrorPolicy::Strict => Disposition::report(partial.error.into()),
                ErrorPolicy::BestEffort => {
                    debug_data!("best-effort: suppressed {}", partial.error);
                    Disposition {
                        message: partial.message,
                        ..Disposition::default()
                    }
                }
            },
        }
    }

    /// Framing broke. Every framing error ends the connection; best-effort
    /// still salvages the bytes of a truncated frame.
    pub fn on_frame_error(&self, decoder: &SyslogDecoder, err: FrameError) -> Disposition {
        if let FrameError::InvalidPrefix(detail) = &err {
            // 没有可归属的帧：两种模式都不上报，只断开
            warn_data!("syslog stream out of sync: {}", detail);
            return Disposition::close();
        }
        if let ErrorPolicy::Strict = self {
            return match ReceiveError::from_frame_error(&err) {
                Some(error) => Disposition::report_and_close(error),
                None => Disposition::close(),
            };
        }
        debug_data!("best-effort: suppressed {}", err);
        match err {
            FrameError::Underflow(frame) => {
                let message = match decoder.decode(&frame.payload) {
                    Ok(msg) => Some(msg),
                    Err(partial) => partial.message,
                };
                Disposition {
                    message,
                    error: None,
                    close: true,
                }
            }
            _ => Disposition::close(),
        }
    }
}
