//! Octet-counting 分帧（RFC 5425）
//!
//! `OctetCountingCodec` plugs into `tokio_util::codec::FramedRead`, which
//! turns a connection into a lazy stream of [`Frame`]s that ends when the
//! peer closes the socket or framing breaks.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::Decoder;

/// Frame ceiling used by RFC 5425 receivers unless configured otherwise.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8192;

// 长度前缀最多 10 位十进制
const MAX_LEN_DIGITS: usize = 10;
const PREVIEW_BYTES: usize = 32;

/// One `<len> <payload>` unit. `payload.len() < declared_len` only for the
/// truncated frame carried by [`FrameError::Underflow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub declared_len: usize,
    pub payload: Bytes,
}

impl Frame {
    pub fn is_complete(&self) -> bool {
        self.payload.len() == self.declared_len
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(
        "octet-counting underflow: declared {} octets, stream ended after {}",
        .0.declared_len,
        .0.payload.len()
    )]
    Underflow(Frame),
    #[error("octet-counting overflow: declared {declared} octets, maximum is {max}")]
    Overflow { declared: u64, max: usize },
    #[error("invalid octet-counting prefix: {0}")]
    InvalidPrefix(String),
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Length,
    Payload(usize),
}

/// Decoder for RFC 5425 octet-counting framing.
#[derive(Debug, Clone)]
pub struct OctetCountingCodec {
    max_frame_len: usize,
    state: DecodeState,
}

impl Default for OctetCountingCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl OctetCountingCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            state: DecodeState::Length,
        }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    fn decode_length(&self, src: &mut BytesMut) -> Result<Option<usize>, FrameError> {
        let digits = src.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            if src.is_empty() {
                return Ok(None);
            }
            return Err(FrameError::InvalidPrefix(format!(
                "expected length digits, found '{}'",
                preview(src)
            )));
        }
        let declared = src[..digits]
            .iter()
            .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(u64::from(d - b'0')));
        if declared > self.max_frame_len as u64 || digits > MAX_LEN_DIGITS {
            return Err(FrameError::Overflow {
                declared,
                max: self.max_frame_len,
            });
        }
        if digits == src.len() {
            // 前缀尚未收齐
            return Ok(None);
        }
        if src[digits] != b' ' {
            return Err(FrameError::InvalidPrefix(format!(
                "expected SP after length, found '{}'",
                preview(&src[digits..])
            )));
        }
        if declared == 0 {
            return Err(FrameError::InvalidPrefix("zero frame length".to_string()));
        }
        src.advance(digits + 1);
        Ok(Some(declared as usize))
    }
}

impl Decoder for OctetCountingCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        loop {
            match self.state {
                DecodeState::Length => match self.decode_length(src)? {
                    Some(declared) => self.state = DecodeState::Payload(declared),
                    None => return Ok(None),
                },
                DecodeState::Payload(declared) => {
                    if src.len() < declared {
                        src.reserve(declared - src.len());
                        return Ok(None);
                    }
                    let payload = src.split_to(declared).freeze();
                    self.state = DecodeState::Length;
                    return Ok(Some(Frame {
                        declared_len: declared,
                        payload,
                    }));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        match self.state {
            DecodeState::Length if src.is_empty() => Ok(None),
            DecodeState::Length => {
                let rest = src.split();
                Err(FrameError::InvalidPrefix(format!(
                    "stream ended inside length prefix '{}'",
                    preview(&rest)
                )))
            }
            DecodeState::Payload(declared) => {
                // 已读取但不足 declared 的字节整体视为该帧
                let payload = src.split().freeze();
                self.state = DecodeState::Length;
                Err(FrameError::Underflow(Frame {
                    declared_len: declared,
                    payload,
                }))
            }
        }
    }
}

fn preview(data: &[u8]) -> String {
    String::from_utf8_lossy(&data[..data.len().min(PREVIEW_BYTES)]).into_owned()
}
