//! Streaming framer: byte stream in, [`Frame`]s out.
//!
//! The decoder is a three-state machine (header, length, body). Headers and
//! length fields are scanned byte-for-byte up to the terminating `#`; the
//! body is taken verbatim once its full length is buffered. An unknown
//! header is dropped and scanning resumes at the next `#`-terminated run —
//! the connection survives. A header scan that reaches [`MAX_BUFFER_SIZE`]
//! without a delimiter, a non-decimal length field, or an oversized body is
//! fatal.

use crate::frame::{FIELD_SEP, Frame, MAX_BUFFER_SIZE, TRANSFER_TIMEOUT};
use crate::tag::Tag;
use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("header of {0} bytes with no terminating '#'")]
    HeaderOverflow(usize),
    #[error("invalid body length field {0:?}")]
    BadLength(String),
    #[error("body length {0} exceeds the {MAX_BUFFER_SIZE}-byte limit")]
    BodyTooLarge(usize),
    #[error("transfer stalled mid-frame for {}s", TRANSFER_TIMEOUT.as_secs())]
    Stalled,
    #[error("peer closed mid-frame")]
    Eof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    Header,
    Length(Tag),
    Body(Tag, usize),
}

/// Decoder/encoder for the `HEADER#LEN#BODY` wire format.
#[derive(Debug)]
pub struct RadarCodec {
    state: DecodeState,
}

impl RadarCodec {
    pub fn new() -> Self {
        Self { state: DecodeState::Header }
    }

    /// True while a frame is partially received. Drives the transfer
    /// timeout: an idle connection may wait forever, a frame in flight
    /// must keep making progress.
    pub fn mid_frame(&self) -> bool {
        !matches!(self.state, DecodeState::Header)
    }
}

impl Default for RadarCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan for the next `#`. `Ok(None)` means "need more bytes".
fn take_delimited(src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
    match src.iter().position(|&b| b == FIELD_SEP) {
        Some(pos) => {
            let mut run = src.split_to(pos + 1);
            run.truncate(pos); // drop the separator
            Ok(Some(run))
        }
        None if src.len() >= MAX_BUFFER_SIZE => Err(FrameError::HeaderOverflow(src.len())),
        None => Ok(None),
    }
}

impl Decoder for RadarCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        loop {
            match self.state {
                DecodeState::Header => {
                    let Some(header) = take_delimited(src)? else {
                        return Ok(None);
                    };
                    match Tag::from_bytes(&header) {
                        Some(tag) => self.state = DecodeState::Length(tag),
                        None => {
                            // Recoverable: drop the run and keep scanning.
                            warn!(
                                header = %String::from_utf8_lossy(&header),
                                "dropping unknown header"
                            );
                        }
                    }
                }
                DecodeState::Length(tag) => {
                    let Some(digits) = take_delimited(src)? else {
                        return Ok(None);
                    };
                    let text = std::str::from_utf8(&digits)
                        .map_err(|_| FrameError::BadLength(String::from_utf8_lossy(&digits).into_owned()))?;
                    let len: usize =
                        text.parse().map_err(|_| FrameError::BadLength(text.to_owned()))?;
                    if len > MAX_BUFFER_SIZE {
                        return Err(FrameError::BodyTooLarge(len));
                    }
                    self.state = DecodeState::Body(tag, len);
                }
                DecodeState::Body(tag, len) => {
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    let body = src.copy_to_bytes(len);
                    self.state = DecodeState::Header;
                    return Ok(Some(Frame { tag, body }));
                }
            }
        }
    }
}

impl Encoder<Frame> for RadarCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        frame.encode_into(dst);
        Ok(())
    }
}

/// Buffered frame pump over the read half of a connection.
///
/// Applies the transfer-timeout rule: from the first header byte until the
/// last body byte of a frame, some progress must be observed within
/// [`TRANSFER_TIMEOUT`], or the read fails with [`FrameError::Stalled`].
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    codec: RadarCodec,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4 * 1024),
            codec: RadarCodec::new(),
        }
    }

    /// Next complete frame, `Ok(None)` on clean EOF between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(frame));
            }

            let idle = self.buf.is_empty() && !self.codec.mid_frame();
            let read = if idle {
                self.inner.read_buf(&mut self.buf).await?
            } else {
                tokio::time::timeout(TRANSFER_TIMEOUT, self.inner.read_buf(&mut self.buf))
                    .await
                    .map_err(|_| FrameError::Stalled)??
            };

            if read == 0 {
                return if idle { Ok(None) } else { Err(FrameError::Eof) };
            }
        }
    }
}
