//! A scripted TeamRadar client speaking the framed wire protocol.

use bytes::BytesMut;
use radar_protocol::{Frame, FrameReader, Tag};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Every await in a test is bounded; a silent server fails fast.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

type Error = Box<dyn std::error::Error + Send + Sync>;

pub struct MockClient {
    reader: FrameReader<OwnedReadHalf>,
    write: OwnedWriteHalf,
}

impl MockClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self { reader: FrameReader::new(read_half), write: write_half })
    }

    /// Connect and run the greeting handshake; the reply body is returned
    /// (`"OK, CONNECTED"` or `"WRONG_USER"`).
    pub async fn greet(addr: SocketAddr, user_name: &str) -> Result<(Self, String), Error> {
        let mut client = Self::connect(addr).await?;
        client.send(Frame::new(Tag::Greeting, user_name.as_bytes().to_vec())).await?;
        let reply = client.recv().await?;
        if reply.tag != Tag::Greeting {
            return Err(format!("expected GREETING reply, got {}", reply.tag).into());
        }
        let body = reply.body_text();
        Ok((client, body))
    }

    pub async fn send(&mut self, frame: Frame) -> Result<(), Error> {
        let mut buf = BytesMut::new();
        frame.encode_into(&mut buf);
        self.write.write_all(&buf).await?;
        Ok(())
    }

    /// Write arbitrary bytes, for malformed-input tests.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write.write_all(bytes).await?;
        Ok(())
    }

    /// Next frame, or an error after [`RECV_TIMEOUT`] or on close.
    pub async fn recv(&mut self) -> Result<Frame, Error> {
        match tokio::time::timeout(RECV_TIMEOUT, self.reader.read_frame()).await {
            Ok(Ok(Some(frame))) => Ok(frame),
            Ok(Ok(None)) => Err("connection closed by server".into()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err("timed out waiting for a frame".into()),
        }
    }

    /// `Some(frame)` if one arrives within `wait`, `None` otherwise.
    /// For asserting that a frame does *not* arrive.
    pub async fn recv_within(&mut self, wait: Duration) -> Option<Frame> {
        match tokio::time::timeout(wait, self.reader.read_frame()).await {
            Ok(Ok(frame)) => frame,
            _ => None,
        }
    }

    /// Wait for the server to close this connection.
    pub async fn expect_closed(&mut self) -> Result<(), Error> {
        match tokio::time::timeout(RECV_TIMEOUT, self.reader.read_frame()).await {
            Ok(Ok(None)) | Ok(Err(_)) => Ok(()),
            Ok(Ok(Some(frame))) => {
                Err(format!("expected close, got a {} frame", frame.tag).into())
            }
            Err(_) => Err("timed out waiting for the server to close".into()),
        }
    }
}
