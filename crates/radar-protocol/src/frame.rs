//! Frame composition and body-convention helpers.

use crate::tag::Tag;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

/// Level-1 delimiter: separates header, length and body on the wire, and
/// subfields inside a body.
pub const FIELD_SEP: u8 = b'#';

/// Level-2 delimiter: separates items inside a list subfield.
pub const LIST_SEP: u8 = b';';

/// Upper bound on the header/length scan buffer and on a single body.
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// A frame in flight must show byte progress at least this often.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// One parsed unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: Tag,
    pub body: Bytes,
}

impl Frame {
    pub fn new(tag: Tag, body: impl Into<Bytes>) -> Self {
        Self { tag, body: body.into() }
    }

    /// A frame with an empty body (`TAG#0#`).
    pub fn empty(tag: Tag) -> Self {
        Self { tag, body: Bytes::new() }
    }

    /// Compose a frame from level-1 subfields, joined with `#`.
    pub fn joined<B: AsRef<[u8]>>(tag: Tag, bodies: &[B]) -> Self {
        let total: usize = bodies.iter().map(|b| b.as_ref().len()).sum();
        let mut body = BytesMut::with_capacity(total + bodies.len().saturating_sub(1));
        for (i, part) in bodies.iter().enumerate() {
            if i > 0 {
                body.put_u8(FIELD_SEP);
            }
            body.put_slice(part.as_ref());
        }
        Self { tag, body: body.freeze() }
    }

    /// Serialize as `HEADER#LEN#BODY`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        let header = self.tag.as_str().as_bytes();
        let len = self.body.len().to_string();
        dst.reserve(header.len() + len.len() + self.body.len() + 2);
        dst.put_slice(header);
        dst.put_u8(FIELD_SEP);
        dst.put_slice(len.as_bytes());
        dst.put_u8(FIELD_SEP);
        dst.put_slice(&self.body);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Split a body into level-1 subfields at every `#`.
///
/// Mirrors `str::split`: an empty body yields one empty subfield. Not for
/// binary-bearing bodies; use [`split_pair`] there.
pub fn split_fields(body: &[u8]) -> Vec<&[u8]> {
    body.split(|&b| b == FIELD_SEP).collect()
}

/// Split a body at the *first* `#` only, leaving the remainder untouched.
///
/// The right half may legally contain further `#` bytes (a photo payload,
/// a chat message). A body with no `#` splits into `(body, b"")`.
pub fn split_pair(body: &[u8]) -> (&[u8], &[u8]) {
    match body.iter().position(|&b| b == FIELD_SEP) {
        Some(pos) => (&body[..pos], &body[pos + 1..]),
        None => (body, &[]),
    }
}

/// Split a level-1 subfield into list items at every `;`, dropping empties.
pub fn split_list(field: &[u8]) -> Vec<&[u8]> {
    field
        .split(|&b| b == LIST_SEP)
        .filter(|item| !item.is_empty())
        .collect()
}
