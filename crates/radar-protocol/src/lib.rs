// radar-protocol: TeamRadar wire protocol framing.
//
// One frame on the wire is `HEADER#LEN#BODY`: an uppercase header tag, the
// decimal byte length of the body, and LEN raw body bytes, all separated by
// `#`. Bodies may carry `#` (level-1 subfield) and `;` (level-2 list)
// delimiters by convention; the framer never looks inside a body.

pub mod codec;
pub mod frame;
pub mod tag;

pub use codec::{FrameError, FrameReader, RadarCodec};
pub use frame::{
    FIELD_SEP, Frame, LIST_SEP, MAX_BUFFER_SIZE, TRANSFER_TIMEOUT, split_fields, split_list,
    split_pair,
};
pub use tag::Tag;
