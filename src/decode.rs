//! Wire messages read from the broker and the pure decode/filter pipeline.
//!
//! A broker read yields one protobuf-encoded [`MessageBatch`]. Each [`Event`]
//! in the batch carries a type string and an opaque payload. Status events are
//! decoded in two stages: the payload is an [`Envelope`] whose body is a
//! [`StatusPayload`]. The decoded [`StatusRecord`] is then checked against the
//! author verification predicate.
//!
//! Every function here is pure; the handler loop owns logging and side effects.

use crate::constants::{
    STATUS_TYPE_SUFFIX, VERIFICATION_FLAG_MASK, VERIFICATION_FLAG_RANGE, VERIFICATION_FLAG_SHIFT,
    VERIFIED_AUTHOR_LEVEL,
};
use crate::errors::DecodeError;
use prost::Message;

/// One unit of broker output: an ordered list of events.
#[derive(Clone, PartialEq, Message)]
pub struct MessageBatch {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<Event>,
}

/// A typed event with an opaque payload.
#[derive(Clone, PartialEq, Message)]
pub struct Event {
    #[prost(string, tag = "1")]
    pub kind: String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

/// First decode stage of a status event payload.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(bytes = "vec", tag = "1")]
    pub body: Vec<u8>,
}

/// Second decode stage: the status carried inside an envelope body.
#[derive(Clone, PartialEq, Message)]
pub struct StatusPayload {
    #[prost(uint64, tag = "1")]
    pub mid: u64,
    #[prost(message, optional, tag = "2")]
    pub author: Option<AuthorPayload>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AuthorPayload {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(int32, tag = "2")]
    pub level: i32,
    #[prost(uint64, tag = "3")]
    pub sign: u64,
}

/// The fields of a status the pipeline acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRecord {
    pub author_id: u64,
    pub message_id: u64,
    pub author_level: i32,
    pub author_sign: u64,
}

/// What the handler should do with a single event.
#[derive(Debug)]
pub enum Disposition {
    /// Type does not end in `status`; nothing was decoded.
    UnsupportedType,
    /// Envelope or status decoding failed.
    Malformed(DecodeError),
    /// Decoded, but the author does not pass verification.
    Unverified(StatusRecord),
    /// Decoded and verified; long text should be fetched and posted.
    Qualified(StatusRecord),
}

pub fn decode_batch(bytes: &[u8]) -> Result<MessageBatch, DecodeError> {
    MessageBatch::decode(bytes).map_err(|source| DecodeError::Batch { source })
}

pub fn decode_envelope(payload: &[u8]) -> Result<Envelope, DecodeError> {
    Envelope::decode(payload).map_err(|source| DecodeError::Envelope { source })
}

pub fn decode_status(envelope: &Envelope) -> Result<StatusRecord, DecodeError> {
    let status = StatusPayload::decode(envelope.body.as_slice())
        .map_err(|source| DecodeError::Status { source })?;
    let author = status.author.ok_or(DecodeError::MissingAuthor {
        message_id: status.mid,
    })?;

    Ok(StatusRecord {
        author_id: author.id,
        message_id: status.mid,
        author_level: author.level,
        author_sign: author.sign,
    })
}

pub fn is_status_event(event: &Event) -> bool {
    event.kind.ends_with(STATUS_TYPE_SUFFIX)
}

/// Extracts the four-bit verification flag: bits 6..=9 of the sign field.
pub fn verification_flag(sign: u64) -> u64 {
    (sign >> VERIFICATION_FLAG_SHIFT) & VERIFICATION_FLAG_MASK
}

pub fn is_verified_author(record: &StatusRecord) -> bool {
    record.author_level == VERIFIED_AUTHOR_LEVEL
        && VERIFICATION_FLAG_RANGE.contains(&verification_flag(record.author_sign))
}

/// Runs the full per-event pipeline: type filter, both decode stages, and
/// the verification predicate.
pub fn evaluate_event(event: &Event) -> Disposition {
    if !is_status_event(event) {
        return Disposition::UnsupportedType;
    }

    let record = match decode_envelope(&event.payload).and_then(|env| decode_status(&env)) {
        Ok(record) => record,
        Err(e) => return Disposition::Malformed(e),
    };

    if is_verified_author(&record) {
        Disposition::Qualified(record)
    } else {
        Disposition::Unverified(record)
    }
}
