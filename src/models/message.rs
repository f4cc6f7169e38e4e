// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `OP_MSG` flag word and the outgoing-message encoder.

use bitflags::bitflags;
use bson::Document;
use bytes::{Bytes, BytesMut};

use crate::{
    error::{Error, Result},
    models::header::{HEADER_LEN, MessageHeader},
};

bitflags! {
    /// The 32-bit flag word that follows the message header.
    ///
    /// Bits 0–15 are required (a receiver must understand them), bits 16–31
    /// are optional. Everything not listed here is reserved zero.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct OpMsgFlags: u32 {
        /// The message ends with a CRC-32C checksum of everything before it.
        const CHECKSUM_PRESENT = 1;
        /// The sender does not expect (and must not receive) a reply.
        const MORE_TO_COME = 1 << 1;
        /// The receiver may reply with a `MORE_TO_COME` stream of its own.
        const EXHAUST_ALLOWED = 1 << 16;
    }
}

/// Payload type 1: an identified sequence of documents. The same shape is
/// used on the encode side (e.g. the `"documents"` sequence of an insert)
/// and on the decode side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSequence {
    pub identifier: String,
    pub documents: Vec<Document>,
}

impl DocumentSequence {
    pub fn new(identifier: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            identifier: identifier.into(),
            documents,
        }
    }
}

/// Builder for one outgoing `OP_MSG`.
///
/// Exactly one type-0 body document is mandatory; any number of type-1
/// sequences may follow. Section sizes and `messageLength` are back-patched
/// during [`MessageBuilder::build`].
#[derive(Debug)]
pub struct MessageBuilder {
    request_id: i32,
    flags: OpMsgFlags,
    body: Option<Document>,
    sequences: Vec<DocumentSequence>,
}

impl MessageBuilder {
    pub fn new(request_id: i32) -> Self {
        Self {
            request_id,
            flags: OpMsgFlags::empty(),
            body: None,
            sequences: Vec::new(),
        }
    }

    /// Set the single type-0 body document.
    pub fn body(mut self, body: Document) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a type-1 section.
    pub fn sequence(mut self, identifier: impl Into<String>, documents: Vec<Document>) -> Self {
        self.sequences.push(DocumentSequence::new(identifier, documents));
        self
    }

    /// Mark the message fire-and-forget: the server will not reply.
    pub fn more_to_come(mut self) -> Self {
        self.flags |= OpMsgFlags::MORE_TO_COME;
        self
    }

    /// Serialize the message. Fails if no body document was supplied.
    pub fn build(&self) -> Result<Bytes> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| Error::Protocol("OP_MSG requires a type-0 body document".into()))?;

        let mut out = BytesMut::with_capacity(256);
        out.extend_from_slice(&[0u8; HEADER_LEN]);
        out.extend_from_slice(&self.flags.bits().to_le_bytes());

        out.extend_from_slice(&[0u8]); // payload type 0
        out.extend_from_slice(&bson::to_vec(body)?);

        for seq in &self.sequences {
            out.extend_from_slice(&[1u8]); // payload type 1
            let size_at = out.len();
            out.extend_from_slice(&[0u8; 4]); // section size, patched below
            out.extend_from_slice(seq.identifier.as_bytes());
            out.extend_from_slice(&[0u8]);
            for doc in &seq.documents {
                out.extend_from_slice(&bson::to_vec(doc)?);
            }
            let size = (out.len() - size_at) as i32;
            out[size_at..size_at + 4].copy_from_slice(&size.to_le_bytes());
        }

        let header = MessageHeader::for_request(out.len() as i32, self.request_id);
        header.write_to(&mut out[..HEADER_LEN]);
        Ok(out.freeze())
    }
}
