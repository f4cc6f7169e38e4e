// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Helpers for the MongoDB wire-protocol **message header**.
//!
//! Every wire message starts with a fixed 16-byte header of four
//! little-endian 32-bit integers:
//!
//! ```text
//! +----------------+----------------+----------------+----------------+
//! | messageLength  |   requestId    |   responseTo   |     opCode     |
//! +----------------+----------------+----------------+----------------+
//! ```
//!
//! * **messageLength** – total size of the message, header included.
//! * **requestId** – sender-assigned identifier, echoed back by the peer.
//! * **responseTo** – the `requestId` this message answers (0 on requests).
//! * **opCode** – message body format. This core emits and accepts only
//!   `OP_MSG` (2013); the legacy opcodes are recognized solely to produce a
//!   precise error.

use thiserror::Error;
use zerocopy::{
    FromBytes as ZFromBytes, I32, Immutable, IntoBytes, KnownLayout, LittleEndian,
};

pub const HEADER_LEN: usize = 16;

/// The only opcode this core speaks.
pub const OP_MSG: i32 = 2013;

/// Legacy opcodes removed from the protocol since MongoDB 5.1. Listed so
/// that a peer still speaking them gets a recognizable rejection.
pub const LEGACY_OP_CODES: [i32; 4] = [1, 2004, 2005, 2007];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported opcode {0}, only OP_MSG (2013) is accepted")]
pub struct UnsupportedOpcode(pub i32);

/// Fixed header shared by every wire message.
#[repr(C)]
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, ZFromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct MessageHeader {
    pub message_length: I32<LittleEndian>, // 0..4
    pub request_id: I32<LittleEndian>,     // 4..8
    pub response_to: I32<LittleEndian>,    // 8..12
    pub op_code: I32<LittleEndian>,        // 12..16
}

impl MessageHeader {
    /// Header for an outgoing `OP_MSG` request.
    pub fn for_request(message_length: i32, request_id: i32) -> Self {
        Self {
            message_length: message_length.into(),
            request_id: request_id.into(),
            response_to: 0.into(),
            op_code: OP_MSG.into(),
        }
    }

    /// Copy the header out of the first [`HEADER_LEN`] bytes of `buf`, if
    /// that many are present.
    pub fn read_from(buf: &[u8]) -> Option<Self> {
        <Self as ZFromBytes>::read_from_prefix(buf)
            .ok()
            .map(|(hdr, _)| hdr)
    }

    pub fn is_op_msg(&self) -> bool {
        self.op_code.get() == OP_MSG
    }

    pub fn ensure_op_msg(&self) -> Result<(), UnsupportedOpcode> {
        if self.is_op_msg() {
            Ok(())
        } else {
            Err(UnsupportedOpcode(self.op_code.get()))
        }
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        buf[..HEADER_LEN].copy_from_slice(self.as_bytes());
    }
}
