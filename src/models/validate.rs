// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Side-effect-free validation of buffered wire bytes.
//!
//! The receive loop calls [`validate`] after every append and only hands a
//! buffer slice to the read pass once it returns [`ValidationOutcome::Ok`].
//! Validation peeks declared lengths and walks the section stream without
//! decoding BSON or allocating; the invariants checked are:
//!
//! 1. `messageLength` covers at least the header and exactly the consumed
//!    bytes,
//! 2. the opcode is `OP_MSG`,
//! 3. exactly one type-0 section is present,
//! 4. every document's self-declared length is ≥ 5 and fits its section,
//! 5. a present checksum matches CRC-32C over the preceding bytes,
//! 6. the section bytes add up to `messageLength` minus header and checksum.

use crate::models::{
    header::{HEADER_LEN, MessageHeader},
    message::OpMsgFlags,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The buffer starts with a complete well-formed message of this many
    /// bytes.
    Ok(usize),
    /// Header present and opcode valid, but fewer than `messageLength`
    /// bytes are buffered so far.
    Growing,
    /// Fewer than [`HEADER_LEN`] bytes buffered.
    NoHeader,
    /// Header present, opcode is not `OP_MSG`.
    OpcodeInvalid,
    /// Enough bytes buffered but the section stream violates an invariant.
    DataError,
    /// Sections parse, but the trailing CRC-32C does not match.
    ChecksumInvalid,
}

/// Validate the front of `buf` without consuming or allocating.
pub fn validate(buf: &[u8]) -> ValidationOutcome {
    let Some(header) = MessageHeader::read_from(buf) else {
        return ValidationOutcome::NoHeader;
    };
    if !header.is_op_msg() {
        return ValidationOutcome::OpcodeInvalid;
    }

    let declared = header.message_length.get();
    if declared < HEADER_LEN as i32 {
        return ValidationOutcome::DataError;
    }
    let message_len = declared as usize;
    if buf.len() < message_len {
        return ValidationOutcome::Growing;
    }
    if message_len < HEADER_LEN + 4 {
        return ValidationOutcome::DataError;
    }

    let flags = OpMsgFlags::from_bits_retain(u32::from_le_bytes([
        buf[HEADER_LEN],
        buf[HEADER_LEN + 1],
        buf[HEADER_LEN + 2],
        buf[HEADER_LEN + 3],
    ]));
    let checksum_len = if flags.contains(OpMsgFlags::CHECKSUM_PRESENT) {
        4
    } else {
        0
    };
    if message_len < HEADER_LEN + 4 + checksum_len {
        return ValidationOutcome::DataError;
    }
    let sections_end = message_len - checksum_len;

    let mut pos = HEADER_LEN + 4;
    let mut body_sections = 0usize;
    while pos < sections_end {
        let kind = buf[pos];
        pos += 1;
        match kind {
            0 => match document_len_at(buf, pos, sections_end) {
                Some(len) => {
                    pos += len;
                    body_sections += 1;
                },
                None => return ValidationOutcome::DataError,
            },
            1 => match sequence_len_at(buf, pos, sections_end) {
                Some(len) => pos += len,
                None => return ValidationOutcome::DataError,
            },
            _ => return ValidationOutcome::DataError,
        }
    }
    if pos != sections_end || body_sections != 1 {
        return ValidationOutcome::DataError;
    }

    if checksum_len == 4 {
        let stored = u32::from_le_bytes([
            buf[message_len - 4],
            buf[message_len - 3],
            buf[message_len - 2],
            buf[message_len - 1],
        ]);
        if crc32c::crc32c(&buf[..message_len - 4]) != stored {
            return ValidationOutcome::ChecksumInvalid;
        }
    }

    ValidationOutcome::Ok(message_len)
}

/// Peek the self-declared length of the BSON document at `pos`, refusing
/// lengths below the 5-byte minimum or past `end`.
fn document_len_at(buf: &[u8], pos: usize, end: usize) -> Option<usize> {
    if pos + 4 > end {
        return None;
    }
    let declared =
        i32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
    if declared < 5 {
        return None;
    }
    let len = declared as usize;
    if pos + len > end { None } else { Some(len) }
}

/// Walk one type-1 section starting right after its kind byte. Returns the
/// section length (size field included) when the identifier and every
/// contained document check out.
fn sequence_len_at(buf: &[u8], pos: usize, end: usize) -> Option<usize> {
    if pos + 4 > end {
        return None;
    }
    let declared =
        i32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
    // The size counts from itself; 4 bytes size plus at least the NUL of an
    // empty identifier.
    if declared < 5 {
        return None;
    }
    let len = declared as usize;
    if pos + len > end {
        return None;
    }
    let seq_end = pos + len;

    let ident_start = pos + 4;
    let mut cursor = ident_start;
    while cursor < seq_end && buf[cursor] != 0 {
        cursor += 1;
    }
    if cursor >= seq_end {
        return None; // identifier not NUL-terminated inside the section
    }
    cursor += 1;

    // Zero documents is legal; otherwise each must fit exactly.
    while cursor < seq_end {
        cursor += document_len_at(buf, cursor, seq_end)?;
    }
    Some(len)
}
