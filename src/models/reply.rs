// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Read pass over a validated wire message.
//!
//! [`read_message`] must only run on a slice that [`crate::models::validate`]
//! accepted; it decodes the BSON payloads the validation pass deliberately
//! skipped. A reply is one concrete record: the type-0 body plus any type-1
//! sequences. Different reply shapes (command result, cursor batch) are told
//! apart by which fields the body carries, never by subtype.

use std::io::Cursor;

use bson::{Bson, Document};

use crate::{
    error::{Error, Result},
    models::{
        header::{HEADER_LEN, MessageHeader},
        message::{DocumentSequence, OpMsgFlags},
    },
};

/// One complete decoded `OP_MSG`.
#[derive(Debug, Clone)]
pub struct OpMsgReply {
    pub header: MessageHeader,
    pub flags: OpMsgFlags,
    pub body: Document,
    pub sequences: Vec<DocumentSequence>,
}

impl OpMsgReply {
    pub fn response_to(&self) -> i32 {
        self.header.response_to.get()
    }

    /// `ok: 1` in the body, whatever numeric type the server chose.
    pub fn command_ok(&self) -> bool {
        self.body.get("ok").is_some_and(bson_is_truthy_one)
    }

    pub fn error_code(&self) -> Option<i32> {
        doc_get_i64(&self.body, "code").map(|c| c as i32)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.body.get_str("errmsg").ok()
    }
}

/// Decode exactly one validated message from the front of `buf`.
pub fn read_message(buf: &[u8]) -> Result<OpMsgReply> {
    let header = MessageHeader::read_from(buf)
        .ok_or_else(|| Error::Protocol("message shorter than its header".into()))?;
    header
        .ensure_op_msg()
        .map_err(|e| Error::Protocol(e.to_string()))?;

    let message_len = header.message_length.get() as usize;
    if buf.len() < message_len || message_len < HEADER_LEN + 4 {
        return Err(Error::Protocol("truncated message handed to read pass".into()));
    }

    let flags = OpMsgFlags::from_bits_retain(u32::from_le_bytes([
        buf[HEADER_LEN],
        buf[HEADER_LEN + 1],
        buf[HEADER_LEN + 2],
        buf[HEADER_LEN + 3],
    ]));
    let sections_end = if flags.contains(OpMsgFlags::CHECKSUM_PRESENT) {
        message_len - 4
    } else {
        message_len
    };

    let mut body = None;
    let mut sequences = Vec::new();
    let mut pos = HEADER_LEN + 4;
    while pos < sections_end {
        let kind = buf[pos];
        pos += 1;
        match kind {
            0 => {
                let doc = read_document(buf, &mut pos, sections_end)?;
                if body.replace(doc).is_some() {
                    return Err(Error::Protocol("more than one type-0 section".into()));
                }
            },
            1 => {
                let seq = read_sequence(buf, &mut pos, sections_end)?;
                sequences.push(seq);
            },
            other => {
                return Err(Error::Protocol(format!("unknown payload type {other}")));
            },
        }
    }

    let body =
        body.ok_or_else(|| Error::Protocol("message carries no type-0 section".into()))?;
    Ok(OpMsgReply {
        header,
        flags,
        body,
        sequences,
    })
}

fn read_document(buf: &[u8], pos: &mut usize, end: usize) -> Result<Document> {
    if *pos + 4 > end {
        return Err(Error::Protocol("document runs past its section".into()));
    }
    let declared = i32::from_le_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    if declared < 5 || *pos + declared as usize > end {
        return Err(Error::Protocol(format!("bad document length {declared}")));
    }
    let len = declared as usize;
    let doc = Document::from_reader(&mut Cursor::new(&buf[*pos..*pos + len]))?;
    *pos += len;
    Ok(doc)
}

fn read_sequence(buf: &[u8], pos: &mut usize, end: usize) -> Result<DocumentSequence> {
    if *pos + 4 > end {
        return Err(Error::Protocol("sequence size runs past the message".into()));
    }
    let declared = i32::from_le_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    if declared < 5 || *pos + declared as usize > end {
        return Err(Error::Protocol(format!("bad sequence size {declared}")));
    }
    let seq_end = *pos + declared as usize;
    *pos += 4;

    let ident_start = *pos;
    while *pos < seq_end && buf[*pos] != 0 {
        *pos += 1;
    }
    if *pos >= seq_end {
        return Err(Error::Protocol("sequence identifier not terminated".into()));
    }
    let identifier = std::str::from_utf8(&buf[ident_start..*pos])
        .map_err(|_| Error::Protocol("sequence identifier is not UTF-8".into()))?
        .to_string();
    *pos += 1;

    let mut documents = Vec::new();
    while *pos < seq_end {
        documents.push(read_document(buf, pos, seq_end)?);
    }
    Ok(DocumentSequence {
        identifier,
        documents,
    })
}

/// `true` for the `1` the server spells as double, int32, int64 or bool.
pub fn bson_is_truthy_one(value: &Bson) -> bool {
    match value {
        Bson::Double(d) => *d == 1.0,
        Bson::Int32(i) => *i == 1,
        Bson::Int64(i) => *i == 1,
        Bson::Boolean(b) => *b,
        _ => false,
    }
}

/// Fetch an integer field regardless of the numeric BSON type the server
/// picked for it.
pub fn doc_get_i64(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key)? {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        Bson::Double(d) => Some(*d as i64),
        _ => None,
    }
}
