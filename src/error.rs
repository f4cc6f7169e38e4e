// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error kinds surfaced by the driver core.
//!
//! Every fallible operation resolves to one of four kinds: transport-level
//! failures (`Connection`), SCRAM handshake failures (`Authentication`),
//! server-reported command failures (`Write`), and wire-format violations
//! (`Protocol`). Validation failures inside parsing never panic; they are
//! mapped to one of these kinds and propagated to the caller of the
//! originating operation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Socket failure, connect timeout, reply timeout, or framing recovery.
    /// The operation is not retried; the connection is re-established lazily
    /// at the next request.
    #[error("connection error: {0}")]
    Connection(String),

    /// A non-`ok` step of the SCRAM conversation, a mismatched server
    /// signature, or a transport failure during the handshake. `code` is the
    /// server-supplied error code when available.
    #[error("authentication failed (code {code}): {message}")]
    Authentication { code: i32, message: String },

    /// The server reported a command failure: `ok: 0`, a `writeErrors[]`
    /// entry, or a `writeConcernError`.
    #[error("write error (code {code}): {message}")]
    Write { code: i32, message: String },

    /// A wire-format invariant was violated while encoding or decoding.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Numeric MongoDB error code carried by server-reported failures.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Authentication { code, .. } | Error::Write { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Connection(e.to_string())
    }
}

impl From<bson::ser::Error> for Error {
    fn from(e: bson::ser::Error) -> Self {
        Error::Protocol(format!("bson encode: {e}"))
    }
}

impl From<bson::de::Error> for Error {
    fn from(e: bson::de::Error) -> Self {
        Error::Protocol(format!("bson decode: {e}"))
    }
}
