// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// The 16-byte wire message header.
pub mod header;
/// `OP_MSG` flag word and outgoing-message encoder.
pub mod message;
/// `"<database>.<collection>"` addressing.
pub mod namespace;
/// Read pass: decoded replies and their document sections.
pub mod reply;
/// Side-effect-free validation of buffered wire bytes.
pub mod validate;
