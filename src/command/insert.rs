// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Insert batching.
//!
//! The command body carries `insert`/`ordered`/`$db`; the documents ride in
//! a single type-1 sequence named `"documents"`. Batches are cut when the
//! handshake's `maxWriteBatchSize` document count is reached or the next
//! document would push the message past `maxMessageSizeBytes`.

use bson::{Document, doc};

use crate::{
    command::{
        client::Collection,
        envelope::{attach_envelope, check_command_reply},
    },
    error::Result,
    models::message::DocumentSequence,
};

/// Headroom reserved for the command body, section framing, and header when
/// budgeting a batch against `maxMessageSizeBytes`.
const BATCH_OVERHEAD_BYTES: usize = 1024;

/// Cut `sizes` into consecutive batch lengths. A document larger than the
/// byte budget still travels, alone in its own batch; the server is the one
/// to reject it.
pub(crate) fn split_batches(
    sizes: &[usize],
    max_docs: usize,
    max_message_bytes: usize,
) -> Vec<usize> {
    let budget = max_message_bytes.saturating_sub(BATCH_OVERHEAD_BYTES);
    let max_docs = max_docs.max(1);

    let mut batches = Vec::new();
    let mut count = 0usize;
    let mut bytes = 0usize;
    for &size in sizes {
        if count > 0 && (count == max_docs || bytes + size > budget) {
            batches.push(count);
            count = 0;
            bytes = 0;
        }
        count += 1;
        bytes += size;
    }
    if count > 0 {
        batches.push(count);
    }
    batches
}

impl Collection<'_> {
    pub async fn insert_one(&self, doc: Document) -> Result<i64> {
        self.insert_many(vec![doc], true).await
    }

    /// Insert `docs`, splitting into wire batches as the handshake limits
    /// demand. Returns the summed server-reported `n`. With `ordered`, a
    /// write error stops the remaining batches and surfaces immediately;
    /// unordered inserts run every batch and surface the first error at the
    /// end.
    pub async fn insert_many(&self, docs: Vec<Document>, ordered: bool) -> Result<i64> {
        if docs.is_empty() {
            return Ok(0);
        }

        let conn = self.client.connection().await?;
        let info = conn.server_info();

        let mut sizes = Vec::with_capacity(docs.len());
        for doc in &docs {
            sizes.push(bson::to_vec(doc)?.len());
        }
        let batches = split_batches(
            &sizes,
            info.max_write_batch_size.max(1) as usize,
            info.max_message_size_bytes.max(0) as usize,
        );

        let preference = self.effective_read_preference();

        let mut inserted = 0i64;
        let mut first_error = None;
        let mut docs = docs;
        for batch_len in batches {
            let rest = docs.split_off(batch_len);
            let batch = std::mem::replace(&mut docs, rest);

            let mut body = doc! { "insert": &self.name, "ordered": ordered };
            attach_envelope(&mut body, &self.db_name, preference);

            let reply = conn
                .run_command_with_sequence(
                    body,
                    DocumentSequence::new("documents", batch),
                )
                .await?;
            match check_command_reply(&reply.body, None) {
                Ok(n) => inserted += n,
                Err(e) if ordered => return Err(e),
                Err(e) => {
                    first_error.get_or_insert(e);
                },
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(inserted),
        }
    }
}
