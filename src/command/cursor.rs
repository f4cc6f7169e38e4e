// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server-side cursor lifecycle.
//!
//! A [`Cursor`] exclusively owns its server-side cursor id. It ends in one
//! of three ways: the server reports id 0 (exhausted), the consumer calls
//! [`Cursor::kill`], or the handle is dropped — in which case a
//! `killCursors` is emitted fire-and-forget with all transport errors
//! swallowed. Exactly one `killCursors` is ever sent per id.

use std::{collections::VecDeque, sync::Arc};

use bson::{Bson, Document, doc};
use tracing::{debug, warn};

use crate::{
    client::connection::ClientConnection,
    command::envelope::check_command_reply,
    error::{Error, Result},
    models::{
        message::MessageBuilder,
        namespace::Namespace,
        reply::doc_get_i64,
    },
};

/// The `{ cursor: { id, ns, firstBatch|nextBatch } }` shape pulled out of a
/// cursor-bearing reply.
pub(crate) struct CursorBatch {
    pub id: i64,
    pub namespace: Namespace,
    pub documents: Vec<Document>,
}

pub(crate) fn parse_cursor_reply(body: &Document, batch_key: &str) -> Result<CursorBatch> {
    let cursor = body
        .get_document("cursor")
        .map_err(|_| Error::Protocol("reply carries no cursor document".into()))?;
    let id = doc_get_i64(cursor, "id")
        .ok_or_else(|| Error::Protocol("cursor document has no id".into()))?;
    let namespace: Namespace = cursor
        .get_str("ns")
        .map_err(|_| Error::Protocol("cursor document has no ns".into()))?
        .parse()?;
    let documents = cursor
        .get_array(batch_key)
        .map_err(|_| Error::Protocol(format!("cursor document has no {batch_key}")))?
        .iter()
        .map(|b| match b {
            Bson::Document(d) => Ok(d.clone()),
            other => Err(Error::Protocol(format!(
                "cursor batch holds a non-document: {other:?}"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CursorBatch {
        id,
        namespace,
        documents,
    })
}

pub struct Cursor {
    conn: Arc<ClientConnection>,
    namespace: Namespace,
    cursor_id: i64,
    batch: VecDeque<Document>,
    /// Length of the batch most recently received; sent as the `batchSize`
    /// hint on the next `getMore`.
    batch_hint: usize,
}

impl Cursor {
    pub(crate) fn new(conn: Arc<ClientConnection>, first: CursorBatch) -> Self {
        let batch_hint = first.documents.len();
        Self {
            conn,
            namespace: first.namespace,
            cursor_id: first.id,
            batch: first.documents.into(),
            batch_hint,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    /// Terminal when the server reported id 0 and the local batch is done.
    pub fn is_exhausted(&self) -> bool {
        self.cursor_id == 0 && self.batch.is_empty()
    }

    /// Yield the next document, fetching the next server batch when the
    /// current one runs out.
    pub async fn try_next(&mut self) -> Result<Option<Document>> {
        loop {
            if let Some(doc) = self.batch.pop_front() {
                return Ok(Some(doc));
            }
            if self.cursor_id == 0 {
                return Ok(None);
            }
            self.get_more().await?;
        }
    }

    /// Drain the remainder into a vector.
    pub async fn collect_remaining(&mut self) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        while let Some(doc) = self.try_next().await? {
            out.push(doc);
        }
        Ok(out)
    }

    async fn get_more(&mut self) -> Result<()> {
        let mut cmd = doc! {
            "getMore": self.cursor_id,
            "collection": &self.namespace.collection,
        };
        if self.batch_hint > 0 {
            cmd.insert("batchSize", self.batch_hint as i64);
        }
        cmd.insert("$db", &self.namespace.database);

        let reply = self.conn.run_command(cmd).await?;
        check_command_reply(&reply.body, None)?;
        let next = parse_cursor_reply(&reply.body, "nextBatch")?;

        debug!(
            cursor_id = self.cursor_id,
            received = next.documents.len(),
            "getMore batch"
        );
        self.cursor_id = next.id;
        self.batch_hint = next.documents.len();
        self.batch = next.documents.into();
        Ok(())
    }

    /// Explicitly release the server-side cursor. The `killCursors` is sent
    /// with `moreToCome`: no reply is expected or waited for.
    pub async fn kill(&mut self) -> Result<()> {
        if self.cursor_id == 0 {
            return Ok(());
        }
        let cmd = kill_cursors_command(&self.namespace, self.cursor_id);
        self.cursor_id = 0;
        self.batch.clear();
        self.conn.run_command_no_reply(cmd).await
    }
}

fn kill_cursors_command(namespace: &Namespace, cursor_id: i64) -> Document {
    doc! {
        "killCursors": &namespace.collection,
        "cursors": [cursor_id],
        "$db": &namespace.database,
    }
}

impl Drop for Cursor {
    /// Abandoning a live cursor must still release it server-side. Errors
    /// here are swallowed; there is nobody left to report them to.
    fn drop(&mut self) {
        if self.cursor_id == 0 {
            return;
        }
        let cursor_id = self.cursor_id;
        self.cursor_id = 0;

        let message = MessageBuilder::new(self.conn.next_request_id())
            .body(kill_cursors_command(&self.namespace, cursor_id))
            .more_to_come()
            .build();
        let Ok(bytes) = message else {
            return;
        };

        let conn = Arc::clone(&self.conn);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = conn.send_fire_and_forget(&bytes).await {
                    warn!("killCursors for abandoned cursor {cursor_id} failed: {e}");
                }
            });
        }
    }
}
