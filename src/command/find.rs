// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `find` / `findOne` and collection maintenance.

use bson::{Document, doc};

use crate::{
    cfg::enums::ReadPreference,
    command::{
        client::Collection,
        cursor::{Cursor, parse_cursor_reply},
        envelope::{attach_envelope, check_command_reply, resolve_read_preference},
    },
    error::Result,
};

/// `NamespaceNotFound` — dropping a collection that never existed is not an
/// error worth surfacing.
const NAMESPACE_NOT_FOUND: i32 = 26;

/// Thin pass-through knobs for `find`. Everything here maps 1:1 onto a
/// command field; query building stays with the caller.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub limit: Option<i64>,
    pub batch_size: Option<i64>,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub single_batch: bool,
}

impl Collection<'_> {
    /// Issue a `find` and hand back a cursor over its batches.
    pub async fn find(&self, filter: Document, options: FindOptions) -> Result<Cursor> {
        let mut cmd = doc! { "find": &self.name, "filter": filter };
        if let Some(limit) = options.limit {
            cmd.insert("limit", limit);
        }
        if let Some(batch_size) = options.batch_size {
            cmd.insert("batchSize", batch_size);
        }
        if let Some(sort) = options.sort {
            cmd.insert("sort", sort);
        }
        if let Some(projection) = options.projection {
            cmd.insert("projection", projection);
        }
        if options.single_batch {
            cmd.insert("singleBatch", true);
        }
        attach_envelope(&mut cmd, &self.db_name, self.effective_read_preference());

        let conn = self.client.connection().await?;
        let reply = conn.run_command(cmd).await?;
        check_command_reply(&reply.body, None)?;
        let first = parse_cursor_reply(&reply.body, "firstBatch")?;
        Ok(Cursor::new(conn, first))
    }

    /// `find` with `limit: 1, singleBatch: true`, so the server closes the
    /// cursor immediately.
    pub async fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            single_batch: true,
            ..FindOptions::default()
        };
        let mut cursor = self.find(filter, options).await?;
        cursor.try_next().await
    }

    /// Drop the collection. `NamespaceNotFound` counts as success — the
    /// ignorable-code path of reply interpretation.
    pub async fn drop_collection(&self) -> Result<()> {
        let mut cmd = doc! { "drop": &self.name };
        attach_envelope(&mut cmd, &self.db_name, self.effective_read_preference());
        let conn = self.client.connection().await?;
        let reply = conn.run_command(cmd).await?;
        check_command_reply(&reply.body, Some(NAMESPACE_NOT_FOUND))?;
        Ok(())
    }

    pub(crate) fn effective_read_preference(&self) -> ReadPreference {
        resolve_read_preference(
            self.read_preference,
            self.db_read_preference,
            self.client.config().read_preference,
        )
    }
}
