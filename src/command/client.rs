// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Client-facing handles.
//!
//! [`MongoClient`] owns the connection slot and reconnects lazily: a dead
//! connection is noticed and replaced at the *next* request, never retried
//! mid-request. [`Database`] and [`Collection`] are cheap name-scoped views
//! that can pin their own read preference.

use std::sync::Arc;

use bson::Document;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    cfg::{config::Config, enums::ReadPreference},
    client::connection::ClientConnection,
    command::envelope::attach_envelope,
    error::Result,
};

pub struct MongoClient {
    cfg: Config,
    conn: Mutex<Option<Arc<ClientConnection>>>,
}

impl MongoClient {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            conn: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// The live connection, dialing (and handshaking, and authenticating)
    /// if there is none yet or the previous one died.
    pub async fn connection(&self) -> Result<Arc<ClientConnection>> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            if !conn.is_closed() {
                return Ok(Arc::clone(conn));
            }
            debug!("previous connection is dead, reconnecting");
            *guard = None;
        }

        let conn =
            ClientConnection::connect(self.cfg.clone(), CancellationToken::new()).await?;
        *guard = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Run an arbitrary command against `db` and hand back the raw reply
    /// body. Anything beyond the commands this crate composes itself passes
    /// through here opaquely.
    pub async fn run_command(&self, db: &str, mut body: Document) -> Result<Document> {
        attach_envelope(&mut body, db, self.cfg.read_preference);
        let conn = self.connection().await?;
        let reply = conn.run_command(body).await?;
        Ok(reply.body)
    }

    pub fn database(&self, name: &str) -> Database<'_> {
        Database {
            client: self,
            name: name.to_string(),
            read_preference: None,
        }
    }

    /// Tear the current connection down. The next request reconnects.
    pub async fn disconnect(&self) {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.cancel_now();
        }
    }
}

pub struct Database<'a> {
    pub(crate) client: &'a MongoClient,
    pub(crate) name: String,
    pub(crate) read_preference: Option<ReadPreference>,
}

impl<'a> Database<'a> {
    pub fn with_read_preference(mut self, preference: ReadPreference) -> Self {
        self.read_preference = Some(preference);
        self
    }

    pub fn collection(&self, name: &str) -> Collection<'a> {
        Collection {
            client: self.client,
            db_name: self.name.clone(),
            name: name.to_string(),
            db_read_preference: self.read_preference,
            read_preference: None,
        }
    }
}

pub struct Collection<'a> {
    pub(crate) client: &'a MongoClient,
    pub(crate) db_name: String,
    pub(crate) name: String,
    pub(crate) db_read_preference: Option<ReadPreference>,
    pub(crate) read_preference: Option<ReadPreference>,
}

impl Collection<'_> {
    pub fn with_read_preference(mut self, preference: ReadPreference) -> Self {
        self.read_preference = Some(preference);
        self
    }
}
