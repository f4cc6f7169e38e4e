// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request-id → reply bookkeeping shared between the receive loop and the
//! tasks waiting on their replies.
//!
//! Two maps, both keyed by request id: *partial* tracks requests that are
//! still in flight (with the timestamp of the last bytes seen for them) and
//! *completed* holds decoded replies until their waiter consumes them. A
//! request id lives in exactly one of the maps and is removed from both on
//! every terminal transition (completed, timed out, connection lost).
//!
//! Waiters block on a [`Notify`] rather than polling. Two deadlines apply:
//! with no partial timestamp the wait fails `reply_timeout` after it
//! started; once reply bytes start arriving the deadline slides to
//! `last_chunk + reply_timeout`, so a slow large reply survives as long as
//! the server keeps sending.

use dashmap::DashMap;
use tokio::{
    sync::Notify,
    time::{Duration, Instant, sleep_until},
};
use tracing::debug;

use crate::{
    error::{Error, Result},
    models::reply::OpMsgReply,
};

#[derive(Debug, Clone, Copy)]
struct PendingReply {
    registered_at: Instant,
    last_chunk: Option<Instant>,
}

#[derive(Debug)]
enum CompletedReply {
    Reply(Box<OpMsgReply>),
    /// The connection reset or the wire went unparseable before a reply
    /// arrived; the waiter gets a connection error immediately.
    Aborted(String),
}

#[derive(Debug, Default)]
pub struct ReplyRegistry {
    partial: DashMap<i32, PendingReply>,
    completed: DashMap<i32, CompletedReply>,
    notify: Notify,
}

impl ReplyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Precondition for waiting: announce interest in `request_id`.
    pub fn register(&self, request_id: i32) {
        self.partial.insert(
            request_id,
            PendingReply {
                registered_at: Instant::now(),
                last_chunk: None,
            },
        );
    }

    /// Refresh the last-received timestamp for a request whose reply is
    /// arriving in pieces. Unknown ids are ignored.
    pub fn mark_partial(&self, request_id: i32) {
        if let Some(mut entry) = self.partial.get_mut(&request_id) {
            entry.last_chunk = Some(Instant::now());
        }
    }

    /// Move a decoded reply into the completed map and wake its waiter.
    pub fn publish(&self, request_id: i32, reply: OpMsgReply) {
        self.partial.remove(&request_id);
        self.completed
            .insert(request_id, CompletedReply::Reply(Box::new(reply)));
        self.notify.notify_waiters();
    }

    /// Terminate a pending request with a connection-level failure.
    pub fn fail(&self, request_id: i32, reason: &str) {
        self.partial.remove(&request_id);
        self.completed
            .insert(request_id, CompletedReply::Aborted(reason.to_string()));
        self.notify.notify_waiters();
    }

    /// Flush both maps and fail every in-flight request. Called on any
    /// socket disconnect so no waiter idles into its timeout.
    pub fn fail_all_inflight(&self, reason: &str) {
        let pending: Vec<i32> = self.partial.iter().map(|e| *e.key()).collect();
        debug!(inflight = pending.len(), "failing in-flight requests: {reason}");
        for id in pending {
            self.partial.remove(&id);
            self.completed
                .insert(id, CompletedReply::Aborted(reason.to_string()));
        }
        self.notify.notify_waiters();
    }

    /// Forget a request entirely (send failure, timeout cleanup).
    pub fn drop_request(&self, request_id: i32) {
        self.partial.remove(&request_id);
        self.completed.remove(&request_id);
    }

    /// Whether the id is present in either map. Mostly useful to tests.
    pub fn is_tracked(&self, request_id: i32) -> bool {
        self.partial.contains_key(&request_id) || self.completed.contains_key(&request_id)
    }

    /// Total entries across both maps.
    pub fn outstanding(&self) -> usize {
        self.partial.len() + self.completed.len()
    }

    fn take(&self, request_id: i32) -> Option<CompletedReply> {
        self.completed.remove(&request_id).map(|(_, v)| v)
    }

    /// The deadline tracks the last partial chunk when one was seen, the
    /// registration time otherwise; `fallback` covers an entry that is
    /// already gone.
    fn deadline_for(&self, request_id: i32, fallback: Instant, reply_timeout: Duration) -> Instant {
        let pending = self.partial.get(&request_id).map(|entry| *entry.value());
        match pending {
            Some(PendingReply {
                last_chunk: Some(t), ..
            }) => t + reply_timeout,
            Some(PendingReply { registered_at, .. }) => registered_at + reply_timeout,
            None => fallback + reply_timeout,
        }
    }

    /// Block until the reply for `request_id` lands, the connection drops,
    /// or the (sliding) deadline passes. The id is gone from both maps when
    /// this returns.
    pub async fn wait(&self, request_id: i32, reply_timeout: Duration) -> Result<OpMsgReply> {
        let started = Instant::now();
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(done) = self.take(request_id) {
                return match done {
                    CompletedReply::Reply(reply) => Ok(*reply),
                    CompletedReply::Aborted(reason) => Err(Error::Connection(reason)),
                };
            }
            if !self.partial.contains_key(&request_id) {
                // The receive loop may have published between the two map
                // probes; look again before treating this as a drop.
                match self.take(request_id) {
                    Some(CompletedReply::Reply(reply)) => return Ok(*reply),
                    Some(CompletedReply::Aborted(reason)) => {
                        return Err(Error::Connection(reason));
                    },
                    None => {
                        return Err(Error::Connection(format!(
                            "request {request_id} was dropped while waiting"
                        )));
                    },
                }
            }

            let deadline = self.deadline_for(request_id, started, reply_timeout);
            tokio::select! {
                _ = &mut notified => {},
                _ = sleep_until(deadline) => {
                    // The deadline may have slid forward while we slept.
                    if Instant::now() < self.deadline_for(request_id, started, reply_timeout) {
                        continue;
                    }
                    if let Some(CompletedReply::Reply(reply)) = self.take(request_id) {
                        return Ok(*reply);
                    }
                    self.drop_request(request_id);
                    return Err(Error::Connection(format!(
                        "no reply for request {request_id} within {reply_timeout:?}"
                    )));
                },
            }
        }
    }
}
