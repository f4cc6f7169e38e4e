// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The SCRAM conversation as a state machine over the connection.
//!
//! ```text
//! Start ── saslStart ──▶ ContinueFirst ── saslContinue(proof) ──▶
//!                        ContinueFinal ── saslContinue(empty) ──▶ done
//! ```
//!
//! Every round sends one command and digests one reply. The empty closing
//! `saslContinue` is always sent, even when the server already flagged the
//! conversation done while answering the proof; acknowledgement requires
//! the reply to that closing round to carry `ok: 1` and `done: true`. Any
//! non-`ok` reply or transport failure terminates the machine with an
//! authentication error carrying the server-supplied code and message when
//! available.

use std::sync::Arc;

use bson::{Bson, Document, doc, spec::BinarySubtype};
use tracing::debug;

use crate::{
    cfg::config::Credentials,
    client::connection::ClientConnection,
    error::{Error, Result},
    models::reply::{OpMsgReply, doc_get_i64},
    scram::{ScramSession, ScramVariant},
};

/// `AuthenticationFailed` — the code reported for a failing step when the
/// server does not say otherwise.
const AUTHENTICATION_FAILED: i32 = 18;

/// The rounds of the conversation.
enum SaslStates {
    /// Sends `saslStart` with the client-first-message.
    Start,
    /// Sends the client-final-message and checks the server signature.
    ContinueFirst,
    /// Sends the empty `saslContinue` that closes the conversation.
    ContinueFinal,
}

/// Outcome of one round: advance, or stop with the conversation's result.
enum SaslTransition {
    Next(SaslStates),
    Done(Result<()>),
}

/// This structure represents the context for one SASL conversation.
pub struct SaslCtx {
    /// The client connection the conversation runs over.
    conn: Arc<ClientConnection>,
    /// Pure SCRAM computations (nonces, proofs, signatures).
    scram: ScramSession,
    mechanism: ScramVariant,
    auth_database: String,
    /// Conversation id echoed back on every `saslContinue`.
    conversation_id: Option<Bson>,
    /// Server payload from the previous round.
    last_payload: Vec<u8>,
    /// Whether the latest reply flagged the conversation done.
    server_done: bool,
}

impl SaslCtx {
    pub fn new(
        conn: Arc<ClientConnection>,
        mechanism: ScramVariant,
        creds: &Credentials,
    ) -> Self {
        Self {
            conn,
            scram: ScramSession::new(mechanism, &creds.username, &creds.password),
            mechanism,
            auth_database: creds.auth_database.clone(),
            conversation_id: None,
            last_payload: Vec::new(),
            server_done: false,
        }
    }

    /// Drive the machine to a terminal state.
    pub async fn execute(&mut self) -> Result<()> {
        debug!(mechanism = %self.mechanism, "starting SASL conversation");
        let mut state = SaslStates::Start;
        loop {
            let transition = match state {
                SaslStates::Start => self.step_start().await,
                SaslStates::ContinueFirst => self.step_continue_first().await,
                SaslStates::ContinueFinal => self.step_continue_final().await,
            };
            match transition {
                SaslTransition::Next(next) => state = next,
                SaslTransition::Done(result) => return result,
            }
        }
    }

    async fn step_start(&mut self) -> SaslTransition {
        let client_first = self.scram.client_first();
        let cmd = doc! {
            "saslStart": 1i32,
            "mechanism": self.mechanism.mechanism_name(),
            "payload": bson::Binary {
                subtype: BinarySubtype::Generic,
                bytes: client_first.into_bytes(),
            },
            "autoAuthorize": 1i32,
            "$db": &self.auth_database,
        };

        let reply = match self.conn.run_command(cmd).await {
            Ok(r) => r,
            Err(e) => return SaslTransition::Done(Err(e)),
        };
        if let Err(e) = self.absorb_reply(&reply) {
            return SaslTransition::Done(Err(e));
        }
        SaslTransition::Next(SaslStates::ContinueFirst)
    }

    async fn step_continue_first(&mut self) -> SaslTransition {
        let server_first = match self.last_payload_utf8() {
            Ok(s) => s,
            Err(e) => return SaslTransition::Done(Err(e)),
        };
        let client_final = match self.scram.handle_server_first(&server_first) {
            Ok(s) => s,
            Err(e) => return SaslTransition::Done(Err(e)),
        };

        let cmd = self.continue_command(client_final.into_bytes());
        let reply = match self.conn.run_command(cmd).await {
            Ok(r) => r,
            Err(e) => return SaslTransition::Done(Err(e)),
        };
        if let Err(e) = self.absorb_reply(&reply) {
            return SaslTransition::Done(Err(e));
        }

        // The server proves knowledge of the password here; a mismatch
        // ends the conversation no matter what the reply said.
        let server_final = match self.last_payload_utf8() {
            Ok(s) => s,
            Err(e) => return SaslTransition::Done(Err(e)),
        };
        if let Err(e) = self.scram.verify_server_final(&server_final) {
            return SaslTransition::Done(Err(e));
        }
        SaslTransition::Next(SaslStates::ContinueFinal)
    }

    async fn step_continue_final(&mut self) -> SaslTransition {
        let cmd = self.continue_command(Vec::new());
        let reply = match self.conn.run_command(cmd).await {
            Ok(r) => r,
            Err(e) => return SaslTransition::Done(Err(e)),
        };
        if let Err(e) = self.absorb_reply(&reply) {
            return SaslTransition::Done(Err(e));
        }
        if self.server_done {
            SaslTransition::Done(Ok(()))
        } else {
            SaslTransition::Done(Err(Error::Authentication {
                code: 0,
                message: "server never completed the SASL conversation".into(),
            }))
        }
    }

    /// Digest one server reply: enforce `ok`, capture the conversation id,
    /// payload, and `done` marker.
    fn absorb_reply(&mut self, reply: &OpMsgReply) -> Result<()> {
        if !reply.command_ok() {
            return Err(Error::Authentication {
                code: reply.error_code().unwrap_or(AUTHENTICATION_FAILED),
                message: reply
                    .error_message()
                    .unwrap_or("SASL step rejected")
                    .to_string(),
            });
        }
        if let Some(id) = reply.body.get("conversationId") {
            self.conversation_id = Some(id.clone());
        }
        self.last_payload = reply
            .body
            .get_binary_generic("payload")
            .map(|b| b.to_vec())
            .unwrap_or_default();
        self.server_done = reply.body.get_bool("done").unwrap_or(false)
            || doc_get_i64(&reply.body, "done").is_some_and(|d| d != 0);
        Ok(())
    }

    fn last_payload_utf8(&self) -> Result<String> {
        String::from_utf8(self.last_payload.clone()).map_err(|_| Error::Authentication {
            code: 0,
            message: "server SASL payload is not UTF-8".into(),
        })
    }

    fn continue_command(&self, payload: Vec<u8>) -> Document {
        let conversation_id = match &self.conversation_id {
            Some(id) => id.clone(),
            None => Bson::Int32(1),
        };
        doc! {
            "saslContinue": 1i32,
            "conversationId": conversation_id,
            "payload": bson::Binary { subtype: BinarySubtype::Generic, bytes: payload },
            "$db": &self.auth_database,
        }
    }
}
