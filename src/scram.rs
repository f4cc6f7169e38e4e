// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SCRAM (RFC 5802 / RFC 7677) client-side computations.
//!
//! This module owns the pure string-and-crypto half of authentication:
//! building the client-first-message, digesting the server challenge into
//! the client-final-message, and verifying the server signature. Driving
//! the `saslStart`/`saslContinue` exchange over the connection is the job
//! of [`crate::state_machine::sasl_states`].

use core::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use md5::Md5;
use pbkdf2::pbkdf2_hmac;
use rand::RngExt;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const CLIENT_NONCE_LEN: usize = 24;

/// Channel-binding header this core always sends: none offered.
const GS2_HEADER: &str = "n,,";
/// `base64("n,,")`, echoed in the client-final-message.
const GS2_HEADER_B64: &str = "biws";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramVariant {
    Sha1,
    Sha256,
}

impl ScramVariant {
    pub fn mechanism_name(self) -> &'static str {
        match self {
            ScramVariant::Sha1 => "SCRAM-SHA-1",
            ScramVariant::Sha256 => "SCRAM-SHA-256",
        }
    }

    /// Output width of the underlying hash.
    fn key_len(self) -> usize {
        match self {
            ScramVariant::Sha1 => 20,
            ScramVariant::Sha256 => 32,
        }
    }
}

impl fmt::Display for ScramVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mechanism_name())
    }
}

/// State accumulated across one SCRAM conversation.
#[derive(Debug)]
pub struct ScramSession {
    variant: ScramVariant,
    username: String,
    password: String,
    client_nonce: String,
    server_nonce: Option<String>,
    auth_message: String,
    server_signature: Option<Vec<u8>>,
}

impl ScramSession {
    pub fn new(variant: ScramVariant, username: &str, password: &str) -> Self {
        Self::with_nonce(variant, username, password, generate_nonce())
    }

    /// Deterministic constructor; tests inject the RFC test-vector nonce.
    pub fn with_nonce(
        variant: ScramVariant,
        username: &str,
        password: &str,
        client_nonce: String,
    ) -> Self {
        Self {
            variant,
            username: username.to_string(),
            password: password.to_string(),
            client_nonce,
            server_nonce: None,
            auth_message: String::new(),
            server_signature: None,
        }
    }

    /// `n,,n=<user>,r=<nonce>` — the payload of `saslStart`.
    pub fn client_first(&self) -> String {
        format!("{GS2_HEADER}{}", self.client_first_bare())
    }

    fn client_first_bare(&self) -> String {
        format!("n={},r={}", saslname_escape(&self.username), self.client_nonce)
    }

    /// Digest the server-first-message and produce the client-final-message
    /// (the payload of the first `saslContinue`).
    pub fn handle_server_first(&mut self, server_first: &str) -> Result<String> {
        let mut server_nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for attr in server_first.split(',') {
            if let Some(v) = attr.strip_prefix("r=") {
                server_nonce = Some(v.to_string());
            } else if let Some(v) = attr.strip_prefix("s=") {
                salt = Some(BASE64.decode(v).map_err(|_| {
                    auth_err("server-first carries invalid base64 salt")
                })?);
            } else if let Some(v) = attr.strip_prefix("i=") {
                iterations = Some(v.parse::<u32>().map_err(|_| {
                    auth_err("server-first carries invalid iteration count")
                })?);
            }
        }

        let server_nonce =
            server_nonce.ok_or_else(|| auth_err("server-first is missing r="))?;
        let salt = salt.ok_or_else(|| auth_err("server-first is missing s="))?;
        let iterations =
            iterations.ok_or_else(|| auth_err("server-first is missing i="))?;

        // The combined nonce must strictly extend ours.
        if !server_nonce.starts_with(&self.client_nonce)
            || server_nonce.len() <= self.client_nonce.len()
        {
            return Err(auth_err("server nonce does not extend the client nonce"));
        }
        if iterations == 0 {
            return Err(auth_err("server demanded zero PBKDF2 iterations"));
        }

        self.auth_message = format!(
            "{},{},c={GS2_HEADER_B64},r={}",
            self.client_first_bare(),
            server_first,
            server_nonce
        );

        let salted = salted_password(
            self.variant,
            &self.prepared_password(),
            &salt,
            iterations,
        );
        let client_key = mac(self.variant, &salted, b"Client Key");
        let stored_key = hash(self.variant, &client_key);
        let client_signature =
            mac(self.variant, &stored_key, self.auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let server_key = mac(self.variant, &salted, b"Server Key");
        self.server_signature =
            Some(mac(self.variant, &server_key, self.auth_message.as_bytes()));
        self.server_nonce = Some(server_nonce.clone());

        Ok(format!(
            "c={GS2_HEADER_B64},r={server_nonce},p={}",
            BASE64.encode(&proof)
        ))
    }

    /// Check the `v=` signature of the server-final-message. A server that
    /// cannot produce it never saw the password.
    pub fn verify_server_final(&self, server_final: &str) -> Result<()> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(auth_err(&format!("server rejected credentials: {err}")));
        }
        let Some(v) = server_final.strip_prefix("v=") else {
            return Err(auth_err("server-final carries neither v= nor e="));
        };
        let presented = BASE64
            .decode(v)
            .map_err(|_| auth_err("server signature is invalid base64"))?;
        let expected = self
            .server_signature
            .as_ref()
            .ok_or_else(|| auth_err("server-final arrived before server-first"))?;
        if &presented != expected {
            return Err(auth_err("server signature mismatch"));
        }
        Ok(())
    }

    /// The password actually fed into PBKDF2. SCRAM-SHA-1 salts the MongoDB
    /// credential digest `md5_hex("<user>:mongo:<password>")`; SCRAM-SHA-256
    /// salts the password itself.
    fn prepared_password(&self) -> String {
        match self.variant {
            ScramVariant::Sha1 => {
                sha1_credential_digest(&self.username, &self.password)
            },
            ScramVariant::Sha256 => self.password.clone(),
        }
    }
}

/// `=` and `,` are the only characters SCRAM escapes in usernames.
fn saslname_escape(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

fn auth_err(message: &str) -> Error {
    Error::Authentication {
        code: 0,
        message: message.to_string(),
    }
}

fn mac(variant: ScramVariant, key: &[u8], data: &[u8]) -> Vec<u8> {
    match variant {
        ScramVariant::Sha1 => {
            let mut m = Hmac::<Sha1>::new_from_slice(key)
                .expect("HMAC accepts any key length");
            m.update(data);
            m.finalize().into_bytes().to_vec()
        },
        ScramVariant::Sha256 => {
            let mut m = Hmac::<Sha256>::new_from_slice(key)
                .expect("HMAC accepts any key length");
            m.update(data);
            m.finalize().into_bytes().to_vec()
        },
    }
}

fn hash(variant: ScramVariant, data: &[u8]) -> Vec<u8> {
    match variant {
        ScramVariant::Sha1 => Sha1::digest(data).to_vec(),
        ScramVariant::Sha256 => Sha256::digest(data).to_vec(),
    }
}

fn salted_password(
    variant: ScramVariant,
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Vec<u8> {
    let mut out = vec![0u8; variant.key_len()];
    match variant {
        ScramVariant::Sha1 => {
            pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations, &mut out);
        },
        ScramVariant::Sha256 => {
            pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
        },
    }
    out
}

/// MongoDB's legacy credential hash, used as the SCRAM-SHA-1 "password".
pub fn sha1_credential_digest(username: &str, password: &str) -> String {
    let mut h = Md5::new();
    h.update(username.as_bytes());
    h.update(b":mongo:");
    h.update(password.as_bytes());
    let digest = h.finalize();

    let mut s = String::with_capacity(digest.len() * 2);
    for b in digest {
        use core::fmt::Write;
        write!(&mut s, "{b:02x}").expect("writing to String cannot fail");
    }
    s
}

/// Random printable nonce; base64 keeps it clear of `,` and `=` splitting
/// pitfalls on the attribute level (`=` only appears as padding, never
/// first).
fn generate_nonce() -> String {
    let mut bytes = [0u8; CLIENT_NONCE_LEN];
    rand::rng().fill(&mut bytes[..]);
    BASE64.encode(bytes)
}
