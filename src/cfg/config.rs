// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::ReadPreference;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Endpoint and timeout settings for the single server connection.
    #[serde(rename = "Connection")]
    pub connection: ConnectionConfig,

    /// TLS termination settings for the socket.
    #[serde(default, rename = "Tls")]
    pub tls: TlsConfig,

    /// Authentication strategy (mechanism plus credentials).
    #[serde(default, rename = "Auth")]
    pub auth: AuthConfig,

    /// Client-global read preference; collections and databases may
    /// override it per handle.
    #[serde(default, rename = "ReadPreference")]
    pub read_preference: ReadPreference,
}

/// Where the server lives and how long the core waits on it.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConnectionConfig {
    #[serde(rename = "Host")]
    pub host: String,

    #[serde(default = "default_port", rename = "Port")]
    pub port: u16,

    #[serde(
        default = "default_timeout",
        rename = "TimeoutConnection",
        with = "serde_millis"
    )]
    /// Bound on establishing the TCP (and TLS) connection.
    pub connect_timeout: Duration,

    #[serde(
        default = "default_timeout",
        rename = "TimeoutReply",
        with = "serde_millis"
    )]
    /// Per-request bound on waiting for a reply. The deadline slides while
    /// partial reply bytes keep arriving.
    pub reply_timeout: Duration,
}

fn default_port() -> u16 {
    27017
}

fn default_timeout() -> Duration {
    Duration::from_millis(5000)
}

/// TLS settings. Certificate material is given as PEM file paths; the
/// handshake sets SNI to the configured host.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TlsConfig {
    #[serde(default, rename = "Enabled")]
    pub enabled: bool,

    #[serde(default, rename = "CaFile")]
    /// Root certificates to trust; the system webpki roots when absent.
    pub ca_file: Option<PathBuf>,

    #[serde(default, rename = "CertFile")]
    /// Client certificate chain for mutual TLS.
    pub cert_file: Option<PathBuf>,

    #[serde(default, rename = "KeyFile")]
    /// Private key matching `CertFile`.
    pub key_file: Option<PathBuf>,
}

/// Authentication configuration keyed by the SASL mechanism name.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(tag = "Mechanism")]
pub enum AuthConfig {
    #[default]
    #[serde(rename = "None")]
    None,
    #[serde(rename = "SCRAM-SHA-1")]
    ScramSha1(Credentials),
    #[serde(rename = "SCRAM-SHA-256")]
    ScramSha256(Credentials),
}

/// Credentials used during the SCRAM conversation.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Credentials {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(default = "default_auth_database", rename = "AuthDatabase")]
    /// Database the SASL conversation runs against.
    pub auth_database: String,
}

fn default_auth_database() -> String {
    "admin".to_string()
}

impl AuthConfig {
    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            AuthConfig::None => None,
            AuthConfig::ScramSha1(c) | AuthConfig::ScramSha256(c) => Some(c),
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.connection.host.is_empty(), "Host must not be empty");
        ensure!(self.connection.port != 0, "Port must not be 0");
        ensure!(
            !self.connection.connect_timeout.is_zero(),
            "TimeoutConnection must be > 0"
        );
        ensure!(
            !self.connection.reply_timeout.is_zero(),
            "TimeoutReply must be > 0"
        );

        // A client certificate only makes sense as a cert/key pair.
        ensure!(
            self.tls.cert_file.is_some() == self.tls.key_file.is_some(),
            "CertFile and KeyFile must be configured together"
        );

        if let Some(creds) = self.auth.credentials() {
            ensure!(!creds.username.is_empty(), "Username must not be empty");
            ensure!(
                !creds.auth_database.is_empty(),
                "AuthDatabase must not be empty"
            );
        }

        Ok(())
    }

    /// `host:port` for dialing and log lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.connection.host, self.connection.port)
    }
}

/// Serde helpers for representing `Duration` as a number of milliseconds.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
