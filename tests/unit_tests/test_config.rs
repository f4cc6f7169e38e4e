// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use mongodb_client_rs::cfg::{
    config::{AuthConfig, Config},
    enums::ReadPreference,
};

#[test]
fn loads_the_checked_in_config() -> Result<()> {
    let cfg = Config::load_from_file("tests/config.yaml")?;
    assert_eq!(cfg.connection.host, "127.0.0.1");
    assert_eq!(cfg.connection.port, 27017);
    assert_eq!(cfg.connection.connect_timeout, Duration::from_millis(5000));
    assert_eq!(cfg.connection.reply_timeout, Duration::from_millis(5000));
    assert!(matches!(cfg.auth, AuthConfig::None));
    assert!(!cfg.tls.enabled);
    assert_eq!(cfg.read_preference, ReadPreference::Primary);
    Ok(())
}

#[test]
fn defaults_fill_in_omitted_keys() -> Result<()> {
    let cfg: Config = serde_yaml::from_str(
        r#"
Connection:
  Host: db.example.com
"#,
    )?;
    assert_eq!(cfg.connection.port, 27017);
    assert_eq!(cfg.connection.connect_timeout, Duration::from_millis(5000));
    assert_eq!(cfg.connection.reply_timeout, Duration::from_millis(5000));
    assert!(matches!(cfg.auth, AuthConfig::None));
    assert_eq!(cfg.read_preference, ReadPreference::Primary);
    Ok(())
}

#[test]
fn scram_credentials_parse_with_default_auth_db() -> Result<()> {
    let mut cfg: Config = serde_yaml::from_str(
        r#"
Connection:
  Host: db.example.com
  TimeoutReply: 750
Auth:
  Mechanism: SCRAM-SHA-256
  Username: app
  Password: hunter2
ReadPreference: SecondaryPreferred
"#,
    )?;
    cfg.validate_and_normalize()?;

    assert_eq!(cfg.connection.reply_timeout, Duration::from_millis(750));
    assert_eq!(cfg.read_preference, ReadPreference::SecondaryPreferred);
    let creds = cfg.auth.credentials().expect("credentials present");
    assert_eq!(creds.username, "app");
    assert_eq!(creds.auth_database, "admin");
    Ok(())
}

#[test]
fn validation_rejects_broken_configs() -> Result<()> {
    // Empty host.
    let mut cfg: Config = serde_yaml::from_str("Connection:\n  Host: ''\n")?;
    assert!(cfg.validate_and_normalize().is_err());

    // Client cert without key.
    let mut cfg: Config = serde_yaml::from_str(
        r#"
Connection:
  Host: db.example.com
Tls:
  Enabled: true
  CertFile: /tmp/client.pem
"#,
    )?;
    assert!(cfg.validate_and_normalize().is_err());

    // SCRAM with an empty username.
    let mut cfg: Config = serde_yaml::from_str(
        r#"
Connection:
  Host: db.example.com
Auth:
  Mechanism: SCRAM-SHA-1
  Username: ''
  Password: x
"#,
    )?;
    assert!(cfg.validate_and_normalize().is_err());
    Ok(())
}
