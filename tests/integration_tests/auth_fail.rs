// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use bson::doc;
use mongodb_client_rs::{
    cfg::config::{AuthConfig, Credentials},
    command::client::MongoClient,
    error::Error,
};

use crate::integration_tests::common::{
    FakeMongod, ScriptedReply, hello_reply, test_config,
};

#[tokio::test]
async fn wrong_password_fails_the_connect_path() -> Result<()> {
    let fake = FakeMongod::spawn(Box::new(|rec, _id| match rec.command_name.as_str() {
        "hello" => ScriptedReply::Doc(hello_reply()),
        "saslStart" => {
            assert_eq!(
                rec.body.get_str("mechanism").expect("mechanism"),
                "SCRAM-SHA-256"
            );
            assert_eq!(rec.body.get_str("$db").expect("auth db"), "admin");
            ScriptedReply::Doc(doc! {
                "ok": 0.0,
                "code": 18i32,
                "codeName": "AuthenticationFailed",
                "errmsg": "Authentication failed.",
            })
        },
        other => panic!("unexpected command {other}"),
    }))
    .await?;

    let mut cfg = test_config(fake.addr);
    cfg.auth = AuthConfig::ScramSha256(Credentials {
        username: "app".to_string(),
        password: "wrong".to_string(),
        auth_database: "admin".to_string(),
    });
    let client = MongoClient::new(cfg);

    match client.connection().await {
        Err(Error::Authentication { code, message }) => {
            assert_eq!(code, 18);
            assert!(message.contains("Authentication failed"));
        },
        other => panic!("expected an authentication error, got {:?}", other.map(|_| ())),
    }

    // No command may be accepted afterwards; each attempt redials and fails
    // the handshake again.
    let collection = client.database("test").collection("c");
    let err = collection.insert_one(doc! { "n": 1i32 }).await;
    assert!(matches!(err, Err(Error::Authentication { code: 18, .. })));
    assert_eq!(fake.count_of("insert"), 0, "no insert may reach the wire");
    Ok(())
}
