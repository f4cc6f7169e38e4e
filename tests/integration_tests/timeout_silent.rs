// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use bson::doc;
use mongodb_client_rs::{command::client::MongoClient, error::Error};
use serial_test::serial;
use tokio::time::Instant;

use crate::integration_tests::common::{
    FakeMongod, ScriptedReply, hello_reply, test_config_with_reply_timeout,
};

#[tokio::test]
#[serial]
async fn silent_server_times_the_request_out() -> Result<()> {
    let fake = FakeMongod::spawn(Box::new(|rec, _id| match rec.command_name.as_str() {
        "hello" => ScriptedReply::Doc(hello_reply()),
        // The server swallows the find and never answers.
        "find" => ScriptedReply::Silent,
        other => panic!("unexpected command {other}"),
    }))
    .await?;

    let reply_timeout = Duration::from_millis(500);
    let client = MongoClient::new(test_config_with_reply_timeout(fake.addr, reply_timeout));
    let collection = client.database("test").collection("c");

    let started = Instant::now();
    let err = collection.find_one(doc! { "name": "x" }).await;
    let elapsed = started.elapsed();

    match err {
        Err(Error::Connection(reason)) => {
            assert!(reason.contains("no reply"), "unexpected reason: {reason}");
        },
        other => panic!("expected a connection error, got {other:?}"),
    }
    assert!(elapsed >= reply_timeout, "failed too early: {elapsed:?}");
    assert!(
        elapsed < reply_timeout * 4,
        "timeout took far too long: {elapsed:?}"
    );

    // The request id must be gone from both registry maps; the connection
    // itself stays usable for the next request.
    let conn = client.connection().await?;
    assert_eq!(conn.registry().outstanding(), 0);
    assert!(!conn.is_closed());
    Ok(())
}
