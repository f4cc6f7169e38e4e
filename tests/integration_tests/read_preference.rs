// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use bson::doc;
use mongodb_client_rs::{cfg::enums::ReadPreference, command::client::MongoClient};

use crate::integration_tests::common::{
    FakeMongod, ScriptedReply, hello_reply, test_config,
};

#[tokio::test]
async fn collection_preference_overrides_and_reaches_the_wire() -> Result<()> {
    let fake = FakeMongod::spawn(Box::new(|rec, _id| match rec.command_name.as_str() {
        "hello" => ScriptedReply::Doc(hello_reply()),
        "find" => ScriptedReply::Doc(doc! {
            "ok": 1.0,
            "cursor": { "id": 0i64, "ns": "test.c", "firstBatch": [] },
        }),
        other => panic!("unexpected command {other}"),
    }))
    .await?;

    let client = MongoClient::new(test_config(fake.addr));
    let db = client.database("test");

    // Collection-level preference wins over the inherited primary.
    let collection = db
        .collection("c")
        .with_read_preference(ReadPreference::SecondaryPreferred);
    let found = collection.find_one(doc! {}).await?;
    assert!(found.is_none());

    let recorded = fake.recorded();
    let find = recorded
        .iter()
        .find(|r| r.command_name == "find")
        .context("find must hit the wire")?;
    let pref = find
        .body
        .get_document("$readPreference")
        .context("$readPreference must be attached")?;
    assert_eq!(pref.get_str("mode")?, "secondaryPreferred");

    // The handshake itself runs at primary and must not carry one.
    let hello = recorded
        .iter()
        .find(|r| r.command_name == "hello")
        .context("hello must hit the wire")?;
    assert!(!hello.body.contains_key("$readPreference"));
    Ok(())
}
