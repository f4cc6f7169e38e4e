// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use bson::{Bson, Document, doc, oid::ObjectId};
use mongodb_client_rs::{cfg::logger::init_logger, command::client::MongoClient};

use crate::integration_tests::common::{
    FakeMongod, ScriptedReply, hello_reply, test_config,
};

#[tokio::test]
async fn insert_one_then_find_one() -> Result<()> {
    let _ = init_logger("tests/config_logger.yaml");

    // The fake keeps an actual store so the find goes through the same
    // motions a real server would: _id stamping included.
    let mut store: Vec<Document> = Vec::new();
    let fake = FakeMongod::spawn(Box::new(move |rec, _id| match rec.command_name.as_str() {
        "hello" => ScriptedReply::Doc(hello_reply()),
        "insert" => {
            let mut inserted = 0i32;
            for seq in &rec.sequences {
                for doc in &seq.documents {
                    let mut doc = doc.clone();
                    if !doc.contains_key("_id") {
                        doc.insert("_id", ObjectId::new());
                    }
                    store.push(doc);
                    inserted += 1;
                }
            }
            ScriptedReply::Doc(doc! { "ok": 1.0, "n": inserted })
        },
        "find" => {
            let filter = rec.body.get_document("filter").cloned().unwrap_or_default();
            let matching: Vec<Bson> = store
                .iter()
                .filter(|d| {
                    filter
                        .iter()
                        .all(|(k, v)| d.get(k) == Some(v))
                })
                .cloned()
                .map(Bson::Document)
                .collect();
            ScriptedReply::Doc(doc! {
                "ok": 1.0,
                "cursor": { "id": 0i64, "ns": "test.c", "firstBatch": matching },
            })
        },
        other => panic!("unexpected command {other}"),
    }))
    .await?;

    let client = MongoClient::new(test_config(fake.addr));
    let collection = client.database("test").collection("c");

    let inserted = collection.insert_one(doc! { "name": "x", "n": 1i32 }).await?;
    assert_eq!(inserted, 1);

    let found = collection
        .find_one(doc! { "name": "x" })
        .await?
        .context("the inserted document should be found")?;
    assert_eq!(found.get_str("name")?, "x");
    assert_eq!(found.get_i32("n")?, 1);
    assert!(found.contains_key("_id"), "server-side _id must come back");

    // The wire shapes behind the calls.
    let recorded = fake.recorded();
    let insert = recorded
        .iter()
        .find(|r| r.command_name == "insert")
        .context("insert must hit the wire")?;
    assert_eq!(insert.body.get_str("$db")?, "test");
    assert_eq!(insert.body.get_bool("ordered")?, true);
    assert_eq!(insert.sequences.len(), 1);
    assert_eq!(insert.sequences[0].identifier, "documents");

    let find = recorded
        .iter()
        .find(|r| r.command_name == "find")
        .context("find must hit the wire")?;
    assert_eq!(find.body.get_i64("limit")?, 1);
    assert_eq!(find.body.get_bool("singleBatch")?, true);
    Ok(())
}
