// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use bson::{Bson, Document, doc};
use mongodb_client_rs::command::{client::MongoClient, find::FindOptions};

use crate::integration_tests::common::{
    FakeMongod, ScriptedReply, hello_reply, test_config,
};

const TOTAL: usize = 250;
const SERVER_BATCH: usize = 101;
const CURSOR_ID: i64 = 42;

fn batch(all: &[Document], offset: usize) -> (Vec<Bson>, i64, usize) {
    let end = (offset + SERVER_BATCH).min(all.len());
    let docs = all[offset..end]
        .iter()
        .cloned()
        .map(Bson::Document)
        .collect();
    let id = if end == all.len() { 0 } else { CURSOR_ID };
    (docs, id, end)
}

#[tokio::test]
async fn full_iteration_over_server_batches() -> Result<()> {
    let all: Vec<Document> = (0..TOTAL as i32).map(|n| doc! { "n": n }).collect();
    let mut offset = 0usize;
    let fake = FakeMongod::spawn(Box::new(move |rec, _id| match rec.command_name.as_str() {
        "hello" => ScriptedReply::Doc(hello_reply()),
        "find" => {
            let (docs, id, end) = batch(&all, 0);
            offset = end;
            ScriptedReply::Doc(doc! {
                "ok": 1.0,
                "cursor": { "id": id, "ns": "test.c", "firstBatch": docs },
            })
        },
        "getMore" => {
            assert_eq!(rec.body.get_i64("getMore").expect("cursor id"), CURSOR_ID);
            let (docs, id, end) = batch(&all, offset);
            offset = end;
            ScriptedReply::Doc(doc! {
                "ok": 1.0,
                "cursor": { "id": id, "ns": "test.c", "nextBatch": docs },
            })
        },
        other => panic!("unexpected command {other}"),
    }))
    .await?;

    let client = MongoClient::new(test_config(fake.addr));
    let collection = client.database("test").collection("c");

    let mut cursor = collection.find(doc! {}, FindOptions::default()).await?;
    assert_eq!(cursor.namespace().to_string(), "test.c");

    let mut yielded = 0usize;
    for _ in 0..50 {
        let doc = cursor.try_next().await?.expect("within the first batch");
        assert_eq!(doc.get_i32("n")? as usize, yielded);
        yielded += 1;
    }
    let rest = cursor.collect_remaining().await?;
    yielded += rest.len();

    assert_eq!(yielded, TOTAL);
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.cursor_id(), 0, "server closed the cursor");

    // 250 documents at 101 per batch: one find plus two getMore.
    assert_eq!(fake.count_of("find"), 1);
    assert_eq!(fake.count_of("getMore"), 2);

    // The batch-size hint echoes the previous batch length.
    for get_more in fake.recorded().iter().filter(|r| r.command_name == "getMore") {
        assert_eq!(get_more.body.get_i64("batchSize")?, SERVER_BATCH as i64);
        assert_eq!(get_more.body.get_str("collection")?, "c");
        assert_eq!(get_more.body.get_str("$db")?, "test");
    }
    Ok(())
}
