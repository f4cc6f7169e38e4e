// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use bson::doc;
use mongodb_client_rs::command::client::MongoClient;

use crate::integration_tests::common::{
    FakeMongod, ScriptedReply, hello_reply_with_batch_size, test_config,
};

#[tokio::test]
async fn five_documents_split_into_two_wire_messages() -> Result<()> {
    let fake = FakeMongod::spawn(Box::new(|rec, _id| match rec.command_name.as_str() {
        // The handshake caps batches at three documents.
        "hello" => ScriptedReply::Doc(hello_reply_with_batch_size(3)),
        "insert" => {
            let n = rec.sequences.first().map_or(0, |s| s.documents.len()) as i32;
            ScriptedReply::Doc(doc! { "ok": 1.0, "n": n })
        },
        other => panic!("unexpected command {other}"),
    }))
    .await?;

    let client = MongoClient::new(test_config(fake.addr));
    let collection = client.database("test").collection("c");

    let docs = (0..5).map(|n| doc! { "n": n }).collect::<Vec<_>>();
    let inserted = collection.insert_many(docs, true).await?;
    assert_eq!(inserted, 5, "summed n across batches");

    assert_eq!(fake.count_of("insert"), 2, "exactly two insert messages");
    let batch_sizes: Vec<usize> = fake
        .recorded()
        .iter()
        .filter(|r| r.command_name == "insert")
        .map(|r| r.sequences[0].documents.len())
        .collect();
    assert_eq!(batch_sizes, vec![3, 2]);
    Ok(())
}
