// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use bson::doc;
use mongodb_client_rs::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    command::{client::MongoClient, find::FindOptions},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _init_logger = init_logger("tests/config_logger.yaml")?;

    // Load config
    let cfg = resolve_config_path("tests/config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;
    info!("connecting to {}", cfg.endpoint());

    let client = MongoClient::new(cfg);
    let collection = client.database("test").collection("smoke");

    // A clean slate; NamespaceNotFound on a fresh server is fine.
    collection.drop_collection().await?;

    // ---- Insert a handful of documents ----
    let docs = (0..25)
        .map(|n| doc! { "name": format!("item-{n}"), "n": n })
        .collect::<Vec<_>>();
    let inserted = collection.insert_many(docs, true).await?;
    info!("inserted {inserted} documents");

    // ---- Point lookup ----
    let found = collection
        .find_one(doc! { "name": "item-7" })
        .await?
        .context("item-7 should exist")?;
    info!("findOne: {found}");

    // ---- Cursor iteration ----
    let mut cursor = collection
        .find(doc! {}, FindOptions { batch_size: Some(10), ..FindOptions::default() })
        .await?;
    let mut total = 0usize;
    while let Some(_doc) = cursor.try_next().await? {
        total += 1;
    }
    info!("iterated {total} documents");

    // ---- Opaque passthrough command ----
    let stats = client.run_command("test", doc! { "collStats": "smoke" }).await?;
    info!("collStats ok={:?}", stats.get("ok"));

    collection.drop_collection().await?;
    client.disconnect().await;

    Ok(())
}
