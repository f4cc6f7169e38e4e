// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Command envelope fields and reply interpretation.

use bson::{Bson, Document, doc};

use crate::{
    cfg::enums::ReadPreference,
    error::{Error, Result},
    models::reply::{bson_is_truthy_one, doc_get_i64},
};

/// Complete a command document: every command carries `$db`, and any
/// resolved read preference other than `primary` travels as a
/// `$readPreference` subdocument.
pub fn attach_envelope(body: &mut Document, db: &str, preference: ReadPreference) {
    body.insert("$db", db);
    if preference != ReadPreference::Primary {
        body.insert("$readPreference", doc! { "mode": preference.mode_str() });
    }
}

/// Resolve the preference for a collection-level operation:
/// collection → database → client-global.
pub fn resolve_read_preference(
    collection: Option<ReadPreference>,
    database: Option<ReadPreference>,
    client: ReadPreference,
) -> ReadPreference {
    collection.or(database).unwrap_or(client)
}

/// Interpret a command reply body, returning the affected-document count.
///
/// Write errors are reported by the server in several shapes, checked in
/// order: a `writeErrors[]` entry or `writeConcernError` (these may ride on
/// an `ok: 1` reply), then `ok: 1` → success, then top-level
/// `code`/`errmsg`. A caller-supplied ignorable code converts a matching
/// failure into a zero-count success.
pub fn check_command_reply(
    body: &Document,
    ignorable_code: Option<i32>,
) -> Result<i64> {
    if let Some((code, message)) = first_write_error(body) {
        if ignorable_code == Some(code) {
            return Ok(0);
        }
        return Err(Error::Write { code, message });
    }

    if body.get("ok").is_some_and(bson_is_truthy_one) {
        return Ok(doc_get_i64(body, "n").unwrap_or(0));
    }

    let code = doc_get_i64(body, "code").unwrap_or(0) as i32;
    if ignorable_code == Some(code) {
        return Ok(0);
    }
    Err(Error::Write {
        code,
        message: body
            .get_str("errmsg")
            .unwrap_or("command failed")
            .to_string(),
    })
}

fn first_write_error(body: &Document) -> Option<(i32, String)> {
    if let Ok(errors) = body.get_array("writeErrors")
        && let Some(Bson::Document(e)) = errors.first()
    {
        return Some((
            doc_get_i64(e, "code").unwrap_or(0) as i32,
            e.get_str("errmsg").unwrap_or("write error").to_string(),
        ));
    }
    if let Ok(e) = body.get_document("writeConcernError") {
        return Some((
            doc_get_i64(e, "code").unwrap_or(0) as i32,
            e.get_str("errmsg").unwrap_or("write concern error").to_string(),
        ));
    }
    None
}
