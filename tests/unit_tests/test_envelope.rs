// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bson::doc;
use mongodb_client_rs::{
    cfg::enums::ReadPreference,
    command::envelope::{attach_envelope, check_command_reply, resolve_read_preference},
    error::Error,
};

#[test]
fn envelope_always_carries_db() {
    let mut cmd = doc! { "find": "c" };
    attach_envelope(&mut cmd, "test", ReadPreference::Primary);
    assert_eq!(cmd.get_str("$db").expect("envelope db"), "test");
    assert!(
        !cmd.contains_key("$readPreference"),
        "primary must never be spelled out"
    );
}

#[test]
fn non_primary_preference_reaches_the_wire() {
    let mut cmd = doc! { "find": "c" };
    attach_envelope(&mut cmd, "test", ReadPreference::SecondaryPreferred);
    let pref = cmd.get_document("$readPreference").expect("subdocument");
    assert_eq!(pref.get_str("mode").expect("mode"), "secondaryPreferred");
}

#[test]
fn preference_resolution_walks_up_the_levels() {
    let col = Some(ReadPreference::Nearest);
    let db = Some(ReadPreference::Secondary);
    let global = ReadPreference::PrimaryPreferred;

    assert_eq!(resolve_read_preference(col, db, global), ReadPreference::Nearest);
    assert_eq!(resolve_read_preference(None, db, global), ReadPreference::Secondary);
    assert_eq!(resolve_read_preference(None, None, global), ReadPreference::PrimaryPreferred);
}

#[test]
fn ok_reply_returns_n() {
    let n = check_command_reply(&doc! { "ok": 1.0, "n": 5i32 }, None).expect("success");
    assert_eq!(n, 5);

    // `ok` as int and a missing n are fine too.
    let n = check_command_reply(&doc! { "ok": 1i32 }, None).expect("success");
    assert_eq!(n, 0);
}

#[test]
fn top_level_error_code_is_raised() {
    let err = check_command_reply(
        &doc! { "ok": 0.0, "code": 59i32, "errmsg": "no such command" },
        None,
    );
    match err {
        Err(Error::Write { code, message }) => {
            assert_eq!(code, 59);
            assert!(message.contains("no such command"));
        },
        other => panic!("expected write error, got {other:?}"),
    }
}

#[test]
fn write_errors_ride_on_ok_replies() {
    let body = doc! {
        "ok": 1.0,
        "n": 0i32,
        "writeErrors": [ { "index": 0i32, "code": 11000i32, "errmsg": "duplicate key" } ],
    };
    match check_command_reply(&body, None) {
        Err(Error::Write { code, .. }) => assert_eq!(code, 11000),
        other => panic!("expected duplicate-key error, got {other:?}"),
    }
}

#[test]
fn write_concern_error_is_raised() {
    let body = doc! {
        "ok": 1.0,
        "writeConcernError": { "code": 64i32, "errmsg": "waiting for replication" },
    };
    match check_command_reply(&body, None) {
        Err(Error::Write { code, .. }) => assert_eq!(code, 64),
        other => panic!("expected write concern error, got {other:?}"),
    }
}

#[test]
fn ignorable_code_turns_into_zero_count_success() {
    let body = doc! { "ok": 0.0, "code": 26i32, "errmsg": "ns not found" };
    let n = check_command_reply(&body, Some(26)).expect("ignorable");
    assert_eq!(n, 0);

    // A different code still raises.
    assert!(check_command_reply(&body, Some(27)).is_err());
}
