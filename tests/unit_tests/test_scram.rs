// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use mongodb_client_rs::{
    error::Error,
    scram::{ScramSession, ScramVariant},
};

// RFC 7677 §3 test vector for SCRAM-SHA-256.
const RFC7677_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
const RFC7677_SERVER_FIRST: &str =
    "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
const RFC7677_CLIENT_FINAL: &str =
    "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
const RFC7677_SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

fn rfc7677_session() -> ScramSession {
    ScramSession::with_nonce(
        ScramVariant::Sha256,
        "user",
        "pencil",
        RFC7677_NONCE.to_string(),
    )
}

#[test]
fn sha256_matches_rfc7677_vector() -> Result<()> {
    let mut session = rfc7677_session();
    assert_eq!(
        session.client_first(),
        format!("n,,n=user,r={RFC7677_NONCE}")
    );

    let client_final = session.handle_server_first(RFC7677_SERVER_FIRST)?;
    assert_eq!(client_final, RFC7677_CLIENT_FINAL);

    session.verify_server_final(RFC7677_SERVER_FINAL)?;
    Ok(())
}

#[test]
fn tampered_server_signature_is_rejected() -> Result<()> {
    let mut session = rfc7677_session();
    session.handle_server_first(RFC7677_SERVER_FIRST)?;

    // Same length, different bytes.
    let forged = "v=7rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";
    match session.verify_server_final(forged) {
        Err(Error::Authentication { message, .. }) => {
            assert!(message.contains("signature"));
        },
        other => panic!("expected signature mismatch, got {other:?}"),
    }
    Ok(())
}

#[test]
fn server_error_attribute_fails_verification() -> Result<()> {
    let mut session = rfc7677_session();
    session.handle_server_first(RFC7677_SERVER_FIRST)?;
    assert!(session.verify_server_final("e=invalid-proof").is_err());
    Ok(())
}

#[test]
fn server_first_missing_fields_is_rejected() {
    for broken in [
        "s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",                 // no nonce
        "r=rOprNGfwEbeRWgbNEkqOmore,i=4096",                 // no salt
        "r=rOprNGfwEbeRWgbNEkqOmore,s=W22ZaJ0SNY7soEsUEjb6gQ==", // no iterations
    ] {
        let mut session = rfc7677_session();
        assert!(
            session.handle_server_first(broken).is_err(),
            "accepted malformed server-first: {broken}"
        );
    }
}

#[test]
fn sha1_variant_produces_a_proof() -> Result<()> {
    // No public test vector covers MongoDB's md5-digested SCRAM-SHA-1
    // credential, so check the message structure rather than magic bytes.
    let mut session = ScramSession::with_nonce(
        ScramVariant::Sha1,
        "user",
        "pencil",
        "fyko+d2lbbFgONRv9qkxdawL".to_string(),
    );
    assert_eq!(
        session.client_first(),
        "n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL"
    );

    let client_final = session.handle_server_first(
        "r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096",
    )?;
    assert!(client_final
        .starts_with("c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p="));
    Ok(())
}
