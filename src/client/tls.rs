// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, io::BufReader, sync::Arc};

use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};
use tracing::debug;

use crate::{
    cfg::config::TlsConfig,
    error::{Error, Result},
};

/// Build a TLS connector from the configured PEM material.
pub fn build_tls_connector(cfg: &TlsConfig) -> Result<TlsConnector> {
    let mut root_store = RootCertStore::empty();

    if let Some(ca_file) = &cfg.ca_file {
        let ca_data = fs::read(ca_file)
            .map_err(|e| Error::Connection(format!("failed to read CA file: {e}")))?;
        let mut reader = BufReader::new(&ca_data[..]);
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert
                .map_err(|e| Error::Connection(format!("failed to parse CA file: {e}")))?;
            root_store
                .add(cert)
                .map_err(|e| Error::Connection(format!("failed to add CA cert: {e}")))?;
        }
    } else {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    let builder = ClientConfig::builder().with_root_certificates(root_store);

    let client_config = match (&cfg.cert_file, &cfg.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let cert_data = fs::read(cert_file).map_err(|e| {
                Error::Connection(format!("failed to read client cert: {e}"))
            })?;
            let mut cert_reader = BufReader::new(&cert_data[..]);
            let cert_chain = rustls_pemfile::certs(&mut cert_reader)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    Error::Connection(format!("failed to parse client cert: {e}"))
                })?;

            let key_data = fs::read(key_file).map_err(|e| {
                Error::Connection(format!("failed to read client key: {e}"))
            })?;
            let mut key_reader = BufReader::new(&key_data[..]);
            let key = rustls_pemfile::private_key(&mut key_reader)
                .map_err(|e| {
                    Error::Connection(format!("failed to parse client key: {e}"))
                })?
                .ok_or_else(|| Error::Connection("no private key found".into()))?;

            builder
                .with_client_auth_cert(cert_chain, key)
                .map_err(|e| Error::Connection(format!("bad client cert/key: {e}")))?
        },
        _ => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(client_config)))
}

/// Wrap an established TCP stream in TLS; SNI is set to `host`.
pub async fn wrap_tls(
    cfg: &TlsConfig,
    host: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>> {
    let connector = build_tls_connector(cfg)?;

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::Connection(format!("invalid server name '{host}'")))?;

    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Connection(format!("TLS handshake failed: {e}")))?;

    debug!("TLS established, SNI={host}");
    Ok(tls_stream)
}
