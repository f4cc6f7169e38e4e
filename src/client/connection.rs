// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The connection engine: one socket to one `{host, port}`.
//!
//! Sends are serialized by the writer mutex and matched to replies through
//! the [`ReplyRegistry`]; a single receive task appends socket bytes into a
//! growing buffer and drains complete messages out of it after every read.
//! The server is free to answer concurrent requests out of order — replies
//! are matched by `responseTo`, never by arrival order.
//!
//! Recovery is deliberately blunt: `OP_MSG` has no framing sentinel, so
//! when the buffer turns out to hold bytes that can never become a valid
//! message it is discarded wholesale and the affected request is failed.

use std::sync::{
    Arc,
    atomic::{AtomicI32, Ordering},
};

use bson::{Document, doc};
use bytes::BytesMut;
use once_cell::sync::OnceCell;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::Mutex,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cfg::config::{AuthConfig, Config},
    client::{
        common::{MaybeTls, io_with_timeout},
        registry::ReplyRegistry,
        tls::wrap_tls,
    },
    error::{Error, Result},
    models::{
        header::MessageHeader,
        message::{DocumentSequence, MessageBuilder},
        reply::{OpMsgReply, doc_get_i64, read_message},
        validate::{ValidationOutcome, validate},
    },
    scram::ScramVariant,
    state_machine::sasl_states::SaslCtx,
};

/// Limits and versions reported by the server's `hello` reply. They bound
/// all subsequent batching.
#[derive(Debug, Clone, Copy)]
pub struct ServerInfo {
    pub min_wire_version: i32,
    pub max_wire_version: i32,
    pub max_write_batch_size: i64,
    pub max_message_size_bytes: i64,
    pub max_bson_object_size: i64,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            min_wire_version: 0,
            max_wire_version: 0,
            max_write_batch_size: 1000,
            max_message_size_bytes: 32 * 1024 * 1024,
            max_bson_object_size: 16 * 1024 * 1024,
        }
    }
}

/// Represents a single driver connection over a TCP (optionally TLS)
/// stream.
///
/// The socket is owned exclusively by this struct; callers on arbitrary
/// tasks may issue requests concurrently and each will be released when the
/// reply carrying its request id arrives.
#[derive(Debug)]
pub struct ClientConnection {
    /// Read half, locked only by the receive task.
    reader: Mutex<ReadHalf<MaybeTls>>,
    /// Write half; locking it serializes the send path.
    writer: Mutex<WriteHalf<MaybeTls>>,
    /// Configuration parameters for this connection.
    pub cfg: Config,
    /// Pending/completed reply bookkeeping.
    registry: ReplyRegistry,
    /// Bytes received but not yet consumed as whole messages.
    recv_buf: Mutex<BytesMut>,
    /// Monotonic request-id counter. Uniqueness only matters against
    /// currently outstanding requests, so wraparound is tolerated.
    request_id: AtomicI32,
    /// Limits recorded from the `hello` handshake.
    server_info: OnceCell<ServerInfo>,
    /// Cancelled when the connection dies; aborts reads and rejects sends.
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Establish a connection: dial within the connect timeout, wrap in TLS
    /// when configured, run the `hello` handshake and, if credentials are
    /// present, the SCRAM conversation.
    pub async fn connect(cfg: Config, cancel: CancellationToken) -> Result<Arc<Self>> {
        let endpoint = cfg.endpoint();
        let stream = timeout(
            cfg.connection.connect_timeout,
            TcpStream::connect((cfg.connection.host.clone(), cfg.connection.port)),
        )
        .await
        .map_err(|_| Error::Connection(format!("connect to {endpoint} timed out")))?
        .map_err(|e| Error::Connection(format!("connect to {endpoint} failed: {e}")))?;
        stream.set_nodelay(true)?;

        let stream = if cfg.tls.enabled {
            let tls = wrap_tls(&cfg.tls, &cfg.connection.host, stream).await?;
            MaybeTls::Tls(Box::new(tls))
        } else {
            MaybeTls::Plain(stream)
        };
        let (r, w) = tokio::io::split(stream);

        let conn = Arc::new(Self {
            reader: Mutex::new(r),
            writer: Mutex::new(w),
            cfg,
            registry: ReplyRegistry::new(),
            recv_buf: Mutex::new(BytesMut::with_capacity(8 * 1024)),
            request_id: AtomicI32::new(1),
            server_info: OnceCell::new(),
            cancel,
        });

        let reader = Arc::clone(&conn);
        tokio::spawn(async move {
            if let Err(e) = Arc::clone(&reader).read_loop().await {
                warn!("read loop exited: {e}");
            }
            reader.registry.fail_all_inflight("connection lost");
            reader.cancel.cancel();
        });

        if let Err(e) = conn.establish().await {
            conn.cancel_now();
            return Err(e);
        }
        Ok(conn)
    }

    /// Handshake plus (when configured) authentication, run once per fresh
    /// socket before the connection is handed out.
    async fn establish(self: &Arc<Self>) -> Result<()> {
        self.handshake().await?;

        let scram = match &self.cfg.auth {
            AuthConfig::None => None,
            AuthConfig::ScramSha1(c) => Some((ScramVariant::Sha1, c)),
            AuthConfig::ScramSha256(c) => Some((ScramVariant::Sha256, c)),
        };
        if let Some((mechanism, creds)) = scram {
            let mut ctx = SaslCtx::new(Arc::clone(self), mechanism, creds);
            ctx.execute().await.map_err(|e| match e {
                auth @ Error::Authentication { .. } => auth,
                other => Error::Authentication {
                    code: 0,
                    message: other.to_string(),
                },
            })?;
            info!("authenticated as '{}'", creds.username);
        }
        Ok(())
    }

    #[inline]
    pub fn cancel_now(&self) {
        self.cancel.cancel();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next request id; unique among outstanding requests.
    pub fn next_request_id(&self) -> i32 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Limits from the handshake, defaults if `hello` omitted a field.
    pub fn server_info(&self) -> ServerInfo {
        self.server_info.get().copied().unwrap_or_default()
    }

    /// Registry accessor for tests asserting terminal-state cleanup.
    pub fn registry(&self) -> &ReplyRegistry {
        &self.registry
    }

    /// Send a framed message and wait for the reply matching `request_id`.
    pub async fn send_and_await(&self, bytes: &[u8], request_id: i32) -> Result<OpMsgReply> {
        self.registry.register(request_id);
        if let Err(e) = self.write_frame(bytes).await {
            self.registry.drop_request(request_id);
            return Err(e);
        }

        match self
            .registry
            .wait(request_id, self.cfg.connection.reply_timeout)
            .await
        {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.discard_garbage().await;
                Err(e)
            },
        }
    }

    /// Send a message for which no reply will arrive (`moreToCome` set by
    /// the caller while framing).
    pub async fn send_fire_and_forget(&self, bytes: &[u8]) -> Result<()> {
        self.write_frame(bytes).await
    }

    /// Frame `body` as an `OP_MSG` and await the reply.
    pub async fn run_command(&self, body: Document) -> Result<OpMsgReply> {
        let request_id = self.next_request_id();
        let bytes = MessageBuilder::new(request_id).body(body).build()?;
        self.send_and_await(&bytes, request_id).await
    }

    /// Same as [`Self::run_command`] but with one type-1 document sequence
    /// alongside the body (the insert path).
    pub async fn run_command_with_sequence(
        &self,
        body: Document,
        sequence: DocumentSequence,
    ) -> Result<OpMsgReply> {
        let request_id = self.next_request_id();
        let bytes = MessageBuilder::new(request_id)
            .body(body)
            .sequence(sequence.identifier, sequence.documents)
            .build()?;
        self.send_and_await(&bytes, request_id).await
    }

    /// Frame `body` with `moreToCome` and send it without waiting.
    pub async fn run_command_no_reply(&self, body: Document) -> Result<()> {
        let bytes = MessageBuilder::new(self.next_request_id())
            .body(body)
            .more_to_come()
            .build()?;
        self.send_fire_and_forget(&bytes).await
    }

    async fn write_frame(&self, bytes: &[u8]) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Connection("connection is closed".into()));
        }

        let mut w = self.writer.lock().await;
        debug!(len = bytes.len(), "SEND message");
        io_with_timeout(
            "write message (write_all)",
            w.write_all(bytes),
            self.cfg.connection.connect_timeout,
            &self.cancel,
        )
        .await?;
        io_with_timeout(
            "write message (flush)",
            w.flush(),
            self.cfg.connection.connect_timeout,
            &self.cancel,
        )
        .await
    }

    async fn read_loop(self: Arc<Self>) -> Result<()> {
        let mut chunk = [0u8; 8 * 1024];
        loop {
            let n = {
                let mut r = self.reader.lock().await;
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(Error::Connection("cancelled".into()));
                    },
                    res = r.read(&mut chunk) => res?,
                }
            };
            if n == 0 {
                return Err(Error::Connection("server closed the connection".into()));
            }

            let mut buf = self.recv_buf.lock().await;
            buf.extend_from_slice(&chunk[..n]);
            self.drain_buffer(&mut buf);
        }
    }

    /// Consume every complete message at the front of the buffer, then act
    /// on whatever validation says about the remainder.
    fn drain_buffer(&self, buf: &mut BytesMut) {
        loop {
            match validate(&buf[..]) {
                ValidationOutcome::Ok(len) => {
                    match read_message(&buf[..len]) {
                        Ok(reply) => {
                            debug!(
                                response_to = reply.response_to(),
                                len, "RECV message"
                            );
                            self.registry.publish(reply.response_to(), reply);
                        },
                        Err(e) => {
                            warn!("validated message failed to decode: {e}");
                            if let Some(header) = MessageHeader::read_from(&buf[..]) {
                                self.registry.fail(
                                    header.response_to.get(),
                                    "reply failed to decode",
                                );
                            }
                            buf.clear();
                            return;
                        },
                    }
                    let _ = buf.split_to(len);
                },
                ValidationOutcome::Growing => {
                    if let Some(header) = MessageHeader::read_from(&buf[..]) {
                        self.registry.mark_partial(header.response_to.get());
                    }
                    return;
                },
                ValidationOutcome::NoHeader => return,
                ValidationOutcome::OpcodeInvalid => {
                    warn!("discarding buffer: peer sent a non-OP_MSG opcode");
                    buf.clear();
                    return;
                },
                outcome @ (ValidationOutcome::DataError
                | ValidationOutcome::ChecksumInvalid) => {
                    warn!("discarding buffer: {outcome:?}");
                    if let Some(header) = MessageHeader::read_from(&buf[..]) {
                        self.registry
                            .fail(header.response_to.get(), "reply failed wire validation");
                    }
                    buf.clear();
                    return;
                },
            }
        }
    }

    /// Recovery after a timed-out wait: bytes that can never grow into a
    /// valid message are dropped so the next reply starts clean.
    async fn discard_garbage(&self) {
        let mut buf = self.recv_buf.lock().await;
        if buf.is_empty() {
            return;
        }
        match validate(&buf[..]) {
            ValidationOutcome::Ok(_) | ValidationOutcome::Growing => {},
            outcome => {
                warn!(len = buf.len(), "discarding stale buffer after timeout: {outcome:?}");
                buf.clear();
            },
        }
    }

    /// `hello` handshake; records the limits that bound batching.
    async fn handshake(&self) -> Result<()> {
        let reply = self
            .run_command(doc! { "hello": 1i32, "$db": "admin" })
            .await?;
        if !reply.command_ok() {
            return Err(Error::Connection(format!(
                "hello rejected by server: {}",
                reply.error_message().unwrap_or("no errmsg")
            )));
        }

        let body = &reply.body;
        let defaults = ServerInfo::default();
        let info = ServerInfo {
            min_wire_version: doc_get_i64(body, "minWireVersion").unwrap_or(0) as i32,
            max_wire_version: doc_get_i64(body, "maxWireVersion").unwrap_or(0) as i32,
            max_write_batch_size: doc_get_i64(body, "maxWriteBatchSize")
                .unwrap_or(defaults.max_write_batch_size),
            max_message_size_bytes: doc_get_i64(body, "maxMessageSizeBytes")
                .unwrap_or(defaults.max_message_size_bytes),
            max_bson_object_size: doc_get_i64(body, "maxBsonObjectSize")
                .unwrap_or(defaults.max_bson_object_size),
        };
        debug!(
            min_wire = info.min_wire_version,
            max_wire = info.max_wire_version,
            batch = info.max_write_batch_size,
            "handshake complete"
        );
        let _ = self.server_info.set(info);
        Ok(())
    }
}
