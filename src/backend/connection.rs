//! Tarantool Connection
//!
//! One TCP stream, many in-flight requests. Every request gets a fresh
//! `sync` id; a background reader routes each response to the waiter
//! registered under that id, and a background writer owns the write half
//! so a frame is never torn by a caller that gives up mid-send.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::auth::auth_body;
use super::config::BackendConfig;
use super::errors::{BackendError, BackendResult};
use super::iproto::{
    decode_header, decode_packet, encode_request, parse_greeting, read_frame, Packet,
    RequestType, DATA, ERROR_FLAG, ERROR_MESSAGE, GREETING_SIZE, INDEX_ID, ITERATOR,
    ITERATOR_EQ, KEY, LIMIT, OFFSET, SPACE_ID, SYNC, TUPLE, VIEW_NAME_INDEX_ID, VINDEX_ID,
    VSPACE_ID,
};
use super::value::WireValue;
use super::{EngineReply, EngineStatus, Tuple, TupleConnection, UpdateOp};

/// Frames queued for the writer before senders wait
const WRITE_QUEUE_DEPTH: usize = 1024;

type Waiter = oneshot::Sender<BackendResult<Packet>>;

/// State shared between callers and the I/O tasks
struct Shared {
    pending: Mutex<HashMap<u64, Waiter>>,
    closed: AtomicBool,
}

impl Shared {
    /// Register a waiter unless the connection is already gone
    fn register(&self, sync: u64, waiter: Waiter) -> BackendResult<()> {
        let mut pending = self.pending.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Disconnected);
        }
        pending.insert(sync, waiter);
        Ok(())
    }

    /// Mark closed and fail everything still waiting
    fn shutdown(&self) {
        let drained: Vec<Waiter> = {
            let mut pending = self.pending.lock();
            self.closed.store(true, Ordering::Release);
            pending.drain().map(|(_, w)| w).collect()
        };
        for waiter in drained {
            let _ = waiter.send(Err(BackendError::Disconnected));
        }
    }
}

/// Removes the pending entry when a caller stops waiting
struct PendingGuard<'a> {
    shared: &'a Shared,
    sync: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.sync);
    }
}

/// Multiplexed IPROTO connection bound to one space and index
pub struct TarantoolConnection {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Vec<u8>>,
    next_sync: AtomicU64,
    space_id: u32,
    index_id: u32,
    server_version: String,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl TarantoolConnection {
    /// Connect, authenticate and resolve the configured space and index.
    ///
    /// The whole handshake is bounded by the connect timeout.
    pub async fn connect(config: &BackendConfig) -> BackendResult<Self> {
        let handshake = timeout(config.connect_timeout(), Handshake::run(config))
            .await
            .map_err(|_| BackendError::Timeout(config.connect_timeout_ms))??;

        let Handshake {
            stream,
            server_version,
            space_id,
            index_id,
            next_sync,
        } = handshake;

        info!(
            address = %config.address,
            version = %server_version,
            space = %config.space,
            space_id,
            index_id,
            "connected to engine"
        );

        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let (outbound, queue) = mpsc::channel(WRITE_QUEUE_DEPTH);

        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&shared)));
        let writer = tokio::spawn(write_loop(write_half, queue, Arc::clone(&shared)));

        Ok(Self {
            shared,
            outbound,
            next_sync: AtomicU64::new(next_sync),
            space_id,
            index_id,
            server_version,
            reader,
            writer,
        })
    }

    pub fn space_id(&self) -> u32 {
        self.space_id
    }

    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    /// Banner line from the greeting
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop the I/O tasks and fail every in-flight request
    pub fn close(&self) {
        self.reader.abort();
        self.writer.abort();
        self.shared.shutdown();
    }

    async fn call(&self, request: RequestType, body: Vec<(u64, WireValue)>) -> BackendResult<Packet> {
        let sync = self.next_sync.fetch_add(1, Ordering::Relaxed);
        let frame = encode_request(request, sync, body)?;

        let (tx, rx) = oneshot::channel();
        self.shared.register(sync, tx)?;
        let _guard = PendingGuard {
            shared: &self.shared,
            sync,
        };

        self.outbound
            .send(frame)
            .await
            .map_err(|_| BackendError::Disconnected)?;

        debug!(sync, request = request.name(), "request sent");
        rx.await.map_err(|_| BackendError::Disconnected)?
    }

    async fn data_request(
        &self,
        request: RequestType,
        body: Vec<(u64, WireValue)>,
    ) -> BackendResult<EngineReply> {
        let packet = self.call(request, body).await?;
        into_reply(packet)
    }

    fn key_body(&self, key: &str) -> Vec<(u64, WireValue)> {
        vec![
            (SPACE_ID, WireValue::UInt(u64::from(self.space_id))),
            (INDEX_ID, WireValue::UInt(u64::from(self.index_id))),
            (KEY, WireValue::Array(vec![WireValue::str(key)])),
        ]
    }
}

impl Drop for TarantoolConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl TupleConnection for TarantoolConnection {
    async fn select(&self, key: &str) -> BackendResult<EngineReply> {
        let body = select_body(
            self.space_id,
            self.index_id,
            vec![WireValue::str(key)],
            1,
        );
        self.data_request(RequestType::Select, body).await
    }

    async fn insert(&self, tuple: Tuple) -> BackendResult<EngineReply> {
        let body = vec![
            (SPACE_ID, WireValue::UInt(u64::from(self.space_id))),
            (TUPLE, WireValue::Array(tuple)),
        ];
        self.data_request(RequestType::Insert, body).await
    }

    async fn update(&self, key: &str, ops: Vec<UpdateOp>) -> BackendResult<EngineReply> {
        let mut body = self.key_body(key);
        body.push((
            TUPLE,
            WireValue::Array(ops.iter().map(UpdateOp::to_wire).collect()),
        ));
        self.data_request(RequestType::Update, body).await
    }

    async fn delete(&self, key: &str) -> BackendResult<EngineReply> {
        let body = self.key_body(key);
        self.data_request(RequestType::Delete, body).await
    }

    async fn ping(&self) -> BackendResult<()> {
        let reply = self.data_request(RequestType::Ping, Vec::new()).await?;
        if reply.status.is_ok() {
            Ok(())
        } else {
            Err(BackendError::protocol(format!(
                "ping failed (code={}): {}",
                reply.status.code, reply.status.message
            )))
        }
    }
}

/// Synchronous request/response exchanges done before the stream is split
struct Handshake {
    stream: TcpStream,
    server_version: String,
    space_id: u32,
    index_id: u32,
    next_sync: u64,
}

impl Handshake {
    async fn run(config: &BackendConfig) -> BackendResult<Self> {
        let mut stream = TcpStream::connect(&config.address).await?;
        stream.set_nodelay(true)?;

        let mut raw = [0u8; GREETING_SIZE];
        stream.read_exact(&mut raw).await?;
        let greeting = parse_greeting(&raw)?;

        let mut handshake = Self {
            stream,
            server_version: greeting.version,
            space_id: 0,
            index_id: 0,
            next_sync: 1,
        };

        if config.requires_auth() {
            let body = auth_body(&config.user, &greeting.salt, &config.password)?;
            let reply = handshake.exchange(RequestType::Auth, body).await?;
            if !reply.status.is_ok() {
                return Err(BackendError::Auth {
                    code: reply.status.code,
                    message: reply.status.message,
                });
            }
            debug!(user = %config.user, "authenticated");
        }

        handshake.space_id = handshake.resolve_space(&config.space).await?;
        handshake.index_id = handshake
            .resolve_index(handshake.space_id, &config.index)
            .await?;

        Ok(handshake)
    }

    async fn exchange(
        &mut self,
        request: RequestType,
        body: Vec<(u64, WireValue)>,
    ) -> BackendResult<EngineReply> {
        let sync = self.next_sync;
        self.next_sync += 1;

        let frame = encode_request(request, sync, body)?;
        self.stream.write_all(&frame).await?;

        let payload = read_frame(&mut self.stream).await?;
        let packet = decode_packet(&payload)?;
        if packet.sync()? != sync {
            return Err(BackendError::protocol("handshake response out of order"));
        }
        into_reply(packet)
    }

    async fn resolve_space(&mut self, name: &str) -> BackendResult<u32> {
        let body = select_body(VSPACE_ID, VIEW_NAME_INDEX_ID, vec![WireValue::str(name)], 1);
        let reply = self.exchange(RequestType::Select, body).await?;
        let id = schema_field(reply, 0)
            .map_err(|e| BackendError::schema(format!("space '{}': {}", name, e)))?;
        Ok(id)
    }

    async fn resolve_index(&mut self, space_id: u32, name: &str) -> BackendResult<u32> {
        let key = vec![WireValue::UInt(u64::from(space_id)), WireValue::str(name)];
        let body = select_body(VINDEX_ID, VIEW_NAME_INDEX_ID, key, 1);
        let reply = self.exchange(RequestType::Select, body).await?;
        let id = schema_field(reply, 1)
            .map_err(|e| BackendError::schema(format!("index '{}': {}", name, e)))?;
        Ok(id)
    }
}

fn select_body(space_id: u32, index_id: u32, key: Vec<WireValue>, limit: u64) -> Vec<(u64, WireValue)> {
    vec![
        (SPACE_ID, WireValue::UInt(u64::from(space_id))),
        (INDEX_ID, WireValue::UInt(u64::from(index_id))),
        (LIMIT, WireValue::UInt(limit)),
        (OFFSET, WireValue::UInt(0)),
        (ITERATOR, WireValue::UInt(ITERATOR_EQ)),
        (KEY, WireValue::Array(key)),
    ]
}

/// Pull a numeric id out of the first tuple of a system view lookup
fn schema_field(reply: EngineReply, position: usize) -> Result<u32, String> {
    if !reply.status.is_ok() {
        return Err(format!(
            "lookup failed (code={}): {}",
            reply.status.code, reply.status.message
        ));
    }
    let tuple = reply
        .tuples
        .first()
        .ok_or_else(|| "does not exist".to_string())?;
    tuple
        .get(position)
        .and_then(WireValue::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| "unexpected system view layout".to_string())
}

/// Turn a response packet into an engine reply
fn into_reply(mut packet: Packet) -> BackendResult<EngineReply> {
    let code = packet.code()?;

    if code == 0 {
        let tuples = match packet.take_body_field(DATA) {
            None => Vec::new(),
            Some(WireValue::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    WireValue::Array(fields) => Ok(fields),
                    other => Err(BackendError::protocol(format!(
                        "data item is a {}, expected tuple",
                        other.type_name()
                    ))),
                })
                .collect::<BackendResult<Vec<Tuple>>>()?,
            Some(other) => {
                return Err(BackendError::protocol(format!(
                    "data is a {}, expected array",
                    other.type_name()
                )))
            }
        };
        return Ok(EngineReply::ok(tuples));
    }

    if code & ERROR_FLAG != 0 {
        let message = packet
            .body_field(ERROR_MESSAGE)
            .and_then(WireValue::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(EngineReply::failed(EngineStatus {
            code: (code & !ERROR_FLAG) as u32,
            message,
        }));
    }

    Err(BackendError::protocol(format!(
        "unexpected response code {:#x}",
        code
    )))
}

fn header_sync(payload: &[u8]) -> Option<u64> {
    let (header, _) = decode_header(payload).ok()?;
    header.get_by_code(SYNC).and_then(WireValue::as_u64)
}

async fn read_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>) {
    loop {
        let payload = match read_frame(&mut reader).await {
            Ok(payload) => payload,
            Err(BackendError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                info!("engine closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "failed to read from engine");
                break;
            }
        };

        let (sync, outcome) = match decode_packet(&payload) {
            Ok(packet) => match packet.sync() {
                Ok(sync) => (sync, Ok(packet)),
                Err(e) => {
                    warn!(error = %e, "dropping response without sync");
                    continue;
                }
            },
            // A readable header still names the waiter; fail it now
            Err(e) => match header_sync(&payload) {
                Some(sync) => {
                    warn!(sync, error = %e, "undecodable response body");
                    (sync, Err(e))
                }
                None => {
                    warn!(error = %e, "dropping undecodable response");
                    continue;
                }
            },
        };

        let waiter = shared.pending.lock().remove(&sync);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(outcome);
            }
            None => debug!(sync, "response for abandoned request"),
        }
    }

    shared.shutdown();
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Vec<u8>>,
    shared: Arc<Shared>,
) {
    while let Some(frame) = queue.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!(error = %e, "failed to write to engine");
            break;
        }
    }

    shared.shutdown();
}
