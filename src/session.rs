//! Database session
//!
//! A [`Session`] is one authenticated, attached connection. Every request and
//! its reply form a round trip taken under the session lock through a
//! [`Wire`] guard. Fetches sent with lazy send are not read immediately:
//! they are queued and drained, in order, at the start of the next round
//! trip, then parked until their statement picks them up.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace, warn};

use crate::blob_cache::{CachedBlob, InlineBlobCache};
use crate::blob::BlobId;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::codec::row::strip_segment_headers;
use crate::codec::{RowCodec, RowDescriptor};
use crate::config::Config;
use crate::constants::Operation;
use crate::error::{Error, Result};
use crate::events::{Listeners, SessionEvent, TransactionEvent};
use crate::handshake::{Handshake, Negotiated};
use crate::messages::{
    attach_dpb, attach_request, bare_request, handle_request, transaction_request, FetchBatch,
    FetchPart, InlineBlob, Response,
};
use crate::statement::{CancelHandle, Statement};
use crate::transaction::{Transaction, TransactionOptions};
use crate::transport::{TcpTransport, Transport, WireChannel};

static SESSION_ID_COUNTER: AtomicU32 = AtomicU32::new(1);

/// A fetch sent without reading its reply
#[derive(Debug)]
struct DeferredFetch {
    statement: i32,
    descriptor: RowDescriptor,
}

/// Session state left behind by dropped owners, purged on the next round trip
#[derive(Debug, Default)]
struct Released {
    fetches: Vec<i32>,
    blob_caches: Vec<i32>,
}

/// Mutable state behind the session lock
#[derive(Debug)]
struct SessionInner {
    channel: Option<WireChannel>,
    deferred: VecDeque<DeferredFetch>,
    parked: HashMap<i32, Result<FetchBatch>>,
    blob_caches: HashMap<i32, InlineBlobCache>,
}

/// Immutable session facts and lock-free flags
#[derive(Debug)]
struct SessionShared {
    id: u32,
    config: Config,
    negotiated: Negotiated,
    db_handle: i32,
    broken: AtomicBool,
    closed: AtomicBool,
    listeners: Listeners<SessionEvent>,
    transaction_listeners: Listeners<TransactionEvent>,
    released: std::sync::Mutex<Released>,
}

impl SessionShared {
    fn released(&self) -> std::sync::MutexGuard<'_, Released> {
        self.released.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// An attached database session
///
/// Cloning is cheap; clones share one connection. Requests are serialized
/// internally.
///
/// # Example
///
/// ```rust,no_run
/// use firebird_rs::{Config, Session, TransactionOptions};
///
/// # async fn example() -> firebird_rs::Result<()> {
/// let config = Config::new("localhost", "employee", "SYSDBA", "masterkey");
/// let session = Session::connect(config).await?;
/// let mut tx = session.start_transaction(TransactionOptions::default()).await?;
/// let mut stmt = session.prepare(&tx, "select 1 from rdb$database").await?;
/// stmt.execute(&tx, None).await?;
/// while let Some(row) = stmt.next_row().await? {
///     println!("{:?}", row.get_i32(0)?);
/// }
/// tx.commit().await?;
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
    shared: Arc<SessionShared>,
}

impl Session {
    /// Connect over TCP, authenticate and attach
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let mut transport = TcpTransport::new();
        transport.connect_with_config(&config).await?;
        Self::connect_with_transport(Box::new(transport), config).await
    }

    /// Authenticate and attach over an already connected transport
    ///
    /// The whole handshake and attach run under the connect timeout. On
    /// failure the transport is closed and no session is returned.
    pub async fn connect_with_transport(transport: Box<dyn Transport>, config: Config) -> Result<Self> {
        config.validate()?;
        let limit = config.connect_timeout;
        let mut channel = WireChannel::new(transport);

        let result = match tokio::time::timeout(limit, establish(&mut channel, &config)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionTimeout(limit)),
        };
        let (negotiated, db_handle) = match result {
            Ok(v) => v,
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    trace!(error = %close_err, "close after failed connect");
                }
                return Err(e);
            }
        };

        let id = SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        debug!(
            session = id,
            protocol = negotiated.protocol_version,
            crypt = ?negotiated.crypt_plugin,
            db_handle,
            "session attached"
        );
        Ok(Self {
            inner: Arc::new(Mutex::new(SessionInner {
                channel: Some(channel),
                deferred: VecDeque::new(),
                parked: HashMap::new(),
                blob_caches: HashMap::new(),
            })),
            shared: Arc::new(SessionShared {
                id,
                config,
                negotiated,
                db_handle,
                broken: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                listeners: Listeners::new(),
                transaction_listeners: Listeners::new(),
                released: std::sync::Mutex::new(Released::default()),
            }),
        })
    }

    /// Session id, unique within the process
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    /// Configuration the session was opened with
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Negotiated protocol version
    pub fn protocol_version(&self) -> u8 {
        self.shared.negotiated.protocol_version
    }

    /// Whether the server accepted lazy send
    pub fn lazy_send(&self) -> bool {
        self.shared.negotiated.lazy_send
    }

    /// Handshake results
    pub fn negotiated(&self) -> &Negotiated {
        &self.shared.negotiated
    }

    /// Database handle
    pub fn db_handle(&self) -> i32 {
        self.shared.db_handle
    }

    /// Whether a fatal error invalidated the session
    pub fn is_broken(&self) -> bool {
        self.shared.broken.load(Ordering::Acquire)
    }

    /// Whether the session was closed or broken
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire) || self.is_broken()
    }

    /// Session event listeners
    pub fn listeners(&self) -> &Listeners<SessionEvent> {
        &self.shared.listeners
    }

    /// Listeners for events of every transaction of this session
    pub fn transaction_listeners(&self) -> &Listeners<TransactionEvent> {
        &self.shared.transaction_listeners
    }

    /// Start a transaction
    pub async fn start_transaction(&self, options: TransactionOptions) -> Result<Transaction> {
        let tpb = options.tpb();
        let mut wire = self.wire(None).await?;
        let response = wire
            .call(transaction_request(self.shared.db_handle, &tpb))
            .await?;
        drop(wire);
        Ok(Transaction::new(self.clone(), response.object))
    }

    /// Allocate and prepare a statement
    pub async fn prepare(&self, transaction: &Transaction, sql: &str) -> Result<Statement> {
        let mut statement = Statement::new(self.clone());
        statement.prepare(transaction, sql).await?;
        Ok(statement)
    }

    /// Check that the server answers
    pub async fn ping(&self) -> Result<()> {
        let mut wire = self.wire(None).await?;
        wire.call(bare_request(Operation::Ping)).await?;
        Ok(())
    }

    /// Detach and disconnect
    ///
    /// Closing an already closed session is a no-op. A broken session only
    /// drops its transport.
    pub async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut inner = self.inner.clone().lock_owned().await;
        let result = match inner.channel.take() {
            Some(mut channel) if !self.is_broken() => {
                let detach = detach(&mut channel, self.shared.db_handle).await;
                let close = channel.close().await;
                detach.and(close)
            }
            Some(mut channel) => channel.close().await,
            None => Ok(()),
        };
        inner.deferred.clear();
        inner.parked.clear();
        inner.blob_caches.clear();
        drop(inner);

        debug!(session = self.shared.id, "session closed");
        self.shared.listeners.emit(&SessionEvent::Closed);
        self.shared.listeners.clear();
        self.shared.transaction_listeners.clear();
        result
    }

    /// Drop the reply of a fetch still in flight for a dropped statement
    pub(crate) fn release_fetch(&self, statement: i32) {
        self.shared.released().fetches.push(statement);
    }

    /// Drop the inline blob cache of a dropped transaction
    pub(crate) fn release_blob_cache(&self, transaction: i32) {
        self.shared.released().blob_caches.push(transaction);
    }

    /// Take the session lock for one round trip
    ///
    /// Deferred fetches are drained first, then state of dropped statements
    /// and transactions is purged. A pending cancel request is
    /// consumed here and turned into [`Error::Cancelled`].
    pub(crate) async fn wire(&self, cancel: Option<&CancelHandle>) -> Result<Wire> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let guard = self.inner.clone().lock_owned().await;
        let mut wire = Wire {
            inner: guard,
            shared: self.shared.clone(),
        };
        wire.drain_deferred().await?;
        wire.purge_released();
        if let Some(cancel) = cancel {
            if cancel.take() {
                debug!(session = self.shared.id, "request cancelled before send");
                return Err(Error::Cancelled);
            }
        }
        Ok(wire)
    }

    /// Run `fut` under an optional client-side timeout
    ///
    /// Expiry breaks the session: the reply may still be in flight.
    pub(crate) async fn with_timeout<T, F>(&self, limit: Option<Duration>, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(limit) = limit else {
            return fut.await;
        };
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(session = self.shared.id, ?limit, "statement timeout expired");
                let mut inner = self.inner.clone().lock_owned().await;
                mark_broken(&self.shared, &mut inner);
                Err(Error::Timeout(limit))
            }
        }
    }
}

async fn establish(channel: &mut WireChannel, config: &Config) -> Result<(Negotiated, i32)> {
    let negotiated = Handshake::new(config).run(channel).await?;

    let password = negotiated.needs_dpb_password().then(|| config.password());
    let dpb = attach_dpb(config, &negotiated.login, password)?;
    channel.send(attach_request(&config.database, &dpb)).await?;
    let response = channel.receive(Response::decode).await?;
    if response.is_error() {
        return Err(Error::Attach(response.status));
    }
    Ok((negotiated, response.object))
}

async fn detach(channel: &mut WireChannel, db_handle: i32) -> Result<()> {
    channel.send(handle_request(Operation::Detach, db_handle)).await?;
    channel.receive(Response::decode).await?.into_result()?;
    channel.send(bare_request(Operation::Disconnect)).await
}

fn mark_broken(shared: &SessionShared, inner: &mut SessionInner) {
    if shared.broken.swap(true, Ordering::AcqRel) {
        return;
    }
    // Dropping the channel drops the transport
    inner.channel = None;
    inner.deferred.clear();
    inner.parked.clear();
    inner.blob_caches.clear();
    debug!(session = shared.id, "session broken");
    shared.listeners.emit(&SessionEvent::Closed);
}

/// Exclusive access to the connection for one round trip
#[derive(Debug)]
pub(crate) struct Wire {
    inner: OwnedMutexGuard<SessionInner>,
    shared: Arc<SessionShared>,
}

impl Wire {
    fn fail(&mut self, err: Error) -> Error {
        if err.is_fatal_to_session() {
            mark_broken(&self.shared, &mut self.inner);
        }
        err
    }

    fn channel(&mut self) -> Result<&mut WireChannel> {
        self.inner.channel.as_mut().ok_or(Error::ConnectionClosed)
    }

    /// Row codec for the negotiated protocol
    pub(crate) fn codec(&self) -> RowCodec {
        RowCodec::new(self.shared.negotiated.protocol_version)
    }

    /// Send one request
    pub(crate) async fn send(&mut self, request: WriteBuffer) -> Result<()> {
        let result = match self.channel() {
            Ok(channel) => channel.send(request).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Receive one reply with `decode`
    pub(crate) async fn receive<T, F>(&mut self, decode: F) -> Result<T>
    where
        F: FnMut(&mut ReadBuffer) -> Result<T>,
    {
        let result = match self.channel() {
            Ok(channel) => channel.receive(decode).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Receive `op_response`; server errors become [`Error::Server`]
    ///
    /// Warnings are published to the session listeners and left on the
    /// returned response.
    pub(crate) async fn response(&mut self) -> Result<Response> {
        let response = self.receive(Response::decode).await?;
        if let Some(warning) = response.warning() {
            self.shared
                .listeners
                .emit(&SessionEvent::Warning(warning.clone()));
        }
        response.into_result()
    }

    /// Send a request and receive its `op_response`
    pub(crate) async fn call(&mut self, request: WriteBuffer) -> Result<Response> {
        self.send(request).await?;
        self.response().await
    }

    // =========================================================================
    // Deferred fetches
    // =========================================================================

    /// Record a fetch whose reply will be read later
    pub(crate) fn defer_fetch(&mut self, statement: i32, descriptor: RowDescriptor) {
        trace!(statement, "fetch deferred");
        self.inner.deferred.push_back(DeferredFetch {
            statement,
            descriptor,
        });
    }

    /// Whether `statement` has a fetch in flight or parked
    pub(crate) fn has_pending_fetch(&self, statement: i32) -> bool {
        self.inner.parked.contains_key(&statement)
            || self.inner.deferred.iter().any(|d| d.statement == statement)
    }

    /// Take the drained reply of a deferred fetch
    pub(crate) fn take_parked(&mut self, statement: i32) -> Option<Result<FetchBatch>> {
        self.inner.parked.remove(&statement)
    }

    /// Drop parked replies of a released statement
    pub(crate) fn forget_statement(&mut self, statement: i32) {
        self.inner.parked.remove(&statement);
    }

    /// Receive a fetch reply one message at a time
    ///
    /// Inline blobs are filed in their transactions' caches.
    pub(crate) async fn receive_batch(&mut self, descriptor: &RowDescriptor) -> Result<FetchBatch> {
        let codec = self.codec();
        let mut batch = FetchBatch::default();
        loop {
            let part = self
                .receive(|buf| FetchPart::decode(buf, descriptor, codec))
                .await?;
            if batch.push(part) {
                break;
            }
        }
        self.store_inline_blobs(&batch.inline_blobs);
        Ok(batch)
    }

    async fn drain_deferred(&mut self) -> Result<()> {
        while let Some(fetch) = self.inner.deferred.pop_front() {
            let batch = self.receive_batch(&fetch.descriptor).await?;
            trace!(
                statement = fetch.statement,
                rows = batch.rows.len(),
                "deferred fetch drained"
            );
            self.inner.parked.insert(fetch.statement, batch.into_result());
        }
        Ok(())
    }

    /// Forget parked replies and blob caches whose owners were dropped
    ///
    /// Runs after the drain, so every released fetch is parked by now.
    fn purge_released(&mut self) {
        let released = std::mem::take(&mut *self.shared.released());
        for statement in released.fetches {
            if self.inner.parked.remove(&statement).is_some() {
                trace!(statement, "reply of dropped statement discarded");
            }
        }
        for transaction in released.blob_caches {
            self.discard_blob_cache(transaction);
        }
    }

    // =========================================================================
    // Inline blobs
    // =========================================================================

    /// File inline blobs in their transactions' caches
    pub(crate) fn store_inline_blobs(&mut self, blobs: &[InlineBlob]) {
        let max_blob_size = self.shared.config.max_inline_blob_size as usize;
        let budget = self.shared.config.blob_cache_size;
        for blob in blobs {
            let data = match strip_segment_headers(&blob.data) {
                Ok(data) => data,
                Err(e) => {
                    warn!(blob_id = blob.blob_id.0, error = %e, "malformed inline blob dropped");
                    continue;
                }
            };
            self.inner
                .blob_caches
                .entry(blob.transaction)
                .or_insert_with(|| InlineBlobCache::new(max_blob_size, budget))
                .insert(
                    blob.blob_id,
                    CachedBlob {
                        info: blob.info.clone(),
                        data,
                    },
                );
        }
    }

    /// Remove and return a cached blob
    pub(crate) fn take_cached_blob(&mut self, transaction: i32, id: BlobId) -> Option<CachedBlob> {
        self.inner
            .blob_caches
            .get_mut(&transaction)
            .and_then(|cache| cache.take(id))
    }

    /// Copy of a cached blob, leaving it cached
    pub(crate) fn cached_blob(&self, transaction: i32, id: BlobId) -> Option<CachedBlob> {
        self.inner
            .blob_caches
            .get(&transaction)
            .and_then(|cache| cache.get(id))
            .cloned()
    }

    /// Drop every cached blob of a transaction
    pub(crate) fn discard_blob_cache(&mut self, transaction: i32) {
        if let Some(cache) = self.inner.blob_caches.remove(&transaction) {
            trace!(transaction, entries = cache.len(), "inline blob cache discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::isc_arg;
    use crate::transport::StreamTransport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn response(object: i32) -> WriteBuffer {
        let mut out = WriteBuffer::new();
        out.write_u32(Operation::Response as u32);
        out.write_i32(object);
        out.write_quad(0);
        out.write_buffer(&[]);
        out.write_u32(isc_arg::END);
        out
    }

    fn accept_v13() -> WriteBuffer {
        let mut out = WriteBuffer::new();
        out.write_u32(Operation::Accept as u32);
        out.write_u32(crate::constants::protocol::FB_PROTOCOL_FLAG | 13);
        out.write_u32(1);
        out.write_u32(crate::constants::protocol::PTYPE_LAZY_SEND);
        out
    }

    async fn attached() -> (Session, tokio::io::DuplexStream) {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let config = Config::new("localhost", "employee", "sysdba", "masterkey")
            .wire_crypt(crate::config::WireCrypt::Disabled);
        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let _ = server.read(&mut buf).await.unwrap();
            server.write_all(accept_v13().as_slice()).await.unwrap();
            let _ = server.read(&mut buf).await.unwrap();
            server.write_all(response(7).as_slice()).await.unwrap();
            server
        });
        let session = Session::connect_with_transport(Box::new(StreamTransport::new(client)), config)
            .await
            .unwrap();
        (session, server_task.await.unwrap())
    }

    #[tokio::test]
    async fn test_attach_sets_handle() {
        let (session, _server) = attached().await;
        assert_eq!(session.db_handle(), 7);
        assert_eq!(session.protocol_version(), 13);
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_cancel_consumed_before_send() {
        let (session, _server) = attached().await;
        let cancel = CancelHandle::new();
        cancel.cancel();
        assert!(matches!(session.wire(Some(&cancel)).await, Err(Error::Cancelled)));
        assert!(!cancel.is_cancelled());
        assert!(session.wire(Some(&cancel)).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_peer_breaks_session() {
        let (session, server) = attached().await;
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        session.listeners().subscribe(move |e| {
            if *e == SessionEvent::Closed {
                flag.store(true, Ordering::SeqCst);
            }
        });
        drop(server);
        let err = session.ping().await.unwrap_err();
        assert!(err.is_fatal_to_session());
        assert!(session.is_broken());
        assert!(closed.load(Ordering::SeqCst));
        assert!(matches!(session.ping().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_timeout_breaks_session() {
        let (session, _server) = attached().await;
        let err = session
            .with_timeout(Some(Duration::from_millis(20)), async {
                let mut wire = session.wire(None).await?;
                wire.call(bare_request(Operation::Ping)).await
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(session.is_broken());
    }
}
