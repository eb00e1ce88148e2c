//! Statements and their cursors
//!
//! A [`Statement`] moves through
//!
//! ```text
//! New -> Allocated -> Preparing -> Prepared -> Executing -> Prepared | CursorOpen
//! ```
//!
//! with `Error` after a failed operation (left only by a new prepare) and
//! `Freed` once released. Rows of an open cursor are buffered in a
//! [`FetchState`]; forward cursors prefetch the next batch asynchronously
//! when the server supports lazy send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::codec::blr::message_blr;
use crate::codec::{RowDescriptor, RowValue};
use crate::config::CursorStrategy;
use crate::constants::{
    cursor_flags, free_option, info, info_sql, protocol, Operation, StatementType,
};
use crate::cursor::{CachedRows, FetchPosition, FetchState};
use crate::error::{Error, ErrorKind, Result};
use crate::events::{Listeners, StatementEvent, StatementState};
use crate::messages::{
    free_statement_request, handle_request, info_sql_request, prepare_items, read_operation,
    set_cursor_request, DescribeParser, ExecuteMessage, FetchBatch, FetchMessage, PrepareMessage,
    RecordCounts, Response, SqlResponse, DESCRIBE_BUFFER_LENGTH,
};
use crate::session::{Session, Wire};
use crate::transaction::Transaction;

/// Server buffer size for `isc_info_sql_records`
const RECORDS_BUFFER_LENGTH: u32 = 64;

/// Cancels the next request of a statement before it is sent
///
/// Cloneable and usable from any task. The flag is consumed by the request it
/// cancels.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// New, unset handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether a cancellation is pending
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Consume a pending cancellation
    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

/// Fetch settings of one statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Rows requested per fetch
    pub fetch_size: u32,
    /// Requested cursor strategy
    pub strategy: CursorStrategy,
}

/// Result of [`Statement::execute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// A cursor is open; read it with `next_row` or `fetch`
    CursorOpen,
    /// A singleton row was returned and is buffered for `next_row`
    Singleton,
    /// Executed without a result set
    Completed,
}

/// A prepared statement
#[derive(Debug)]
pub struct Statement {
    session: Session,
    handle: Option<i32>,
    state: StatementState,
    statement_type: Option<StatementType>,
    input: RowDescriptor,
    output: RowDescriptor,
    input_blr: Vec<u8>,
    output_blr: Vec<u8>,
    cursor_name: Option<String>,
    cursor_name_sent: bool,
    fetch_config: FetchConfig,
    cursor_strategy: CursorStrategy,
    fetch: FetchState,
    cached: Option<CachedRows>,
    cancel: CancelHandle,
    timeout: Option<Duration>,
    async_fetch: bool,
    last_error_code: Option<u32>,
    prefetch_error: Option<Error>,
    listeners: Listeners<StatementEvent>,
}

impl Statement {
    pub(crate) fn new(session: Session) -> Self {
        let config = session.config();
        let fetch_config = FetchConfig {
            fetch_size: config.fetch_size.max(1),
            strategy: config.cursor_strategy,
        };
        let timeout = config.statement_timeout;
        let async_fetch = config.async_fetch;
        Self {
            session,
            handle: None,
            state: StatementState::New,
            statement_type: None,
            input: RowDescriptor::empty(),
            output: RowDescriptor::empty(),
            input_blr: Vec::new(),
            output_blr: Vec::new(),
            cursor_name: None,
            cursor_name_sent: false,
            fetch_config,
            cursor_strategy: fetch_config.strategy,
            fetch: FetchState::new(),
            cached: None,
            cancel: CancelHandle::new(),
            timeout,
            async_fetch,
            last_error_code: None,
            prefetch_error: None,
            listeners: Listeners::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current state
    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Server handle, once allocated
    pub fn handle(&self) -> Option<i32> {
        self.handle
    }

    /// Statement type reported by prepare
    pub fn statement_type(&self) -> Option<StatementType> {
        self.statement_type
    }

    /// Parameter descriptor
    pub fn input_descriptor(&self) -> &RowDescriptor {
        &self.input
    }

    /// Result descriptor
    pub fn output_descriptor(&self) -> &RowDescriptor {
        &self.output
    }

    /// Statement event listeners
    pub fn listeners(&self) -> &Listeners<StatementEvent> {
        &self.listeners
    }

    /// Handle to cancel this statement's next request from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Gds code of the last server error
    pub fn last_error_code(&self) -> Option<u32> {
        self.last_error_code
    }

    /// Fetch settings
    pub fn fetch_config(&self) -> FetchConfig {
        self.fetch_config
    }

    /// Strategy of the open cursor (after any fallback)
    pub fn cursor_strategy(&self) -> CursorStrategy {
        self.cursor_strategy
    }

    /// Row buffer of the open cursor
    pub fn fetch_state(&self) -> &FetchState {
        &self.fetch
    }

    /// Set the rows requested per fetch
    pub fn set_fetch_size(&mut self, fetch_size: u32) {
        self.fetch_config.fetch_size = fetch_size.max(1);
    }

    /// Set the strategy for cursors opened by later executions
    pub fn set_cursor_strategy(&mut self, strategy: CursorStrategy) {
        self.fetch_config.strategy = strategy;
    }

    /// Cursor name used by positioned updates and deletes
    pub fn cursor_name(&self) -> Option<&str> {
        self.cursor_name.as_deref()
    }

    /// Name the cursor for `WHERE CURRENT OF`
    ///
    /// Sent right away once the statement is allocated, otherwise before the
    /// next execute. Named cursors are never prefetched.
    pub async fn set_cursor_name(&mut self, name: impl Into<String>) -> Result<()> {
        if self.state == StatementState::Freed {
            return Err(Error::invalid_state("statement is freed"));
        }
        self.cursor_name = Some(name.into());
        self.cursor_name_sent = false;
        if self.handle.is_none() {
            return Ok(());
        }
        let wire = self.session.wire(Some(&self.cancel)).await;
        let result = match wire {
            Ok(mut wire) => self.send_cursor_name(&mut wire).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Send a cursor name the server has not seen yet
    async fn send_cursor_name(&mut self, wire: &mut Wire) -> Result<()> {
        if self.cursor_name_sent {
            return Ok(());
        }
        let (Some(handle), Some(name)) = (self.handle, self.cursor_name.as_deref()) else {
            return Ok(());
        };
        let request = set_cursor_request(handle, name, 0);
        let response = wire.call(request).await?;
        self.note_warning(&response);
        self.cursor_name_sent = true;
        trace!(statement = handle, cursor = ?self.cursor_name, "cursor named");
        Ok(())
    }

    /// Set or clear the statement timeout
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Enable or disable asynchronous prefetch for this statement
    pub fn set_async_fetch(&mut self, enabled: bool) {
        self.async_fetch = enabled;
    }

    // =========================================================================
    // State and events
    // =========================================================================

    fn set_state(&mut self, to: StatementState) {
        let from = self.state;
        if from == to {
            return;
        }
        trace!(statement = ?self.handle, ?from, ?to, "statement state");
        self.state = to;
        self.listeners
            .emit(&StatementEvent::StateChanged { from, to });
    }

    /// Record a failed wire operation
    fn fail(&mut self, err: Error) -> Error {
        if err.kind() != ErrorKind::Cancellation && self.state != StatementState::Freed {
            if let Some(code) = err.gds_code() {
                self.last_error_code = Some(code);
            }
            debug!(statement = ?self.handle, error = %err, "statement failed");
            self.set_state(StatementState::Error);
        }
        err
    }

    fn note_warning(&self, response: &Response) {
        if let Some(warning) = response.warning() {
            self.listeners
                .emit(&StatementEvent::Warning(warning.clone()));
        }
    }

    fn require_handle(&self) -> Result<i32> {
        self.handle
            .ok_or_else(|| Error::invalid_state("statement is not allocated"))
    }

    fn require_open_cursor(&self) -> Result<i32> {
        if self.state != StatementState::CursorOpen {
            return Err(Error::invalid_state(format!(
                "no open cursor (state {:?})",
                self.state
            )));
        }
        self.require_handle()
    }

    fn timeout_ms(&self) -> u32 {
        self.timeout
            .map(|t| t.as_millis().min(u128::from(u32::MAX)) as u32)
            .unwrap_or(0)
    }

    // =========================================================================
    // Prepare
    // =========================================================================

    /// Prepare `sql`, allocating a handle first if needed
    ///
    /// Re-preparing closes an open cursor. This is the only way out of the
    /// `Error` state.
    pub async fn prepare(&mut self, transaction: &Transaction, sql: &str) -> Result<()> {
        transaction.ensure_active()?;
        if self.state == StatementState::Freed {
            return Err(Error::invalid_state("statement is freed"));
        }
        if self.state == StatementState::CursorOpen {
            self.close_cursor().await?;
        }
        let session = self.session.clone();
        let limit = self.timeout;
        match session
            .with_timeout(limit, self.prepare_inner(transaction.handle(), sql))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn prepare_inner(&mut self, transaction: i32, sql: &str) -> Result<()> {
        let mut wire = self.session.wire(Some(&self.cancel)).await?;
        let handle = match self.handle {
            Some(handle) => handle,
            None => {
                let response = wire
                    .call(handle_request(
                        Operation::AllocateStatement,
                        self.session.db_handle(),
                    ))
                    .await?;
                self.handle = Some(response.object);
                self.set_state(StatementState::Allocated);
                response.object
            }
        };

        self.set_state(StatementState::Preparing);
        let items = prepare_items();
        let response = wire
            .call(
                PrepareMessage {
                    transaction,
                    statement: handle,
                    dialect: self.session.config().dialect,
                    sql,
                    items: &items,
                    buffer_length: DESCRIBE_BUFFER_LENGTH,
                }
                .build_request(),
            )
            .await?;
        self.note_warning(&response);

        let mut parser = DescribeParser::new();
        let mut continuation = parser.feed(&response.data)?;
        while let Some(items) = continuation {
            trace!(statement = handle, "describe truncated, continuing");
            let response = wire
                .call(info_sql_request(handle, &items, DESCRIBE_BUFFER_LENGTH))
                .await?;
            continuation = parser.feed(&response.data)?;
        }
        drop(wire);

        let description = parser.finish()?;
        self.statement_type = description.statement_type;
        self.output = RowDescriptor::new(description.output);
        self.input = RowDescriptor::new(description.input);
        self.output_blr = message_blr(&self.output)?;
        self.input_blr = message_blr(&self.input)?;
        self.fetch.reset();
        self.cached = None;
        debug!(
            statement = handle,
            statement_type = ?self.statement_type,
            columns = self.output.len(),
            parameters = self.input.len(),
            "statement prepared"
        );
        self.set_state(StatementState::Prepared);
        Ok(())
    }

    // =========================================================================
    // Execute
    // =========================================================================

    /// Execute with optional parameters
    ///
    /// Queries open a cursor; procedures with outputs return a singleton row
    /// buffered for [`Statement::next_row`].
    pub async fn execute(&mut self, transaction: &Transaction, params: Option<RowValue>) -> Result<ExecuteOutcome> {
        transaction.ensure_active()?;
        match self.state {
            StatementState::Prepared => {}
            StatementState::CursorOpen => self.close_cursor().await?,
            other => {
                return Err(Error::invalid_state(format!(
                    "cannot execute in state {:?}",
                    other
                )))
            }
        }
        let params_len = params.as_ref().map_or(0, RowValue::len);
        if params_len != self.input.len() {
            return Err(Error::invalid_state(format!(
                "statement takes {} parameters, {} given",
                self.input.len(),
                params_len
            )));
        }

        let session = self.session.clone();
        let limit = self.timeout;
        match session
            .with_timeout(limit, self.execute_inner(transaction.handle(), params))
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn effective_strategy(&self) -> CursorStrategy {
        let requested = self.fetch_config.strategy;
        if requested == CursorStrategy::ServerScrollable
            && self.session.protocol_version() < protocol::FETCH_SCROLL_VERSION
        {
            warn!(
                protocol = self.session.protocol_version(),
                "server scrollable cursors need protocol 18, using client-cached cursor"
            );
            return CursorStrategy::ClientCached;
        }
        requested
    }

    async fn execute_inner(&mut self, transaction: i32, params: Option<RowValue>) -> Result<ExecuteOutcome> {
        let handle = self.require_handle()?;
        let statement_type = self.statement_type;
        let opens_cursor = statement_type.is_some_and(StatementType::opens_cursor);
        let singleton = !opens_cursor && !self.output.is_empty();
        let strategy = if opens_cursor {
            self.effective_strategy()
        } else {
            CursorStrategy::ForwardOnly
        };
        let flags = if strategy == CursorStrategy::ServerScrollable {
            cursor_flags::SCROLLABLE
        } else {
            cursor_flags::NONE
        };

        let message = ExecuteMessage {
            statement: handle,
            transaction,
            input_blr: &self.input_blr,
            input: params.as_ref().map(|row| (&self.input, row)),
            output_blr: singleton.then_some(self.output_blr.as_slice()),
            timeout_ms: self.timeout_ms(),
            cursor_flags: flags,
            max_inline_blob_size: self.session.config().max_inline_blob_size,
        };
        let request = message.build_request(self.session.protocol_version())?;

        let mut wire = self.session.wire(Some(&self.cancel)).await?;
        self.send_cursor_name(&mut wire).await?;
        self.set_state(StatementState::Executing);
        wire.send(request).await?;

        let mut singleton_row = None;
        if singleton {
            let codec = wire.codec();
            let output = &self.output;
            let reply = wire
                .receive(|buf| {
                    // A failed execute answers with op_response alone
                    let mut peek = buf.clone();
                    match read_operation(&mut peek)? {
                        Operation::Response => Ok(None),
                        _ => SqlResponse::decode(buf, output, codec).map(Some),
                    }
                })
                .await?;
            if let Some(reply) = reply {
                wire.store_inline_blobs(&reply.inline_blobs);
                singleton_row = reply.row;
            }
        }
        let response = wire.response().await?;
        drop(wire);
        self.note_warning(&response);

        self.fetch.reset();
        self.cached = None;
        self.prefetch_error = None;
        if opens_cursor {
            self.cursor_strategy = strategy;
            debug!(statement = handle, ?strategy, "cursor opened");
            self.set_state(StatementState::CursorOpen);
            return Ok(ExecuteOutcome::CursorOpen);
        }

        self.set_state(StatementState::Prepared);
        match singleton_row {
            Some(row) => {
                self.fetch.push_singleton(row);
                Ok(ExecuteOutcome::Singleton)
            }
            None => Ok(ExecuteOutcome::Completed),
        }
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Fetch up to `requested` rows into the buffer
    ///
    /// Waits for one batch (or completes a pending asynchronous fetch) and
    /// returns the number of rows added. After the end of the cursor it
    /// returns 0 without contacting the server.
    pub async fn fetch(&mut self, requested: u32) -> Result<usize> {
        self.require_open_cursor()?;
        match self.cursor_strategy {
            CursorStrategy::ClientCached => {
                if self.cached.is_some() {
                    return Ok(0);
                }
                self.materialize().await?;
                Ok(self.cached.as_ref().map_or(0, CachedRows::len))
            }
            _ => self.fetch_batch(requested).await,
        }
    }

    async fn fetch_batch(&mut self, requested: u32) -> Result<usize> {
        if self.fetch.is_end_of_cursor() {
            return Ok(0);
        }
        let session = self.session.clone();
        let limit = self.timeout;
        match session
            .with_timeout(limit, self.fetch_inner(requested))
            .await
        {
            Ok(batch) => Ok(self.absorb(batch)),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn fetch_inner(&mut self, requested: u32) -> Result<FetchBatch> {
        let handle = self.require_handle()?;
        let mut wire = self.session.wire(Some(&self.cancel)).await?;
        if self.fetch.is_async_pending() {
            self.fetch.set_async_pending(false);
            trace!(statement = handle, "completing deferred fetch");
            return wire
                .take_parked(handle)
                .unwrap_or_else(|| Err(Error::protocol("deferred fetch reply missing")));
        }

        wire.send(FetchMessage::new(handle, &self.output_blr, requested.max(1)).build_request())
            .await?;
        wire.receive_batch(&self.output).await?.into_result()
    }

    fn absorb(&mut self, batch: FetchBatch) -> usize {
        let (added, ended) = self.fetch.push_batch(batch.rows, batch.end_of_cursor);
        trace!(
            statement = ?self.handle,
            rows = added,
            end_of_cursor = self.fetch.is_end_of_cursor(),
            "fetch completed"
        );
        self.listeners
            .emit(&StatementEvent::FetchCompleted { rows: added });
        if ended {
            self.listeners.emit(&StatementEvent::EndOfCursor);
        }
        added
    }

    /// Whether an asynchronous fetch of `requested` rows may be sent now
    pub fn can_fetch_async(&self, requested: u32) -> bool {
        self.async_fetch
            && self.state == StatementState::CursorOpen
            && self.session.protocol_version() >= protocol::LAZY_SEND_VERSION
            && self.session.lazy_send()
            && !self.fetch.is_async_pending()
            && !self.fetch.is_end_of_cursor()
            && requested != 1
            && self.cursor_name.is_none()
            && self.cursor_strategy == CursorStrategy::ForwardOnly
    }

    /// Send a fetch without waiting for its rows
    ///
    /// Silently ignored when the session or cursor does not allow it. The
    /// rows are picked up by the next `fetch` or `next_row`.
    pub async fn async_fetch(&mut self, requested: u32) -> Result<()> {
        if !self.can_fetch_async(requested) {
            trace!(statement = ?self.handle, requested, "async fetch not applicable");
            return Ok(());
        }
        match self.async_fetch_inner(requested).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn async_fetch_inner(&mut self, requested: u32) -> Result<()> {
        let handle = self.require_handle()?;
        let mut wire = self.session.wire(Some(&self.cancel)).await?;
        if wire.has_pending_fetch(handle) {
            return Ok(());
        }
        wire.send(FetchMessage::new(handle, &self.output_blr, requested.max(1)).build_request())
            .await?;
        wire.defer_fetch(handle, self.output.clone());
        self.fetch.set_async_pending(true);
        Ok(())
    }

    /// Next row of the result, fetching as needed
    ///
    /// Also returns the singleton row of an executed procedure.
    pub async fn next_row(&mut self) -> Result<Option<RowValue>> {
        if self.state == StatementState::CursorOpen
            && self.cursor_strategy != CursorStrategy::ForwardOnly
        {
            return self.fetch_position(FetchPosition::Next).await;
        }
        self.next_forward().await
    }

    async fn next_forward(&mut self) -> Result<Option<RowValue>> {
        loop {
            if let Some(row) = self.fetch.pop() {
                if self.fetch.should_prefetch() {
                    let size = self.fetch_config.fetch_size;
                    if let Err(e) = self.async_fetch(size).await {
                        // Surfaced on the next call; this row is already out
                        self.prefetch_error = Some(e);
                    }
                }
                return Ok(Some(row));
            }
            if let Some(e) = self.prefetch_error.take() {
                return Err(e);
            }
            if self.state != StatementState::CursorOpen || self.fetch.is_end_of_cursor() {
                return Ok(None);
            }
            let size = self.fetch_config.fetch_size;
            self.fetch_batch(size).await?;
        }
    }

    /// Move a scrollable cursor and return the row there
    ///
    /// Forward-only cursors support only [`FetchPosition::Next`].
    pub async fn fetch_position(&mut self, position: FetchPosition) -> Result<Option<RowValue>> {
        self.require_open_cursor()?;
        match self.cursor_strategy {
            CursorStrategy::ForwardOnly => {
                if position == FetchPosition::Next {
                    self.next_forward().await
                } else {
                    Err(Error::UnsupportedCursorOperation(format!(
                        "{:?} on a forward-only cursor",
                        position
                    )))
                }
            }
            CursorStrategy::ClientCached => {
                self.materialize().await?;
                Ok(self
                    .cached
                    .as_mut()
                    .and_then(|cache| cache.fetch(position)))
            }
            CursorStrategy::ServerScrollable => {
                // Rows buffered by fetch() come first; the server cursor is past them
                let position = if position == FetchPosition::Next {
                    if let Some(row) = self.fetch.pop() {
                        return Ok(Some(row));
                    }
                    if self.fetch.is_end_of_cursor() {
                        return Ok(None);
                    }
                    position
                } else {
                    let ahead = self.fetch.reposition();
                    position.behind_server(ahead)
                };
                let session = self.session.clone();
                let limit = self.timeout;
                match session
                    .with_timeout(limit, self.scroll_inner(position))
                    .await
                {
                    Ok(batch) => {
                        let rows = batch.rows.len();
                        self.listeners
                            .emit(&StatementEvent::FetchCompleted { rows });
                        Ok(batch.rows.into_iter().next())
                    }
                    Err(e) => Err(self.fail(e)),
                }
            }
        }
    }

    async fn scroll_inner(&mut self, position: FetchPosition) -> Result<FetchBatch> {
        let handle = self.require_handle()?;
        let (op, argument) = position.scroll_op();
        let mut wire = self.session.wire(Some(&self.cancel)).await?;
        wire.send(FetchMessage::scroll(handle, &self.output_blr, 1, op, argument).build_request())
            .await?;
        wire.receive_batch(&self.output).await?.into_result()
    }

    /// Read the whole result into the client-side cache
    async fn materialize(&mut self) -> Result<()> {
        if self.cached.is_some() {
            return Ok(());
        }
        let mut rows = self.fetch.take_rows();
        while !self.fetch.is_end_of_cursor() {
            let size = self.fetch_config.fetch_size;
            self.fetch_batch(size).await?;
            rows.extend(self.fetch.take_rows());
        }
        debug!(statement = ?self.handle, rows = rows.len(), "result cached");
        self.cached = Some(CachedRows::new(rows));
        Ok(())
    }

    fn cached_rows(&mut self) -> Result<&mut CachedRows> {
        if self.cursor_strategy != CursorStrategy::ClientCached {
            return Err(Error::UnsupportedCursorOperation(
                "row changes need a client-cached cursor".to_string(),
            ));
        }
        self.cached
            .as_mut()
            .ok_or_else(|| Error::invalid_state("result not fetched yet"))
    }

    /// Replace the current row of a client-cached cursor
    pub fn update_row(&mut self, row: RowValue) -> Result<()> {
        self.cached_rows()?.update_current(row)
    }

    /// Delete the current row of a client-cached cursor
    pub fn delete_row(&mut self) -> Result<RowValue> {
        self.cached_rows()?.delete_current()
    }

    /// Insert a row after the current row of a client-cached cursor
    pub fn insert_row(&mut self, row: RowValue) -> Result<()> {
        self.cached_rows()?.insert(row);
        Ok(())
    }

    // =========================================================================
    // Close, free and info
    // =========================================================================

    /// Close the open cursor, keeping the statement prepared
    pub async fn close_cursor(&mut self) -> Result<()> {
        if self.state != StatementState::CursorOpen {
            return Ok(());
        }
        match self.release(free_option::CLOSE).await {
            Ok(()) => {
                self.fetch.reset();
                self.cached = None;
                self.set_state(StatementState::Prepared);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Release the statement on the server
    pub async fn free(&mut self) -> Result<()> {
        if self.state == StatementState::Freed {
            return Ok(());
        }
        if self.handle.is_some() {
            if let Err(e) = self.release(free_option::DROP).await {
                return Err(self.fail(e));
            }
        }
        self.fetch.reset();
        self.cached = None;
        self.set_state(StatementState::Freed);
        self.listeners.clear();
        Ok(())
    }

    async fn release(&mut self, option: u32) -> Result<()> {
        let handle = self.require_handle()?;
        let mut wire = self.session.wire(None).await?;
        if self.fetch.is_async_pending() {
            wire.forget_statement(handle);
            self.fetch.set_async_pending(false);
        }
        let response = wire.call(free_statement_request(handle, option)).await?;
        drop(wire);
        self.note_warning(&response);
        Ok(())
    }

    /// Row counts of the last execution
    pub async fn records_affected(&mut self) -> Result<RecordCounts> {
        let handle = self.require_handle()?;
        let mut wire = self.session.wire(Some(&self.cancel)).await?;
        let response = wire
            .call(info_sql_request(
                handle,
                &[info_sql::RECORDS, info::END],
                RECORDS_BUFFER_LENGTH,
            ))
            .await?;
        drop(wire);
        RecordCounts::parse(&response.data)
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if self.state != StatementState::Freed {
            if let Some(handle) = self.handle {
                trace!(statement = handle, "statement dropped without free");
                if self.fetch.is_async_pending() {
                    self.session.release_fetch(handle);
                }
            }
        }
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_handle_consumed_once() {
        let cancel = CancelHandle::new();
        assert!(!cancel.take());
        let other = cancel.clone();
        other.cancel();
        assert!(cancel.is_cancelled());
        assert!(cancel.take());
        assert!(!cancel.take());
        assert!(!other.is_cancelled());
    }
}
