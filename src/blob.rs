//! Blob handles
//!
//! A [`BlobRef`] starts `Unopened` and opens lazily on first use. Input blobs
//! pushed inline by the server are served from the transaction's
//! [`InlineBlobCache`](crate::blob_cache::InlineBlobCache) without a round
//! trip; everything else goes through `op_open_blob2` / `op_create_blob2`.

use std::fmt;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::blob_cache::CachedBlob;
use crate::codec::pb::{write_info_item, InfoReader};
use crate::codec::row::strip_segment_headers;
use crate::constants::{bpb, info, info_blob, Operation, MAX_SEGMENT_SIZE, SEGMENT_EOF};
use crate::error::{Error, Result};
use crate::messages::{
    create_blob_request, get_segment_request, handle_request, info_blob_request, open_blob_request,
    put_segments_request,
};
use crate::session::Session;

/// Bytes requested per `op_get_segment`
const SEGMENT_REQUEST_SIZE: u32 = 32_767;

/// Server buffer size for `op_info_blob`
const INFO_BUFFER_LENGTH: u32 = 256;

/// Blob id (the quad stored in a row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlobId(pub u64);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Whether a blob is read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobDirection {
    /// Existing blob, read with `get_segment`
    Input,
    /// New blob, written with `put_segment`
    Output,
}

/// Blob handle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobState {
    /// Not opened yet
    Unopened,
    /// Served from an inline payload
    Inline,
    /// Open on the server
    Open,
    /// Closed or cancelled
    Closed,
}

/// Inline payload taken from the cache
#[derive(Debug)]
struct InlineContent {
    info: Bytes,
    remaining: Bytes,
    total_length: usize,
}

/// Handle to one blob in a transaction
#[derive(Debug)]
pub struct BlobRef {
    session: Session,
    transaction: i32,
    id: BlobId,
    direction: BlobDirection,
    state: BlobState,
    handle: Option<i32>,
    inline: Option<InlineContent>,
    eof: bool,
}

impl BlobRef {
    pub(crate) fn new(session: Session, transaction: i32, id: BlobId, direction: BlobDirection) -> Self {
        Self {
            session,
            transaction,
            id,
            direction,
            state: BlobState::Unopened,
            handle: None,
            inline: None,
            eof: false,
        }
    }

    /// Blob id; for output blobs, assigned once opened
    pub fn id(&self) -> BlobId {
        self.id
    }

    /// Read or write
    pub fn direction(&self) -> BlobDirection {
        self.direction
    }

    /// Current state
    pub fn state(&self) -> BlobState {
        self.state
    }

    /// Owning transaction handle
    pub fn transaction(&self) -> i32 {
        self.transaction
    }

    /// Whether every byte has been read
    pub fn is_eof(&self) -> bool {
        match &self.inline {
            Some(content) => content.remaining.is_empty(),
            None => self.eof,
        }
    }

    /// Open the blob if it is not open yet
    ///
    /// Input blobs found in the inline cache move to `Inline` and consume the
    /// cache entry; others are opened on the server.
    pub async fn open(&mut self) -> Result<()> {
        match self.state {
            BlobState::Inline | BlobState::Open => Ok(()),
            BlobState::Closed => Err(Error::invalid_state("blob is closed")),
            BlobState::Unopened => match self.direction {
                BlobDirection::Input => self.open_input().await,
                BlobDirection::Output => self.create().await,
            },
        }
    }

    async fn open_input(&mut self) -> Result<()> {
        let mut wire = self.session.wire(None).await?;
        if let Some(cached) = wire.take_cached_blob(self.transaction, self.id) {
            trace!(blob_id = self.id.0, size = cached.data.len(), "blob served inline");
            self.inline = Some(InlineContent {
                total_length: cached.data.len(),
                info: cached.info,
                remaining: cached.data,
            });
            self.state = BlobState::Inline;
            return Ok(());
        }
        let response = wire
            .call(open_blob_request(&[], self.transaction, self.id))
            .await?;
        trace!(blob_id = self.id.0, handle = response.object, "blob opened");
        self.handle = Some(response.object);
        self.state = BlobState::Open;
        Ok(())
    }

    async fn create(&mut self) -> Result<()> {
        let mut pb = crate::codec::ParameterBuffer::new(bpb::VERSION1);
        pb.push_byte(bpb::TYPE, bpb::TYPE_SEGMENTED);
        let mut wire = self.session.wire(None).await?;
        let response = wire
            .call(create_blob_request(pb.as_bytes(), self.transaction))
            .await?;
        self.handle = Some(response.object);
        self.id = BlobId(response.blob_id);
        self.state = BlobState::Open;
        trace!(blob_id = self.id.0, handle = response.object, "blob created");
        Ok(())
    }

    fn require(&self, direction: BlobDirection) -> Result<()> {
        if self.direction != direction {
            return Err(Error::invalid_state(format!(
                "operation requires an {:?} blob",
                direction
            )));
        }
        Ok(())
    }

    fn server_handle(&self) -> Result<i32> {
        self.handle
            .ok_or_else(|| Error::invalid_state("blob has no server handle"))
    }

    /// Read up to `max_length` bytes; `None` at end of blob
    pub async fn get_segment(&mut self, max_length: u32) -> Result<Option<Bytes>> {
        self.require(BlobDirection::Input)?;
        self.open().await?;

        if let Some(content) = self.inline.as_mut() {
            if content.remaining.is_empty() {
                return Ok(None);
            }
            let n = content.remaining.len().min(max_length.max(1) as usize);
            return Ok(Some(content.remaining.split_to(n)));
        }

        if self.eof {
            return Ok(None);
        }
        let handle = self.server_handle()?;
        let mut wire = self.session.wire(None).await?;
        let response = wire.call(get_segment_request(handle, max_length)).await?;
        if response.object as u32 == SEGMENT_EOF {
            self.eof = true;
        }
        let data = strip_segment_headers(&response.data)?;
        if data.is_empty() && self.eof {
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Read the rest of the blob
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        while let Some(segment) = self.get_segment(SEGMENT_REQUEST_SIZE).await? {
            out.extend_from_slice(&segment);
        }
        Ok(out.freeze())
    }

    /// Write `data`, split into segments of at most 32 765 bytes
    pub async fn put_segment(&mut self, data: &[u8]) -> Result<()> {
        self.require(BlobDirection::Output)?;
        self.open().await?;
        let handle = self.server_handle()?;
        let mut wire = self.session.wire(None).await?;
        for chunk in data.chunks(MAX_SEGMENT_SIZE * 8) {
            wire.call(put_segments_request(handle, chunk)).await?;
        }
        Ok(())
    }

    /// Blob info for `items`
    ///
    /// Answered locally when every item is a size or type item and the
    /// inline info is at hand; otherwise asked with `op_info_blob`. The reply
    /// holds the requested items in order, then `isc_info_end`.
    pub async fn info(&mut self, items: &[u8]) -> Result<Bytes> {
        let local_only = !items.is_empty() && items.iter().all(|i| is_local_item(*i));
        if local_only && self.direction == BlobDirection::Input {
            if let Some(reply) = self.local_info(items).await? {
                return Ok(reply);
            }
        }

        if self.state == BlobState::Unopened {
            self.open().await?;
        }
        if self.state == BlobState::Inline && self.handle.is_none() {
            // Inline payloads have no server handle
            let mut wire = self.session.wire(None).await?;
            let response = wire
                .call(open_blob_request(&[], self.transaction, self.id))
                .await?;
            self.handle = Some(response.object);
        }
        let handle = self.server_handle()?;
        let mut wire = self.session.wire(None).await?;
        let response = wire
            .call(info_blob_request(handle, items, INFO_BUFFER_LENGTH))
            .await?;
        Ok(response.data)
    }

    async fn local_info(&mut self, items: &[u8]) -> Result<Option<Bytes>> {
        let cached = match (&self.inline, self.state) {
            (Some(content), _) => Some((content.info.clone(), content.total_length)),
            (None, BlobState::Unopened) => {
                let wire = self.session.wire(None).await?;
                wire.cached_blob(self.transaction, self.id)
                    .map(|CachedBlob { info, data }| (info, data.len()))
            }
            _ => None,
        };
        match cached {
            Some((info, total_length)) => Ok(Some(local_info_reply(items, &info, total_length)?)),
            None => Ok(None),
        }
    }

    /// Close the blob; output blobs are committed to the transaction
    pub async fn close(&mut self) -> Result<()> {
        self.release(Operation::CloseBlob).await
    }

    /// Discard the blob; output data is dropped by the server
    pub async fn cancel(&mut self) -> Result<()> {
        self.release(Operation::CancelBlob).await
    }

    async fn release(&mut self, op: Operation) -> Result<()> {
        if self.state == BlobState::Closed {
            return Ok(());
        }
        if let Some(handle) = self.handle.take() {
            let mut wire = self.session.wire(None).await?;
            wire.call(handle_request(op, handle)).await?;
        }
        self.inline = None;
        self.state = BlobState::Closed;
        Ok(())
    }
}

fn is_local_item(item: u8) -> bool {
    matches!(
        item,
        info_blob::NUM_SEGMENTS | info_blob::MAX_SEGMENT | info_blob::TOTAL_LENGTH | info_blob::TYPE
    )
}

/// Build an info reply from cached info, falling back to the payload size
fn local_info_reply(items: &[u8], cached_info: &Bytes, total_length: usize) -> Result<Bytes> {
    let known = if cached_info.is_empty() {
        Default::default()
    } else {
        InfoReader::new(cached_info.clone()).items()?
    };
    let mut out = Vec::with_capacity(items.len() * 7 + 1);
    for &item in items {
        match known.get(item) {
            Some(value) => write_info_item(&mut out, item, value),
            None => {
                let value: i32 = match item {
                    info_blob::NUM_SEGMENTS => i32::from(total_length > 0),
                    info_blob::MAX_SEGMENT | info_blob::TOTAL_LENGTH => {
                        total_length.min(i32::MAX as usize) as i32
                    }
                    _ => i32::from(bpb::TYPE_SEGMENTED),
                };
                write_info_item(&mut out, item, &value.to_le_bytes());
            }
        }
    }
    out.push(info::END);
    Ok(Bytes::from(out))
}
