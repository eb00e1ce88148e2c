#![warn(missing_docs)]

//! # firebird-rs
//!
//! A pure Rust async client for the Firebird remote wire protocol. No fbclient
//! library required.
//!
//! The crate speaks protocol versions 10 through 19 over TCP: it negotiates
//! the protocol, authenticates with SRP (or legacy crypt), optionally
//! encrypts the connection, and runs statements with batched and
//! asynchronously prefetched fetches.
//!
//! ## Features
//!
//! - **Async/await** - Built on Tokio
//! - **Wire encryption** - ChaCha64, ChaCha and Arc4 plugins keyed from the SRP session key
//! - **Lazy-send prefetch** - The next batch of a forward cursor is requested before the buffer runs dry
//! - **Inline blobs** - Small blobs sent along with fetched rows are served from a per-transaction cache
//! - **Scrollable cursors** - Server-side on protocol 18+, client-cached otherwise
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use firebird_rs::{Config, Session, TransactionOptions};
//!
//! #[tokio::main]
//! async fn main() -> firebird_rs::Result<()> {
//!     let mut config: Config = "localhost:/var/lib/firebird/employee.fdb".parse()?;
//!     config.set_username("SYSDBA");
//!     config.set_password("masterkey");
//!
//!     let session = Session::connect(config).await?;
//!     let mut tx = session.start_transaction(TransactionOptions::default()).await?;
//!
//!     let mut stmt = session
//!         .prepare(&tx, "select emp_no, first_name from employee")
//!         .await?;
//!     stmt.execute(&tx, None).await?;
//!     while let Some(row) = stmt.next_row().await? {
//!         println!("{:?} {:?}", row.get_i16(0)?, row.get_str(1)?);
//!     }
//!     stmt.free().await?;
//!
//!     tx.commit().await?;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Blobs
//!
//! ```rust,no_run
//! use firebird_rs::{Session, Transaction};
//!
//! # async fn example(session: &Session, tx: &Transaction) -> firebird_rs::Result<()> {
//! let mut stmt = session.prepare(tx, "select notes from documents").await?;
//! stmt.execute(tx, None).await?;
//! if let Some(row) = stmt.next_row().await? {
//!     if let Some(id) = row.get_blob_id(0)? {
//!         let mut blob = tx.blob(id)?;
//!         blob.open().await?;
//!         let bytes = blob.read_to_end().await?;
//!         blob.close().await?;
//!         println!("{} bytes", bytes.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod blob;
pub mod blob_cache;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod cursor;
pub mod error;
pub mod events;
pub mod handshake;
pub mod messages;
pub mod session;
pub mod statement;
pub mod transaction;
pub mod transport;

// Re-export commonly used types
pub use auth::AuthPlugin;
pub use blob::{BlobDirection, BlobId, BlobRef, BlobState};
pub use codec::{FieldDescriptor, RowDescriptor, RowValue};
pub use config::{Config, CursorStrategy, WireCrypt};
pub use constants::{SqlType, StatementType};
pub use crypto::CryptPlugin;
pub use cursor::FetchPosition;
pub use error::{Error, ErrorKind, Result, ServerError};
pub use events::{
    ListenerId, Listeners, SessionEvent, StatementEvent, StatementState, TransactionEvent,
};
pub use handshake::{HandshakeState, Negotiated};
pub use session::Session;
pub use statement::{CancelHandle, ExecuteOutcome, FetchConfig, Statement};
pub use transaction::{IsolationLevel, LockWait, Transaction, TransactionOptions, TransactionState};
