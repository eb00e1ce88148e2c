//! Scripted Firebird server for integration tests
//!
//! The client side runs over one end of a [`tokio::io::duplex`]; the test
//! drives the other end with [`MockServer`], reading one request at a time
//! and writing hand-built replies.

#![allow(dead_code)]

use std::time::Duration;

use firebird_rs::buffer::{ReadBuffer, WriteBuffer};
use firebird_rs::codec::pb::write_info_item;
use firebird_rs::codec::row::encode_segments;
use firebird_rs::codec::{FieldDescriptor, RowCodec, RowDescriptor, RowValue};
use firebird_rs::constants::{
    fetch_status, info, info_sql, isc_arg, protocol, Operation, SqlType,
};
use firebird_rs::crypto::StreamCipher;
use firebird_rs::transport::StreamTransport;
use firebird_rs::{BlobId, Config, Session, Statement, Transaction, TransactionOptions, WireCrypt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const DB_HANDLE: i32 = 1;
pub const TX_HANDLE: i32 = 3;
pub const STMT_HANDLE: i32 = 5;

/// Server end of a duplex connection
pub struct MockServer {
    stream: DuplexStream,
    cipher: Option<StreamCipher>,
    pub version: u8,
}

impl MockServer {
    pub fn new(stream: DuplexStream, version: u8) -> Self {
        Self {
            stream,
            cipher: None,
            version,
        }
    }

    pub fn enable_cipher(&mut self, cipher: StreamCipher) {
        self.cipher = Some(cipher);
    }

    pub fn codec(&self) -> RowCodec {
        RowCodec::new(self.version)
    }

    /// Read whatever the client wrote next
    pub async fn read_request(&mut self) -> ReadBuffer {
        let mut buf = vec![0u8; 64 * 1024];
        let n = self.stream.read(&mut buf).await.expect("server read");
        assert!(n > 0, "client closed the connection");
        buf.truncate(n);
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.decrypt(&mut buf);
        }
        ReadBuffer::from_slice(&buf)
    }

    /// Read the next request and check its operation
    pub async fn expect(&mut self, op: Operation) -> ReadBuffer {
        let mut buf = self.read_request().await;
        let got = buf.read_u32().expect("operation code");
        assert_eq!(got, op as u32, "expected {:?}", op);
        buf
    }

    pub async fn send(&mut self, reply: WriteBuffer) {
        let mut data = reply.as_slice().to_vec();
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.encrypt(&mut data);
        }
        self.stream.write_all(&data).await.expect("server write");
    }

    /// Fail if the client sends anything within a short window
    pub async fn assert_quiet(&mut self) {
        let mut byte = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_millis(50), self.stream.read(&mut byte)).await;
        assert!(read.is_err(), "unexpected client traffic");
    }

    /// Whether the client closed its end
    pub async fn client_closed(&mut self) -> bool {
        let mut buf = [0u8; 256];
        matches!(
            tokio::time::timeout(Duration::from_millis(200), self.stream.read(&mut buf)).await,
            Ok(Ok(0))
        )
    }

    /// Answer `request` with a plain `op_response`
    pub async fn respond(&mut self, request: Operation, object: i32) {
        self.expect(request).await;
        self.send(response(object, &[])).await;
    }
}

// =============================================================================
// Replies
// =============================================================================

pub fn accept(version: u8, lazy_send: bool) -> WriteBuffer {
    let mut out = WriteBuffer::new();
    out.write_u32(Operation::Accept as u32);
    out.write_u32(protocol::FB_PROTOCOL_FLAG | u32::from(version));
    out.write_u32(protocol::ARCH_GENERIC);
    out.write_u32(if lazy_send {
        protocol::PTYPE_LAZY_SEND
    } else {
        protocol::PTYPE_BATCH_SEND
    });
    out
}

fn write_response(out: &mut WriteBuffer, object: i32, blob_id: u64, data: &[u8]) {
    out.write_u32(Operation::Response as u32);
    out.write_i32(object);
    out.write_quad(blob_id);
    out.write_buffer(data);
    out.write_u32(isc_arg::END);
}

pub fn response(object: i32, data: &[u8]) -> WriteBuffer {
    let mut out = WriteBuffer::new();
    write_response(&mut out, object, 0, data);
    out
}

pub fn response_with_blob_id(object: i32, blob_id: u64) -> WriteBuffer {
    let mut out = WriteBuffer::new();
    write_response(&mut out, object, blob_id, &[]);
    out
}

pub fn write_error_response(out: &mut WriteBuffer, gds_code: u32) {
    out.write_u32(Operation::Response as u32);
    out.write_i32(0);
    out.write_quad(0);
    out.write_buffer(&[]);
    out.write_u32(isc_arg::GDS);
    out.write_u32(gds_code);
    out.write_u32(isc_arg::SQL_STATE);
    out.write_string("42000");
    out.write_u32(isc_arg::END);
}

pub fn error_response(gds_code: u32) -> WriteBuffer {
    let mut out = WriteBuffer::new();
    write_error_response(&mut out, gds_code);
    out
}

// =============================================================================
// Describe info and rows
// =============================================================================

fn int_item(out: &mut Vec<u8>, tag: u8, v: i32) {
    write_info_item(out, tag, &v.to_le_bytes());
}

/// Nullable column types understood by [`describe`]
#[derive(Debug, Clone, Copy)]
pub enum Column {
    Integer,
    Blob,
}

impl Column {
    fn type_code(self) -> i32 {
        match self {
            Column::Integer => 497,
            Column::Blob => 521,
        }
    }

    fn length(self) -> i32 {
        match self {
            Column::Integer => 4,
            Column::Blob => 8,
        }
    }

    pub fn descriptor(self) -> FieldDescriptor {
        match self {
            Column::Integer => FieldDescriptor::new(SqlType::Long, 4),
            Column::Blob => FieldDescriptor::new(SqlType::Blob, 8),
        }
    }
}

/// Prepare reply data for a statement of `statement_type`
pub fn describe(statement_type: i32, output: &[Column], input: &[Column]) -> Vec<u8> {
    let mut data = Vec::new();
    int_item(&mut data, info_sql::STMT_TYPE, statement_type);
    for (tag, columns) in [(info_sql::SELECT, output), (info_sql::BIND, input)] {
        data.push(tag);
        int_item(&mut data, info_sql::DESCRIBE_VARS, columns.len() as i32);
        for (i, column) in columns.iter().enumerate() {
            let name = format!("C{}", i + 1);
            int_item(&mut data, info_sql::SQLDA_SEQ, i as i32 + 1);
            int_item(&mut data, info_sql::TYPE, column.type_code());
            int_item(&mut data, info_sql::SUB_TYPE, 0);
            int_item(&mut data, info_sql::SCALE, 0);
            int_item(&mut data, info_sql::LENGTH, column.length());
            write_info_item(&mut data, info_sql::FIELD, name.as_bytes());
            write_info_item(&mut data, info_sql::ALIAS, name.as_bytes());
            write_info_item(&mut data, info_sql::RELATION, b"T");
            write_info_item(&mut data, info_sql::OWNER, b"SYSDBA");
            data.push(info_sql::DESCRIBE_END);
        }
    }
    data.push(info::END);
    data
}

pub fn descriptor(columns: &[Column]) -> RowDescriptor {
    RowDescriptor::new(columns.iter().map(|c| c.descriptor()).collect())
}

/// Append one `op_fetch_response` row
pub fn write_row(out: &mut WriteBuffer, codec: RowCodec, desc: &RowDescriptor, row: &RowValue) {
    out.write_u32(Operation::FetchResponse as u32);
    out.write_u32(fetch_status::OK);
    out.write_u32(1);
    codec.encode(desc, row, out).expect("encode row");
}

/// Append the message ending a batch; `end_of_cursor` reports status 100
pub fn write_batch_end(out: &mut WriteBuffer, end_of_cursor: bool) {
    out.write_u32(Operation::FetchResponse as u32);
    out.write_u32(if end_of_cursor {
        fetch_status::NO_MORE_ROWS
    } else {
        fetch_status::OK
    });
    out.write_u32(0);
}

/// A batch of single-integer rows with the given values
pub fn int_batch(codec: RowCodec, values: impl IntoIterator<Item = i32>, end_of_cursor: bool) -> WriteBuffer {
    let desc = descriptor(&[Column::Integer]);
    let mut out = WriteBuffer::new();
    for v in values {
        write_row(&mut out, codec, &desc, &RowValue::new().push_i32(v));
    }
    write_batch_end(&mut out, end_of_cursor);
    out
}

/// Append an `op_inline_blob`
pub fn write_inline_blob(out: &mut WriteBuffer, transaction: i32, id: BlobId, info_data: &[u8], payload: &[u8]) {
    out.write_u32(Operation::InlineBlob as u32);
    out.write_i32(transaction);
    out.write_quad(id.0);
    out.write_buffer(info_data);
    out.write_buffer(&encode_segments(payload, 32_765));
}

// =============================================================================
// Client setup
// =============================================================================

pub fn test_config() -> Config {
    Config::new("localhost", "employee", "sysdba", "masterkey").wire_crypt(WireCrypt::Disabled)
}

/// Connected session and its server over plain `op_accept`
pub async fn connect(config: Config, version: u8, lazy_send: bool) -> (Session, MockServer) {
    let (client, server) = tokio::io::duplex(256 * 1024);
    let mut server = MockServer::new(server, version);
    let script = async move {
        server.expect(Operation::Connect).await;
        server.send(accept(version, lazy_send)).await;
        server.respond(Operation::Attach, DB_HANDLE).await;
        server
    };
    let (session, server) = tokio::join!(
        Session::connect_with_transport(Box::new(StreamTransport::new(client)), config),
        script
    );
    (session.expect("connect"), server)
}

pub async fn start_transaction(session: &Session, server: &mut MockServer) -> Transaction {
    let (tx, ()) = tokio::join!(
        session.start_transaction(TransactionOptions::default()),
        server.respond(Operation::Transaction, TX_HANDLE)
    );
    tx.expect("start transaction")
}

/// Prepare a statement whose describe reply is `describe_data`
pub async fn prepare(session: &Session, server: &mut MockServer, tx: &Transaction, describe_data: Vec<u8>) -> Statement {
    let script = async {
        server.respond(Operation::AllocateStatement, STMT_HANDLE).await;
        server.expect(Operation::PrepareStatement).await;
        server.send(response(0, &describe_data)).await;
    };
    let (stmt, ()) = tokio::join!(session.prepare(tx, "select c1 from t"), script);
    stmt.expect("prepare")
}

/// Prepare and execute a single-integer-column select
pub async fn open_int_cursor(session: &Session, server: &mut MockServer, tx: &Transaction) -> Statement {
    let mut stmt = prepare(session, server, tx, describe(1, &[Column::Integer], &[])).await;
    let (outcome, ()) = tokio::join!(stmt.execute(tx, None), server.respond(Operation::Execute, 0));
    assert_eq!(outcome.expect("execute"), firebird_rs::ExecuteOutcome::CursorOpen);
    stmt
}
