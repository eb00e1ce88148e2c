//! Blob access and the inline blob cache against a scripted server

mod common;

use bytes::Bytes;
use common::*;
use firebird_rs::buffer::WriteBuffer;
use firebird_rs::codec::pb::{write_info_item, InfoReader};
use firebird_rs::codec::row::encode_segments;
use firebird_rs::codec::RowValue;
use firebird_rs::constants::{info, info_blob, Operation, SEGMENT_EOF};
use firebird_rs::{BlobId, BlobState, Error, Session, Statement, Transaction, TransactionEvent};

const BLOB_A: BlobId = BlobId(0x0000_0081_0000_0010);
const BLOB_B: BlobId = BlobId(0x0000_0081_0000_0011);

fn blob_a_info() -> Vec<u8> {
    let mut out = Vec::new();
    write_info_item(&mut out, info_blob::NUM_SEGMENTS, &1i32.to_le_bytes());
    write_info_item(&mut out, info_blob::MAX_SEGMENT, &12i32.to_le_bytes());
    write_info_item(&mut out, info_blob::TOTAL_LENGTH, &12i32.to_le_bytes());
    out.push(info::END);
    out
}

/// Session at protocol 19 with a cursor over two rows whose blobs came inline
async fn fetched_inline_blobs() -> (Session, MockServer, Transaction, Statement, Vec<BlobId>) {
    let (session, mut server) = connect(test_config(), 19, true).await;
    let tx = start_transaction(&session, &mut server).await;
    let mut stmt = prepare(&session, &mut server, &tx, describe(1, &[Column::Blob], &[])).await;
    let (outcome, ()) = tokio::join!(stmt.execute(&tx, None), server.respond(Operation::Execute, 0));
    outcome.unwrap();

    let codec = server.codec();
    let desc = descriptor(&[Column::Blob]);
    let script = async {
        server.expect(Operation::Fetch).await;
        let mut reply = WriteBuffer::new();
        write_inline_blob(&mut reply, TX_HANDLE, BLOB_A, &blob_a_info(), b"hello inline");
        write_row(&mut reply, codec, &desc, &RowValue::new().push_blob_id(BLOB_A));
        write_inline_blob(&mut reply, TX_HANDLE, BLOB_B, &[], b"second");
        write_row(&mut reply, codec, &desc, &RowValue::new().push_blob_id(BLOB_B));
        write_batch_end(&mut reply, true);
        server.send(reply).await;
    };
    let (first, ()) = tokio::join!(stmt.next_row(), script);
    let mut ids = vec![first.unwrap().unwrap().get_blob_id(0).unwrap().unwrap()];
    while let Some(row) = stmt.next_row().await.unwrap() {
        ids.push(row.get_blob_id(0).unwrap().unwrap());
    }
    (session, server, tx, stmt, ids)
}

#[tokio::test]
async fn test_inline_blob_served_without_round_trip() {
    let (_session, mut server, tx, _stmt, ids) = fetched_inline_blobs().await;
    assert_eq!(ids, vec![BLOB_A, BLOB_B]);

    let mut blob = tx.blob(BLOB_A).unwrap();
    blob.open().await.unwrap();
    assert_eq!(blob.state(), BlobState::Inline);
    assert_eq!(blob.read_to_end().await.unwrap(), Bytes::from_static(b"hello inline"));
    assert!(blob.is_eof());

    let reply = blob
        .info(&[info_blob::TOTAL_LENGTH, info_blob::MAX_SEGMENT])
        .await
        .unwrap();
    let items = InfoReader::new(reply).items().unwrap();
    assert_eq!(items.get_int(info_blob::TOTAL_LENGTH), Some(12));
    assert_eq!(items.get_int(info_blob::MAX_SEGMENT), Some(12));

    blob.close().await.unwrap();
    assert_eq!(blob.state(), BlobState::Closed);
    server.assert_quiet().await;
}

#[tokio::test]
async fn test_info_before_open_falls_back_to_payload_size() {
    let (_session, mut server, tx, _stmt, _ids) = fetched_inline_blobs().await;

    let mut blob = tx.blob(BLOB_B).unwrap();
    let reply = blob
        .info(&[info_blob::NUM_SEGMENTS, info_blob::TOTAL_LENGTH])
        .await
        .unwrap();
    let items = InfoReader::new(reply).items().unwrap();
    assert_eq!(items.get_int(info_blob::NUM_SEGMENTS), Some(1));
    assert_eq!(items.get_int(info_blob::TOTAL_LENGTH), Some(6));
    assert_eq!(blob.state(), BlobState::Unopened);

    // Still cached: the info lookup does not consume the entry
    blob.open().await.unwrap();
    assert_eq!(blob.state(), BlobState::Inline);
    server.assert_quiet().await;
}

#[tokio::test]
async fn test_commit_discards_inline_cache() {
    let (session, mut server, mut tx, _stmt, _ids) = fetched_inline_blobs().await;

    let mut a = tx.blob(BLOB_A).unwrap();
    a.open().await.unwrap();
    assert_eq!(a.state(), BlobState::Inline);

    let (committed, ()) = tokio::join!(tx.commit(), server.respond(Operation::Commit, 0));
    committed.unwrap();
    assert!(matches!(tx.blob(BLOB_B), Err(Error::TransactionClosed)));

    // The server hands out the same transaction handle again
    let tx2 = start_transaction(&session, &mut server).await;
    assert_eq!(tx2.handle(), TX_HANDLE);

    let mut b = tx2.blob(BLOB_B).unwrap();
    let script = async {
        let mut request = server.expect(Operation::OpenBlob2).await;
        request.read_buffer().unwrap();
        assert_eq!(request.read_i32().unwrap(), TX_HANDLE);
        assert_eq!(request.read_quad().unwrap(), BLOB_B.0);
        server.send(response(9, &[])).await;
    };
    let (opened, ()) = tokio::join!(b.open(), script);
    opened.unwrap();
    assert_eq!(b.state(), BlobState::Open);

    let script = async {
        server.expect(Operation::GetSegment).await;
        server
            .send(response(SEGMENT_EOF as i32, &encode_segments(b"second", 32_765)))
            .await;
    };
    let (segment, ()) = tokio::join!(b.get_segment(1024), script);
    assert_eq!(segment.unwrap(), Some(Bytes::from_static(b"second")));
    assert!(b.is_eof());
    assert_eq!(b.get_segment(1024).await.unwrap(), None);

    let (closed, ()) = tokio::join!(b.close(), server.respond(Operation::CloseBlob, 0));
    closed.unwrap();
    server.assert_quiet().await;
}

#[tokio::test]
async fn test_dropped_transaction_releases_inline_cache() {
    let (session, mut server, tx, stmt, _ids) = fetched_inline_blobs().await;
    drop(stmt);
    drop(tx);

    let tx2 = start_transaction(&session, &mut server).await;
    assert_eq!(tx2.handle(), TX_HANDLE);
    let mut b = tx2.blob(BLOB_B).unwrap();
    let (opened, ()) = tokio::join!(b.open(), server.respond(Operation::OpenBlob2, 9));
    opened.unwrap();
    assert_eq!(b.state(), BlobState::Open);
}

#[tokio::test]
async fn test_retaining_commit_keeps_inline_cache() {
    let (session, mut server, mut tx, _stmt, _ids) = fetched_inline_blobs().await;
    let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = events.clone();
    session
        .transaction_listeners()
        .subscribe(move |e| sink.lock().unwrap().push(*e));

    let (committed, ()) = tokio::join!(
        tx.commit_retaining(),
        server.respond(Operation::CommitRetaining, 0)
    );
    committed.unwrap();
    assert!(tx.is_active());

    let mut b = tx.blob(BLOB_B).unwrap();
    b.open().await.unwrap();
    assert_eq!(b.state(), BlobState::Inline);
    server.assert_quiet().await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![TransactionEvent::Committed { retaining: true }]
    );
}

#[tokio::test]
async fn test_write_blob() {
    let (session, mut server) = connect(test_config(), 19, true).await;
    let tx = start_transaction(&session, &mut server).await;

    let mut blob = tx.create_blob().unwrap();
    let script = async {
        server.expect(Operation::CreateBlob2).await;
        server.send(response_with_blob_id(11, 0x99)).await;
    };
    let (opened, ()) = tokio::join!(blob.open(), script);
    opened.unwrap();
    assert_eq!(blob.id(), BlobId(0x99));

    let script = async {
        let mut request = server.expect(Operation::BatchSegments).await;
        assert_eq!(request.read_i32().unwrap(), 11);
        server.send(response(0, &[])).await;
    };
    let (written, ()) = tokio::join!(blob.put_segment(b"abc"), script);
    written.unwrap();

    let err = blob.get_segment(10).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    let (closed, ()) = tokio::join!(blob.close(), server.respond(Operation::CloseBlob, 0));
    closed.unwrap();
}
