//! Connection establishment against a scripted server

mod common;

use std::time::Duration;

use common::*;
use firebird_rs::buffer::WriteBuffer;
use firebird_rs::constants::{key_tag, protocol, Operation};
use firebird_rs::crypto::srp::{generator, multiplier, prime, scramble, verifier};
use firebird_rs::crypto::StreamCipher;
use firebird_rs::transport::StreamTransport;
use firebird_rs::{AuthPlugin, CryptPlugin, Error, Session, WireCrypt};
use num_bigint::BigUint;
use sha1::{Digest, Sha1};

const SALT: &[u8] = b"9E2DE7C3A1B44F0A";

fn accept_data(version: u8, plugin: &str) -> WriteBuffer {
    let mut out = WriteBuffer::new();
    out.write_u32(Operation::AcceptData as u32);
    out.write_u32(protocol::FB_PROTOCOL_FLAG | u32::from(version));
    out.write_u32(protocol::ARCH_GENERIC);
    out.write_u32(protocol::PTYPE_LAZY_SEND);
    out.write_buffer(&[]);
    out.write_string(plugin);
    out.write_u32(0);
    out.write_buffer(&[]);
    out
}

fn clumplet(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
    out.push(tag);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
}

/// Server half of SRP: the challenge to send and the shared session key
fn srp_server(user: &str, password: &str, client_public: &BigUint) -> (Vec<u8>, Vec<u8>) {
    let n = prime();
    let v = verifier(user, password, SALT);
    let b = BigUint::from_bytes_be(&[0x3C; 32]);
    let big_b = (multiplier() * &v + generator().modpow(&b, &n)) % &n;
    let u = scramble(client_public, &big_b);
    let secret = ((client_public * v.modpow(&u, &n)) % &n).modpow(&b, &n);
    let key = Sha1::digest(secret.to_bytes_be()).to_vec();

    let key_hex = big_b.to_str_radix(16);
    let mut challenge = Vec::new();
    challenge.extend_from_slice(&(SALT.len() as u16).to_le_bytes());
    challenge.extend_from_slice(SALT);
    challenge.extend_from_slice(&(key_hex.len() as u16).to_le_bytes());
    challenge.extend_from_slice(key_hex.as_bytes());
    (challenge, key)
}

#[tokio::test]
async fn test_srp_with_arc4_encryption() {
    let config = test_config()
        .auth_plugins(vec![AuthPlugin::Srp256])
        .wire_crypt(WireCrypt::Required)
        .crypt_plugins(vec![CryptPlugin::Arc4]);
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut server = MockServer::new(server, 16);

    let script = async {
        server.expect(Operation::Connect).await;
        server.send(accept_data(16, "Srp256")).await;

        let mut request = server.expect(Operation::ContAuth).await;
        let public_hex = request.read_buffer().unwrap();
        let client_public = BigUint::parse_bytes(&public_hex, 16).expect("client public key");
        let (challenge, key) = srp_server("SYSDBA", "masterkey", &client_public);

        let mut cont = WriteBuffer::new();
        cont.write_u32(Operation::ContAuth as u32);
        cont.write_buffer(&challenge);
        cont.write_string("Srp256");
        cont.write_string("Srp256");
        cont.write_buffer(&[]);
        server.send(cont).await;

        let mut proof = server.expect(Operation::ContAuth).await;
        assert!(!proof.read_buffer().unwrap().is_empty());
        let mut keys = Vec::new();
        clumplet(&mut keys, key_tag::KEY_TYPE, key_tag::SYMMETRIC.as_bytes());
        clumplet(&mut keys, key_tag::KEY_PLUGINS, b"Arc4");
        server.send(response(0, &keys)).await;

        let mut crypt = server.expect(Operation::Crypt).await;
        assert_eq!(crypt.read_string().unwrap(), "Arc4");
        server.enable_cipher(StreamCipher::new(CryptPlugin::Arc4, &key, None).unwrap());
        server.send(response(0, &[])).await;

        server.respond(Operation::Attach, DB_HANDLE).await;
    };
    let (session, ()) = tokio::join!(
        Session::connect_with_transport(Box::new(StreamTransport::new(client)), config),
        script
    );
    let session = session.unwrap();
    assert_eq!(session.protocol_version(), 16);
    assert_eq!(session.negotiated().auth_plugin, Some(AuthPlugin::Srp256));
    assert_eq!(session.negotiated().crypt_plugin, Some(CryptPlugin::Arc4));
    assert_eq!(session.db_handle(), DB_HANDLE);

    let (pinged, ()) = tokio::join!(session.ping(), server.respond(Operation::Ping, 0));
    pinged.unwrap();
}

#[tokio::test]
async fn test_rejection_closes_transport() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut server = MockServer::new(server, 13);
    let script = async {
        server.expect(Operation::Connect).await;
        let mut reject = WriteBuffer::new();
        reject.write_u32(Operation::Reject as u32);
        server.send(reject).await;
    };
    let (result, ()) = tokio::join!(
        Session::connect_with_transport(Box::new(StreamTransport::new(client)), test_config()),
        script
    );
    assert!(matches!(result, Err(Error::ConnectionRejected)));
    assert!(server.client_closed().await);
}

#[tokio::test]
async fn test_unadvertised_version_closes_transport() {
    let config = test_config().protocol_versions(vec![16, 15]);
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut server = MockServer::new(server, 19);
    let script = async {
        server.expect(Operation::Connect).await;
        server.send(accept(19, true)).await;
    };
    let (result, ()) = tokio::join!(
        Session::connect_with_transport(Box::new(StreamTransport::new(client)), config),
        script
    );
    let err = result.unwrap_err();
    assert!(matches!(err, Error::UnsupportedProtocolVersion(19)));
    assert!(err.is_connection_error());
    assert!(server.client_closed().await);
}

#[tokio::test]
async fn test_required_crypt_without_session_key_fails() {
    let config = test_config().wire_crypt(WireCrypt::Required);
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut server = MockServer::new(server, 13);
    let script = async {
        server.expect(Operation::Connect).await;
        server.send(accept(13, true)).await;
    };
    let (result, ()) = tokio::join!(
        Session::connect_with_transport(Box::new(StreamTransport::new(client)), config),
        script
    );
    let err = result.unwrap_err();
    assert!(matches!(err, Error::WireCrypt(_)));
    assert!(err.is_connection_error());
    assert!(server.client_closed().await);
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let config = test_config().connect_timeout(Duration::from_millis(50));
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut server = MockServer::new(server, 13);
    let script = async {
        server.expect(Operation::Connect).await;
    };
    let (result, ()) = tokio::join!(
        Session::connect_with_transport(Box::new(StreamTransport::new(client)), config),
        script
    );
    assert!(matches!(result, Err(Error::ConnectionTimeout(_))));
}

#[tokio::test]
async fn test_close_detaches_and_disconnects() {
    let (session, mut server) = connect(test_config(), 13, true).await;
    let script = async {
        server.respond(Operation::Detach, 0).await;
        server.expect(Operation::Disconnect).await;
    };
    let (closed, ()) = tokio::join!(session.close(), script);
    closed.unwrap();
    assert!(session.is_closed());
    assert!(matches!(session.ping().await, Err(Error::ConnectionClosed)));
}

#[tokio::test]
#[ignore = "requires Firebird server"]
async fn test_live_connect() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let host = std::env::var("FIREBIRD_HOST").unwrap_or_else(|_| "localhost".to_string());
    let database = std::env::var("FIREBIRD_DATABASE").unwrap_or_else(|_| "employee".to_string());
    let user = std::env::var("FIREBIRD_USER").unwrap_or_else(|_| "SYSDBA".to_string());
    let password = std::env::var("FIREBIRD_PASSWORD").unwrap_or_else(|_| "masterkey".to_string());

    let config = firebird_rs::Config::new(host, database, user, password);
    let session = Session::connect(config).await.unwrap();
    assert!(session.protocol_version() >= 13);
    let mut tx = session
        .start_transaction(firebird_rs::TransactionOptions::default())
        .await
        .unwrap();
    let mut stmt = session
        .prepare(&tx, "select rdb$relation_id from rdb$relations")
        .await
        .unwrap();
    stmt.execute(&tx, None).await.unwrap();
    let mut count = 0;
    while stmt.next_row().await.unwrap().is_some() {
        count += 1;
    }
    assert!(count > 0);
    stmt.free().await.unwrap();
    tx.commit().await.unwrap();
    session.close().await.unwrap();
}
