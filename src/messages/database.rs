//! Database and transaction level requests
//!
//! All of these are answered by a plain `op_response`.

use crate::buffer::WriteBuffer;
use crate::codec::ParameterBuffer;
use crate::config::Config;
use crate::constants::{dpb, Operation};
use crate::error::Result;

/// Build the DPB for `op_attach`
///
/// `legacy_password` is only set on protocols without wire authentication.
pub fn attach_dpb(config: &Config, login: &str, legacy_password: Option<&str>) -> Result<Vec<u8>> {
    let mut pb = ParameterBuffer::new(dpb::VERSION1);
    pb.push_str(dpb::LC_CTYPE, &config.charset)?;
    pb.push_int(dpb::SQL_DIALECT, config.dialect as i32);
    pb.push_str(dpb::USER_NAME, login)?;
    if let Some(password) = legacy_password {
        pb.push_str(dpb::PASSWORD, password)?;
    }
    pb.push_int(dpb::PROCESS_ID, std::process::id() as i32);
    pb.push_str(dpb::PROCESS_NAME, &process_name())?;
    pb.push_bytes(dpb::UTF8_FILENAME, &[])?;
    let timeout = config.connect_timeout.as_secs().min(i32::MAX as u64) as i32;
    if timeout > 0 {
        pb.push_int(dpb::CONNECT_TIMEOUT, timeout);
    }
    Ok(pb.into_bytes())
}

fn process_name() -> String {
    let name = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "firebird-rs".to_string());
    // Items carry a one-byte length
    name.chars().take(200).collect()
}

/// `op_attach`: database handle 0, path, DPB
pub fn attach_request(database: &str, dpb: &[u8]) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(64 + dpb.len());
    buf.write_u32(Operation::Attach as u32);
    buf.write_u32(0);
    buf.write_string(database);
    buf.write_buffer(dpb);
    buf
}

/// Request made of an operation and one handle
///
/// Used for `op_detach`, `op_commit`, `op_rollback`, the retaining variants,
/// `op_allocate_statement`, `op_close_blob` and `op_cancel_blob`.
pub fn handle_request(op: Operation, handle: i32) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(8);
    buf.write_u32(op as u32);
    buf.write_i32(handle);
    buf
}

/// Request made of the operation alone (`op_ping`, `op_disconnect`)
pub fn bare_request(op: Operation) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(4);
    buf.write_u32(op as u32);
    buf
}

/// `op_transaction`: database handle, TPB
pub fn transaction_request(db_handle: i32, tpb: &[u8]) -> WriteBuffer {
    let mut buf = WriteBuffer::with_capacity(16 + tpb.len());
    buf.write_u32(Operation::Transaction as u32);
    buf.write_i32(db_handle);
    buf.write_buffer(tpb);
    buf
}
