//! Wire protocol messages
//!
//! Request encoders and reply decoders. Decoders are pure functions over a
//! [`ReadBuffer`](crate::buffer::ReadBuffer) so the channel can rerun them
//! when a message spans several reads.

mod accept;
mod blob;
mod connect;
mod database;
mod describe;
mod execute;
mod fetch;
mod response;

pub use accept::{AcceptMessage, ContAuthMessage, HandshakeReply};
pub use blob::{
    create_blob_request, get_segment_request, info_blob_request, open_blob_request,
    put_segments_request,
};
pub use connect::{cont_auth_request, crypt_request, ConnectMessage};
pub use database::{attach_dpb, attach_request, bare_request, handle_request, transaction_request};
pub use describe::{
    prepare_items, DescribeParser, RecordCounts, Section, StatementDescription,
    DESCRIBE_BUFFER_LENGTH, DESCRIBE_ITEMS,
};
pub use execute::{
    free_statement_request, info_sql_request, set_cursor_request, ExecuteMessage, PrepareMessage,
    SqlResponse,
};
pub use fetch::{FetchBatch, FetchMessage, FetchPart, InlineBlob};
pub use response::{parse_status_vector, read_operation, Response};
