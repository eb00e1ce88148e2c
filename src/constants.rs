//! Wire protocol constants
//!
//! Operation codes, protocol versions, parameter-buffer tags, info items,
//! SQL type codes and BLR verbs used by the Firebird remote protocol.

// =============================================================================
// Operations
// =============================================================================

/// Operation codes (first XDR int of every message)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum Operation {
    Connect = 1,
    Accept = 3,
    Reject = 4,
    Disconnect = 6,
    Response = 9,
    SetCursor = 18,
    Attach = 19,
    Detach = 21,
    Transaction = 29,
    Commit = 30,
    Rollback = 31,
    OpenBlob = 35,
    GetSegment = 36,
    PutSegment = 37,
    CancelBlob = 38,
    CloseBlob = 39,
    InfoBlob = 43,
    BatchSegments = 44,
    CommitRetaining = 50,
    OpenBlob2 = 56,
    CreateBlob2 = 57,
    AllocateStatement = 62,
    Execute = 63,
    ExecImmediate = 64,
    Fetch = 65,
    FetchResponse = 66,
    FreeStatement = 67,
    PrepareStatement = 68,
    InfoSql = 70,
    Dummy = 71,
    Execute2 = 76,
    SqlResponse = 78,
    RollbackRetaining = 86,
    Cancel = 91,
    ContAuth = 92,
    Ping = 93,
    AcceptData = 94,
    Crypt = 96,
    CondAccept = 98,
    FetchScroll = 112,
    InfoCursor = 113,
    InlineBlob = 114,
}

impl TryFrom<u32> for Operation {
    type Error = crate::error::Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use Operation::*;
        Ok(match value {
            1 => Connect,
            3 => Accept,
            4 => Reject,
            6 => Disconnect,
            9 => Response,
            18 => SetCursor,
            19 => Attach,
            21 => Detach,
            29 => Transaction,
            30 => Commit,
            31 => Rollback,
            35 => OpenBlob,
            36 => GetSegment,
            37 => PutSegment,
            38 => CancelBlob,
            39 => CloseBlob,
            43 => InfoBlob,
            44 => BatchSegments,
            50 => CommitRetaining,
            56 => OpenBlob2,
            57 => CreateBlob2,
            62 => AllocateStatement,
            63 => Execute,
            64 => ExecImmediate,
            65 => Fetch,
            66 => FetchResponse,
            67 => FreeStatement,
            68 => PrepareStatement,
            70 => InfoSql,
            71 => Dummy,
            76 => Execute2,
            78 => SqlResponse,
            86 => RollbackRetaining,
            91 => Cancel,
            92 => ContAuth,
            93 => Ping,
            94 => AcceptData,
            96 => Crypt,
            98 => CondAccept,
            112 => FetchScroll,
            113 => InfoCursor,
            114 => InlineBlob,
            other => return Err(crate::error::Error::UnexpectedOperation(other)),
        })
    }
}

// =============================================================================
// Protocol Versions
// =============================================================================

/// Protocol version numbers and connect-packet constants
#[allow(missing_docs)]
pub mod protocol {
    /// Versions 11 and later carry this flag bit on the wire
    pub const FB_PROTOCOL_FLAG: u32 = 0x8000;
    pub const FB_PROTOCOL_MASK: u32 = !FB_PROTOCOL_FLAG & 0xFFFF;

    pub const CONNECT_VERSION3: u32 = 3;
    pub const ARCH_GENERIC: u32 = 1;

    pub const PTYPE_RPC: u32 = 2;
    pub const PTYPE_BATCH_SEND: u32 = 3;
    pub const PTYPE_OUT_OF_BAND: u32 = 4;
    pub const PTYPE_LAZY_SEND: u32 = 5;
    pub const PTYPE_MASK: u32 = 0xFF;
    pub const PFLAG_COMPRESS: u32 = 0x100;

    /// Lowest version supporting lazy send (deferred responses)
    pub const LAZY_SEND_VERSION: u8 = 11;
    /// Lowest version sending a null bitmap ahead of row values
    pub const NULL_BITMAP_VERSION: u8 = 13;
    /// Lowest version carrying a statement timeout in execute
    pub const STMT_TIMEOUT_VERSION: u8 = 16;
    /// Lowest version supporting `op_fetch_scroll` and cursor flags
    pub const FETCH_SCROLL_VERSION: u8 = 18;
    /// Lowest version sending `op_inline_blob`
    pub const INLINE_BLOB_VERSION: u8 = 19;
}

// =============================================================================
// Connect Packet User Identification
// =============================================================================

/// CNCT tags used in the connect packet user-identification buffer
#[allow(missing_docs)]
pub mod cnct {
    pub const USER: u8 = 1;
    pub const PASSWD: u8 = 2;
    pub const HOST: u8 = 4;
    pub const GROUP: u8 = 5;
    pub const USER_VERIFICATION: u8 = 6;
    pub const SPECIFIC_DATA: u8 = 7;
    pub const PLUGIN_NAME: u8 = 8;
    pub const LOGIN: u8 = 9;
    pub const PLUGIN_LIST: u8 = 10;
    pub const CLIENT_CRYPT: u8 = 11;

    /// Maximum payload of one specific-data chunk (one byte is the step)
    pub const SPECIFIC_DATA_CHUNK: usize = 254;
}

/// Tags of the server key buffer (`p_acpt_keys` and `op_cont_auth` keys)
#[allow(missing_docs)]
pub mod key_tag {
    pub const KEY_TYPE: u8 = 0;
    pub const KEY_PLUGINS: u8 = 1;
    pub const KNOWN_PLUGINS: u8 = 2;
    pub const PLUGIN_SPECIFIC: u8 = 3;

    pub const SYMMETRIC: &str = "Symmetric";
}

// =============================================================================
// Status Vector
// =============================================================================

/// Status vector argument types
#[allow(missing_docs)]
pub mod isc_arg {
    pub const END: u32 = 0;
    pub const GDS: u32 = 1;
    pub const STRING: u32 = 2;
    pub const CSTRING: u32 = 3;
    pub const NUMBER: u32 = 4;
    pub const INTERPRETED: u32 = 5;
    pub const WARNING: u32 = 18;
    pub const SQL_STATE: u32 = 19;
}

/// Well-known status codes
#[allow(missing_docs)]
pub mod gds {
    pub const ARITH_EXCEPT: u32 = 335_544_321;
    pub const BAD_DB_FORMAT: u32 = 335_544_323;
    pub const BAD_REQ_HANDLE: u32 = 335_544_327;
    pub const BAD_STMT_HANDLE: u32 = 335_544_485;
    pub const CANCELLED: u32 = 335_544_794;
    pub const DSQL_CURSOR_CLOSE_ERR: u32 = 335_544_577;
    pub const LOGIN: u32 = 335_544_472;
    pub const NETWORK_ERROR: u32 = 335_544_721;
    pub const SEGMENT: u32 = 335_544_366;
    pub const SEGSTR_EOF: u32 = 335_544_367;
    pub const REQ_STMT_TIMEOUT: u32 = 335_545_268;
}

// =============================================================================
// Parameter Buffers
// =============================================================================

/// Database parameter buffer items
#[allow(missing_docs)]
pub mod dpb {
    pub const VERSION1: u8 = 1;
    pub const USER_NAME: u8 = 28;
    pub const PASSWORD: u8 = 29;
    pub const LC_CTYPE: u8 = 48;
    pub const CONNECT_TIMEOUT: u8 = 57;
    pub const SQL_DIALECT: u8 = 63;
    pub const SET_DB_CHARSET: u8 = 68;
    pub const PROCESS_ID: u8 = 71;
    pub const PROCESS_NAME: u8 = 74;
    pub const UTF8_FILENAME: u8 = 77;
    pub const SESSION_TIME_ZONE: u8 = 91;
}

/// Transaction parameter buffer items
#[allow(missing_docs)]
pub mod tpb {
    pub const VERSION3: u8 = 3;
    pub const CONSISTENCY: u8 = 1;
    pub const CONCURRENCY: u8 = 2;
    pub const WAIT: u8 = 6;
    pub const NOWAIT: u8 = 7;
    pub const READ: u8 = 8;
    pub const WRITE: u8 = 9;
    pub const READ_COMMITTED: u8 = 15;
    pub const REC_VERSION: u8 = 17;
    pub const NO_REC_VERSION: u8 = 18;
    pub const LOCK_TIMEOUT: u8 = 21;
    pub const READ_CONSISTENCY: u8 = 22;
}

/// Blob parameter buffer items
#[allow(missing_docs)]
pub mod bpb {
    pub const VERSION1: u8 = 1;
    pub const SOURCE_TYPE: u8 = 1;
    pub const TARGET_TYPE: u8 = 2;
    pub const TYPE: u8 = 3;
    pub const SOURCE_INTERP: u8 = 4;
    pub const TARGET_INTERP: u8 = 5;

    pub const TYPE_SEGMENTED: u8 = 0;
    pub const TYPE_STREAM: u8 = 1;
}

// =============================================================================
// Info Items
// =============================================================================

/// Generic info buffer items
#[allow(missing_docs)]
pub mod info {
    pub const END: u8 = 1;
    pub const TRUNCATED: u8 = 2;
    pub const ERROR: u8 = 3;
    pub const DATA_NOT_READY: u8 = 4;
}

/// Statement info items
#[allow(missing_docs)]
pub mod info_sql {
    pub const SELECT: u8 = 4;
    pub const BIND: u8 = 5;
    pub const NUM_VARIABLES: u8 = 6;
    pub const DESCRIBE_VARS: u8 = 7;
    pub const DESCRIBE_END: u8 = 8;
    pub const SQLDA_SEQ: u8 = 9;
    pub const MESSAGE_SEQ: u8 = 10;
    pub const TYPE: u8 = 11;
    pub const SUB_TYPE: u8 = 12;
    pub const SCALE: u8 = 13;
    pub const LENGTH: u8 = 14;
    pub const NULL_IND: u8 = 15;
    pub const FIELD: u8 = 16;
    pub const RELATION: u8 = 17;
    pub const OWNER: u8 = 18;
    pub const ALIAS: u8 = 19;
    pub const SQLDA_START: u8 = 20;
    pub const STMT_TYPE: u8 = 21;
    pub const GET_PLAN: u8 = 22;
    pub const RECORDS: u8 = 23;
    pub const BATCH_FETCH: u8 = 24;
    pub const RELATION_ALIAS: u8 = 25;
    pub const EXPLAIN_PLAN: u8 = 26;
    pub const STMT_FLAGS: u8 = 27;
}

/// Sub-items of `isc_info_sql_records`
#[allow(missing_docs)]
pub mod req_count {
    pub const SELECT: u8 = 13;
    pub const INSERT: u8 = 14;
    pub const UPDATE: u8 = 15;
    pub const DELETE: u8 = 16;
}

/// Blob info items
#[allow(missing_docs)]
pub mod info_blob {
    pub const NUM_SEGMENTS: u8 = 4;
    pub const MAX_SEGMENT: u8 = 5;
    pub const TOTAL_LENGTH: u8 = 6;
    pub const TYPE: u8 = 7;
}

// =============================================================================
// Statements
// =============================================================================

/// Statement type as reported by `isc_info_sql_stmt_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum StatementType {
    Select = 1,
    Insert = 2,
    Update = 3,
    Delete = 4,
    Ddl = 5,
    GetSegment = 6,
    PutSegment = 7,
    ExecProcedure = 8,
    StartTransaction = 9,
    Commit = 10,
    Rollback = 11,
    SelectForUpdate = 12,
    SetGenerator = 13,
    Savepoint = 14,
}

impl StatementType {
    /// Whether executing the statement opens a server cursor
    pub fn opens_cursor(self) -> bool {
        matches!(self, StatementType::Select | StatementType::SelectForUpdate)
    }
}

impl TryFrom<u32> for StatementType {
    type Error = crate::error::Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use StatementType::*;
        Ok(match value {
            1 => Select,
            2 => Insert,
            3 => Update,
            4 => Delete,
            5 => Ddl,
            6 => GetSegment,
            7 => PutSegment,
            8 => ExecProcedure,
            9 => StartTransaction,
            10 => Commit,
            11 => Rollback,
            12 => SelectForUpdate,
            13 => SetGenerator,
            14 => Savepoint,
            other => {
                return Err(crate::error::Error::Protocol(format!(
                    "unknown statement type {}",
                    other
                )))
            }
        })
    }
}

/// Options of `op_free_statement`
#[allow(missing_docs)]
pub mod free_option {
    pub const CLOSE: u32 = 1;
    pub const DROP: u32 = 2;
    pub const UNPREPARE: u32 = 4;
}

/// Cursor flags sent with execute (protocol 18+)
#[allow(missing_docs)]
pub mod cursor_flags {
    pub const NONE: u32 = 0;
    pub const SCROLLABLE: u32 = 1;
}

/// Fetch status values of `op_fetch_response`
#[allow(missing_docs)]
pub mod fetch_status {
    pub const OK: u32 = 0;
    pub const NO_MORE_ROWS: u32 = 100;
}

/// Positioning operations of `op_fetch_scroll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum ScrollOp {
    Next = 0,
    Prior = 1,
    First = 2,
    Last = 3,
    Absolute = 4,
    Relative = 5,
}

// =============================================================================
// SQL Types
// =============================================================================

/// SQL data type codes (nullability bit removed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum SqlType {
    Varying = 448,
    Text = 452,
    Double = 480,
    Float = 482,
    Long = 496,
    Short = 500,
    Timestamp = 510,
    Blob = 520,
    DFloat = 530,
    Array = 540,
    Quad = 550,
    Time = 560,
    Date = 570,
    Int64 = 580,
    TimestampTzEx = 32748,
    TimeTzEx = 32750,
    Int128 = 32752,
    TimestampTz = 32754,
    TimeTz = 32756,
    Dec16 = 32760,
    Dec34 = 32762,
    Boolean = 32764,
    Null = 32766,
}

impl SqlType {
    /// Decode a raw type code, ignoring the nullability bit
    pub fn from_code(code: u32) -> Option<SqlType> {
        use SqlType::*;
        Some(match code & !1 {
            448 => Varying,
            452 => Text,
            480 => Double,
            482 => Float,
            496 => Long,
            500 => Short,
            510 => Timestamp,
            520 => Blob,
            530 => DFloat,
            540 => Array,
            550 => Quad,
            560 => Time,
            570 => Date,
            580 => Int64,
            32748 => TimestampTzEx,
            32750 => TimeTzEx,
            32752 => Int128,
            32754 => TimestampTz,
            32756 => TimeTz,
            32760 => Dec16,
            32762 => Dec34,
            32764 => Boolean,
            32766 => Null,
            _ => return None,
        })
    }

    /// Raw type code without the nullability bit
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Character set ids that affect padding
#[allow(missing_docs)]
pub mod charset {
    pub const NONE: u16 = 0;
    pub const OCTETS: u16 = 1;
    pub const UTF8: u16 = 4;
}

// =============================================================================
// BLR
// =============================================================================

/// BLR verbs used in message descriptions
#[allow(missing_docs)]
pub mod blr {
    pub const VERSION5: u8 = 5;
    pub const BEGIN: u8 = 2;
    pub const MESSAGE: u8 = 4;
    pub const END: u8 = 255;
    pub const EOC: u8 = 76;

    pub const SHORT: u8 = 7;
    pub const LONG: u8 = 8;
    pub const QUAD: u8 = 9;
    pub const FLOAT: u8 = 10;
    pub const D_FLOAT: u8 = 11;
    pub const SQL_DATE: u8 = 12;
    pub const SQL_TIME: u8 = 13;
    pub const TEXT2: u8 = 15;
    pub const INT64: u8 = 16;
    pub const BOOL: u8 = 23;
    pub const DEC64: u8 = 24;
    pub const DEC128: u8 = 25;
    pub const INT128: u8 = 26;
    pub const DOUBLE: u8 = 27;
    pub const SQL_TIME_TZ: u8 = 28;
    pub const TIMESTAMP_TZ: u8 = 29;
    pub const EX_TIME_TZ: u8 = 30;
    pub const EX_TIMESTAMP_TZ: u8 = 31;
    pub const TIMESTAMP: u8 = 35;
    pub const VARYING2: u8 = 38;
}

// =============================================================================
// Blobs
// =============================================================================

/// Largest segment the server accepts in one `op_put_segment`
pub const MAX_SEGMENT_SIZE: usize = 32_765;

/// Object value of `op_response` to `op_get_segment` at end of blob
pub const SEGMENT_EOF: u32 = 2;

/// Object value of `op_response` to `op_get_segment` for a partial segment
pub const SEGMENT_PARTIAL: u32 = 1;
