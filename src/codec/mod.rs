//! Binary codecs shared by the message layer
//!
//! XDR primitives live in [`crate::buffer`]; this module builds the
//! protocol-specific encodings on top of them.

pub mod blr;
pub mod datetime;
pub mod decimal;
pub mod dpd;
pub mod pb;
pub mod row;

pub use decimal::{Decimal, DecimalFormat, DECIMAL128, DECIMAL64};
pub use dpd::DenselyPackedDecimal;
pub use pb::{InfoItems, InfoReader, ParameterBuffer};
pub use row::{FieldDescriptor, RowCodec, RowDescriptor, RowValue};
