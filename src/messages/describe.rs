//! Statement describe info
//!
//! The prepare reply carries `op_info_sql`-style items describing the
//! statement type and its output (`isc_info_sql_select`) and input
//! (`isc_info_sql_bind`) fields:
//!
//! ```text
//! stmt_type len value
//! select
//!   describe_vars len count
//!   sqlda_seq len index  type .. sub_type .. scale .. length .. field .. alias ..
//!   describe_end
//!   ...
//! bind
//!   ...
//! end | truncated
//! ```
//!
//! `select`, `bind` and `describe_end` carry no length. A truncated reply is
//! continued with `op_info_sql`, starting at the next field through
//! `isc_info_sql_sqlda_start`.

use crate::codec::pb::vax_integer;
use crate::codec::FieldDescriptor;
use crate::constants::{info, info_sql, req_count, SqlType, StatementType};
use crate::error::{Error, Result};

/// Items describing one field list
pub const DESCRIBE_ITEMS: [u8; 11] = [
    info_sql::DESCRIBE_VARS,
    info_sql::SQLDA_SEQ,
    info_sql::TYPE,
    info_sql::SUB_TYPE,
    info_sql::SCALE,
    info_sql::LENGTH,
    info_sql::FIELD,
    info_sql::ALIAS,
    info_sql::RELATION,
    info_sql::OWNER,
    info_sql::DESCRIBE_END,
];

/// Size of the info buffer the server may fill
pub const DESCRIBE_BUFFER_LENGTH: u32 = 32_000;

/// Items sent with `op_prepare_statement`
pub fn prepare_items() -> Vec<u8> {
    let mut items = Vec::with_capacity(2 * DESCRIBE_ITEMS.len() + 3);
    items.push(info_sql::STMT_TYPE);
    items.push(info_sql::SELECT);
    items.extend_from_slice(&DESCRIBE_ITEMS);
    items.push(info_sql::BIND);
    items.extend_from_slice(&DESCRIBE_ITEMS);
    items
}

/// Which field list is being described
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Output fields
    Select,
    /// Input parameters
    Bind,
}

impl Section {
    fn tag(self) -> u8 {
        match self {
            Section::Select => info_sql::SELECT,
            Section::Bind => info_sql::BIND,
        }
    }
}

#[derive(Debug, Default)]
struct RawField {
    type_code: Option<u32>,
    sub_type: i32,
    scale: i32,
    length: u32,
    field_name: String,
    relation_name: String,
    owner_name: String,
    alias: String,
    complete: bool,
}

impl RawField {
    fn into_descriptor(self, index: usize) -> Result<FieldDescriptor> {
        let code = self
            .type_code
            .ok_or_else(|| Error::protocol(format!("field {} was not described", index + 1)))?;
        let sql_type = SqlType::from_code(code)
            .ok_or_else(|| Error::protocol(format!("field {} has unknown SQL type {}", index + 1, code)))?;
        let charset_id = match sql_type {
            SqlType::Text | SqlType::Varying => (self.sub_type & 0xFF) as u16,
            _ => 0,
        };
        Ok(FieldDescriptor {
            sql_type,
            nullable: code & 1 != 0,
            sub_type: self.sub_type,
            scale: self.scale,
            length: self.length,
            charset_id,
            field_name: self.field_name,
            relation_name: self.relation_name,
            owner_name: self.owner_name,
            alias: self.alias,
        })
    }
}

#[derive(Debug, Default)]
struct FieldList {
    count: Option<usize>,
    fields: Vec<RawField>,
}

impl FieldList {
    fn is_complete(&self) -> bool {
        self.count.map_or(true, |n| self.fields.len() >= n)
    }

    fn finish(self) -> Result<Vec<FieldDescriptor>> {
        let count = self.count.unwrap_or(0);
        if self.fields.len() != count {
            return Err(Error::protocol(format!(
                "described {} of {} fields",
                self.fields.len(),
                count
            )));
        }
        self.fields
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.into_descriptor(i))
            .collect()
    }
}

/// Described statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDescription {
    /// Statement type, if requested
    pub statement_type: Option<StatementType>,
    /// Output fields
    pub output: Vec<FieldDescriptor>,
    /// Input parameters
    pub input: Vec<FieldDescriptor>,
}

/// Accumulates describe info across truncated replies
#[derive(Debug, Default)]
pub struct DescribeParser {
    statement_type: Option<StatementType>,
    select: FieldList,
    bind: FieldList,
    section: Option<Section>,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::protocol("describe info ended without isc_info_end"))?;
        self.pos += 1;
        Ok(b)
    }

    fn value(&mut self) -> Result<&'a [u8]> {
        let lo = self.byte()?;
        let hi = self.byte()?;
        let len = u16::from_le_bytes([lo, hi]) as usize;
        let value = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or_else(|| Error::protocol("truncated describe item"))?;
        self.pos += len;
        Ok(value)
    }

    fn int(&mut self) -> Result<i64> {
        self.value().map(vax_integer)
    }

    fn string(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.value()?).into_owned())
    }
}

impl DescribeParser {
    /// Empty parser
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&mut self) -> Result<&mut FieldList> {
        match self.section {
            Some(Section::Select) => Ok(&mut self.select),
            Some(Section::Bind) => Ok(&mut self.bind),
            None => Err(Error::protocol("field info outside select or bind section")),
        }
    }

    fn current(&mut self) -> Result<&mut RawField> {
        self.list()?
            .fields
            .last_mut()
            .ok_or_else(|| Error::protocol("field info before isc_info_sql_sqlda_seq"))
    }

    /// Feed one info reply
    ///
    /// Returns the items of the follow-up `op_info_sql` request if the reply
    /// was truncated, `None` once the description is complete.
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut cur = Cursor { data, pos: 0 };
        loop {
            let tag = cur.byte()?;
            match tag {
                info::END => return Ok(None),
                info::TRUNCATED => return self.continuation().map(Some),
                info::ERROR => return Err(Error::protocol("server could not describe statement")),
                info_sql::STMT_TYPE => {
                    let code = cur.int()?;
                    self.statement_type = Some(StatementType::try_from(code as u32)?);
                }
                info_sql::SELECT => self.section = Some(Section::Select),
                info_sql::BIND => self.section = Some(Section::Bind),
                info_sql::DESCRIBE_END => {
                    if let Ok(field) = self.current() {
                        field.complete = true;
                    }
                }
                info_sql::DESCRIBE_VARS => {
                    let count = cur.int()?.max(0) as usize;
                    self.list()?.count = Some(count);
                }
                info_sql::SQLDA_SEQ => {
                    let index = cur.int()?.max(1) as usize;
                    let list = self.list()?;
                    if index != list.fields.len() + 1 {
                        return Err(Error::protocol(format!(
                            "describe index {} out of sequence (expected {})",
                            index,
                            list.fields.len() + 1
                        )));
                    }
                    list.fields.push(RawField::default());
                }
                info_sql::TYPE => {
                    let v = cur.int()?;
                    self.current()?.type_code = Some(v as u32);
                }
                info_sql::SUB_TYPE => {
                    let v = cur.int()?;
                    self.current()?.sub_type = v as i32;
                }
                info_sql::SCALE => {
                    let v = cur.int()?;
                    self.current()?.scale = v as i32;
                }
                info_sql::LENGTH => {
                    let v = cur.int()?;
                    self.current()?.length = v as u32;
                }
                info_sql::FIELD => {
                    let v = cur.string()?;
                    self.current()?.field_name = v;
                }
                info_sql::RELATION => {
                    let v = cur.string()?;
                    self.current()?.relation_name = v;
                }
                info_sql::OWNER => {
                    let v = cur.string()?;
                    self.current()?.owner_name = v;
                }
                info_sql::ALIAS => {
                    let v = cur.string()?;
                    self.current()?.alias = v;
                }
                _ => {
                    cur.value()?;
                }
            }
        }
    }

    /// Items continuing after the last fully described field
    fn continuation(&mut self) -> Result<Vec<u8>> {
        // A field cut mid-description is requested again
        for section in [Section::Select, Section::Bind] {
            let list = match section {
                Section::Select => &mut self.select,
                Section::Bind => &mut self.bind,
            };
            if list.fields.last().is_some_and(|f| !f.complete) {
                list.fields.pop();
            }
        }

        let section = if !self.select.is_complete() || self.select.count.is_none() {
            Section::Select
        } else if !self.bind.is_complete() || self.bind.count.is_none() {
            Section::Bind
        } else {
            return Err(Error::protocol("describe truncated with nothing left to describe"));
        };
        let next = match section {
            Section::Select => self.select.fields.len() + 1,
            Section::Bind => self.bind.fields.len() + 1,
        };
        tracing::trace!(?section, next, "describe truncated, continuing");

        let mut items = Vec::with_capacity(DESCRIBE_ITEMS.len() * 2 + 8);
        items.push(info_sql::SQLDA_START);
        items.extend_from_slice(&2u16.to_le_bytes());
        items.extend_from_slice(&(next as u16).to_le_bytes());
        items.push(section.tag());
        items.extend_from_slice(&DESCRIBE_ITEMS);
        if section == Section::Select {
            items.push(info_sql::BIND);
            items.extend_from_slice(&DESCRIBE_ITEMS);
        }
        Ok(items)
    }

    /// Finish once the server sent `isc_info_end`
    pub fn finish(self) -> Result<StatementDescription> {
        Ok(StatementDescription {
            statement_type: self.statement_type,
            output: self.select.finish()?,
            input: self.bind.finish()?,
        })
    }
}

/// Rows touched by the last execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    /// Rows selected
    pub selected: u64,
    /// Rows inserted
    pub inserted: u64,
    /// Rows updated
    pub updated: u64,
    /// Rows deleted
    pub deleted: u64,
}

impl RecordCounts {
    /// Rows changed by DML
    pub fn affected(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }

    /// Parse the reply to an `isc_info_sql_records` request
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cur = Cursor { data, pos: 0 };
        let mut counts = RecordCounts::default();
        loop {
            match cur.byte()? {
                info::END => return Ok(counts),
                info_sql::RECORDS => {
                    let nested = cur.value()?;
                    let mut inner = Cursor { data: nested, pos: 0 };
                    while inner.pos < nested.len() {
                        let tag = inner.byte()?;
                        if tag == info::END {
                            break;
                        }
                        let value = inner.int()?.max(0) as u64;
                        match tag {
                            req_count::SELECT => counts.selected = value,
                            req_count::INSERT => counts.inserted = value,
                            req_count::UPDATE => counts.updated = value,
                            req_count::DELETE => counts.deleted = value,
                            _ => {}
                        }
                    }
                }
                info::TRUNCATED => return Err(Error::protocol("record count info truncated")),
                _ => {
                    cur.value()?;
                }
            }
        }
    }
}
