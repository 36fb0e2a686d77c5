//! Rebuilds consumable rows from a flat `prtMarkerSuppliesEntry` walk.
//!
//! Each binding's OID carries the table column at a fixed offset and the
//! row index as its last node:
//!
//! ```text
//! 1.3.6.1.2.1.43.11.1.1 . <column> . <hrDeviceIndex> . <row>
//!                          ^ offset 10                   ^ last
//! ```
//!
//! Bindings are grouped per row, then every row is finalized. A single bad
//! binding, an incomplete row or an empty walk turns the whole result into
//! one error record: rows parsed alongside a malformed one are dropped.

use std::collections::BTreeMap;

use crate::models::ConsumableRecord;
use crate::snmp::{RawValue, VarBind};

/// Position of the column number inside a supplies OID.
pub const COLUMN_OFFSET: usize = 10;

/// Shortest OID carrying both a column and a distinct row index.
const MIN_OID_LEN: usize = COLUMN_OFFSET + 2;

const COLUMN_DESCRIPTION: u32 = 6;
const COLUMN_MAX_CAPACITY: u32 = 8;
const COLUMN_LEVEL: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("no supply rows in the returned data: {raw}")]
    Empty { raw: String },
    #[error("malformed supply data ({reason}): {raw}")]
    Malformed { reason: String, raw: String },
}

impl DataError {
    /// Error record standing in for the printer's whole supply list.
    pub fn into_record(self) -> ConsumableRecord {
        ConsumableRecord::error(format!(
            "A data level error has occurred, the printer did not return the expected supply data. {self}"
        ))
    }
}

#[derive(Debug, Default)]
struct SupplyRowBuilder {
    description: Option<Vec<u8>>,
    capacity: Option<i64>,
    remaining: Option<i64>,
}

impl SupplyRowBuilder {
    fn finish(self, row: u32) -> Result<ConsumableRecord, String> {
        let description = self
            .description
            .ok_or_else(|| format!("row {row} has no description"))?;
        let capacity = self
            .capacity
            .ok_or_else(|| format!("row {row} has no capacity"))?;
        let remaining = self
            .remaining
            .ok_or_else(|| format!("row {row} has no level"))?;
        Ok(ConsumableRecord::new(decode_description(&description), capacity, remaining))
    }
}

/// Supply records of one printer; a data error becomes a single error record.
pub fn assemble(bindings: &[VarBind]) -> Vec<ConsumableRecord> {
    match try_assemble(bindings) {
        Ok(records) => records,
        Err(e) => vec![e.into_record()],
    }
}

pub fn try_assemble(bindings: &[VarBind]) -> Result<Vec<ConsumableRecord>, DataError> {
    let malformed = |reason: String| DataError::Malformed {
        reason,
        raw: render_raw(bindings),
    };

    let mut rows: BTreeMap<u32, SupplyRowBuilder> = BTreeMap::new();
    let mut first_problem: Option<String> = None;

    for binding in bindings {
        if let Err(reason) = group_binding(&mut rows, binding) {
            first_problem.get_or_insert(reason);
        }
    }

    if let Some(reason) = first_problem {
        return Err(malformed(reason));
    }
    if rows.is_empty() {
        return Err(DataError::Empty {
            raw: render_raw(bindings),
        });
    }

    rows.into_iter()
        .map(|(row, builder)| builder.finish(row))
        .collect::<Result<Vec<_>, _>>()
        .map_err(malformed)
}

fn group_binding(rows: &mut BTreeMap<u32, SupplyRowBuilder>, binding: &VarBind) -> Result<(), String> {
    let oid = &binding.oid;
    if oid.len() < MIN_OID_LEN {
        return Err(format!("OID with {} nodes is too short", oid.len()));
    }
    let column = oid[COLUMN_OFFSET];
    let row = oid[oid.len() - 1];

    match column {
        COLUMN_DESCRIPTION => match &binding.value {
            RawValue::OctetString(bytes) => {
                rows.entry(row).or_default().description = Some(bytes.clone());
            }
            other => return Err(format!("row {row} description is not a string: {other}")),
        },
        COLUMN_MAX_CAPACITY => {
            rows.entry(row).or_default().capacity = Some(integer(row, "capacity", &binding.value)?);
        }
        COLUMN_LEVEL => {
            rows.entry(row).or_default().remaining = Some(integer(row, "level", &binding.value)?);
        }
        _ => {}
    }
    Ok(())
}

fn integer(row: u32, field: &str, value: &RawValue) -> Result<i64, String> {
    match value {
        RawValue::Integer(i) => Ok(*i),
        other => Err(format!("row {row} {field} is not an integer: {other}")),
    }
}

/// Text of a description octet string, minus one trailing NUL.
fn decode_description(bytes: &[u8]) -> String {
    let bytes = match bytes.split_last() {
        Some((&0, rest)) => rest,
        _ => bytes,
    };
    String::from_utf8_lossy(bytes).into_owned()
}

fn render_raw(bindings: &[VarBind]) -> String {
    let parts: Vec<String> = bindings.iter().map(VarBind::to_string).collect();
    format!("[{}]", parts.join(", "))
}
