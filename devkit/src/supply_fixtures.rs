/*!
Builds walk results shaped like a real `prtMarkerSuppliesEntry` table.

Bindings come out column by column (all descriptions, then capacities, then
levels), the order a GETNEXT walk returns them in.
*/

use printer_monitor::snmp::{RawValue, VarBind, PRT_MARKER_SUPPLIES_ENTRY};

const DESCRIPTION: u32 = 6;
const MAX_CAPACITY: u32 = 8;
const LEVEL: u32 = 9;

#[derive(Debug, Clone, Default)]
pub struct SupplyTableBuilder {
    rows: Vec<(String, i64, i64)>,
    nul_terminated: bool,
    extra: Vec<VarBind>,
}

impl SupplyTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supply(mut self, description: &str, capacity: i64, remaining: i64) -> Self {
        self.rows.push((description.to_string(), capacity, remaining));
        self
    }

    /// Descriptions sent C-style, with a trailing NUL, as many HP devices do.
    pub fn nul_terminated(mut self) -> Self {
        self.nul_terminated = true;
        self
    }

    /// Appends a hand-made binding, e.g. a malformed one.
    pub fn raw(mut self, binding: VarBind) -> Self {
        self.extra.push(binding);
        self
    }

    pub fn build(self) -> Vec<VarBind> {
        let mut out = Vec::with_capacity(self.rows.len() * 3 + self.extra.len());

        for (i, (description, _, _)) in self.rows.iter().enumerate() {
            let mut bytes = description.as_bytes().to_vec();
            if self.nul_terminated {
                bytes.push(0);
            }
            out.push(VarBind::new(cell_oid(DESCRIPTION, i), RawValue::OctetString(bytes)));
        }
        for (i, (_, capacity, _)) in self.rows.iter().enumerate() {
            out.push(VarBind::new(cell_oid(MAX_CAPACITY, i), RawValue::Integer(*capacity)));
        }
        for (i, (_, _, remaining)) in self.rows.iter().enumerate() {
            out.push(VarBind::new(cell_oid(LEVEL, i), RawValue::Integer(*remaining)));
        }

        out.extend(self.extra);
        out
    }
}

/// `<entry>.<column>.1.<row>`, rows numbered from 1.
pub fn cell_oid(column: u32, row: usize) -> Vec<u32> {
    let mut oid = PRT_MARKER_SUPPLIES_ENTRY.to_vec();
    oid.extend([column, 1, row as u32 + 1]);
    oid
}
