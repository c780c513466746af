//! Self-describing columnar chunk format.
//!
//! ```text
//! magic "AWCK" | version u16 | schema_len u32 | schema JSON | row_count u64
//! | per column, in schema order: column_len u64 | payload
//! ```
//!
//! All integers are little-endian. Payload cells:
//! - utf8: `len u32` + bytes
//! - nullable utf8: validity `u8`, then `len u32` + bytes when valid
//! - float64: IEEE-754 bits, 8 bytes
//! - nullable date: validity `u8`, then `i32` days from 0001-01-01 (CE) when valid
//!
//! The encoded size is exactly `header_len + Σ row_encoded_len`, which is what
//! lets the splitter pack chunks against a hard ceiling without trial encodes.

use chrono::{Datelike, NaiveDate};

use awards_core::error::{Error, Result};
use awards_core::schema::{fact_schema, ColumnType, TableSchema};
use awards_core::types::{FactColumn, FactRow, FieldRef, FieldValue};

pub const MAGIC: &[u8; 4] = b"AWCK";
pub const FORMAT_VERSION: u16 = 1;

const FIXED_PREFIX: u64 = 4 + 2 + 4;
const VALID: u8 = 1;
const NULL: u8 = 0;

/// Bytes a chunk spends before and between column payloads.
pub fn header_len(schema: &TableSchema) -> u64 {
    FIXED_PREFIX + schema.to_bytes().len() as u64 + 8 + 8 * schema.columns.len() as u64
}

/// Bytes one row contributes across all column payloads.
pub fn row_encoded_len(row: &FactRow) -> u64 {
    FactColumn::ALL.into_iter().map(|c| cell_len(row.field(c))).sum()
}

fn cell_len(cell: FieldRef<'_>) -> u64 {
    match cell {
        FieldRef::Text(s) => 4 + s.len() as u64,
        FieldRef::OptText(None) | FieldRef::OptDate(None) => 1,
        FieldRef::OptText(Some(s)) => 1 + 4 + s.len() as u64,
        FieldRef::Float(_) => 8,
        FieldRef::OptDate(Some(_)) => 1 + 4,
    }
}

/// Encode rows under the fact schema.
pub fn encode(rows: &[FactRow]) -> Result<Vec<u8>> {
    let schema = fact_schema();
    let schema_bytes = schema.to_bytes();
    let schema_len = u32::try_from(schema_bytes.len())
        .map_err(|_| Error::SchemaMismatch("schema header too large".into()))?;
    let body: u64 = rows.iter().map(row_encoded_len).sum();
    let mut out = Vec::with_capacity(usize::try_from(header_len(schema) + body).unwrap_or(0));

    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&schema_len.to_le_bytes());
    out.extend_from_slice(&schema_bytes);
    out.extend_from_slice(&(rows.len() as u64).to_le_bytes());

    let mut payload = Vec::new();
    for column in FactColumn::ALL {
        payload.clear();
        for row in rows {
            write_cell(&mut payload, row.field(column))?;
        }
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(&payload);
    }
    Ok(out)
}

fn write_cell(buf: &mut Vec<u8>, cell: FieldRef<'_>) -> Result<()> {
    match cell {
        FieldRef::Text(s) => write_str(buf, s)?,
        FieldRef::OptText(None) | FieldRef::OptDate(None) => buf.push(NULL),
        FieldRef::OptText(Some(s)) => {
            buf.push(VALID);
            write_str(buf, s)?;
        }
        FieldRef::Float(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
        FieldRef::OptDate(Some(d)) => {
            buf.push(VALID);
            buf.extend_from_slice(&d.num_days_from_ce().to_le_bytes());
        }
    }
    Ok(())
}

fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u32::try_from(s.len()).map_err(|_| Error::ChunkCorrupt(format!("string of {} bytes exceeds u32", s.len())))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Bounds-checked forward reader over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self { Self { bytes, pos: 0 } }

    fn remaining(&self) -> usize { self.bytes.len() - self.pos }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n { return None; }
        let bytes: &'a [u8] = self.bytes;
        let out = &bytes[self.pos..self.pos + n];
        self.pos += n;
        Some(out)
    }

    fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N).and_then(|s| s.try_into().ok())
    }

    /// Header reads: running out means the stream was cut short.
    fn need(&mut self, n: usize, section: &'static str) -> Result<&'a [u8]> {
        let available = self.remaining() as u64;
        self.take(n).ok_or(Error::Truncated { section, needed: n as u64, available })
    }

    fn need_array<const N: usize>(&mut self, section: &'static str) -> Result<[u8; N]> {
        let available = self.remaining() as u64;
        self.take_array::<N>().ok_or(Error::Truncated { section, needed: N as u64, available })
    }
}

struct Header<'a> {
    schema: TableSchema,
    row_count: u64,
    rest: Reader<'a>,
}

fn read_header(bytes: &[u8]) -> Result<Header<'_>> {
    let mut r = Reader::new(bytes);
    let magic = r.need(MAGIC.len(), "magic")?;
    if magic != MAGIC {
        return Err(Error::ChunkCorrupt(format!("bad magic {magic:?}")));
    }
    let version = u16::from_le_bytes(r.need_array("version")?);
    if version != FORMAT_VERSION {
        return Err(Error::ChunkCorrupt(format!("unsupported format version {version}")));
    }
    let schema_len = u32::from_le_bytes(r.need_array("schema length")?) as usize;
    let schema_bytes = r.need(schema_len, "schema")?;
    let schema: TableSchema = serde_json::from_slice(schema_bytes)
        .map_err(|e| Error::SchemaMismatch(format!("embedded schema unreadable: {e}")))?;
    let row_count = u64::from_le_bytes(r.need_array("row count")?);
    Ok(Header { schema, row_count, rest: r })
}

/// Read only the embedded schema.
pub fn read_schema(bytes: &[u8]) -> Result<TableSchema> {
    read_header(bytes).map(|h| h.schema)
}

/// Decode a chunk produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<(TableSchema, Vec<FactRow>)> {
    let Header { schema, row_count, rest: mut r } = read_header(bytes)?;
    if &schema != fact_schema() {
        return Err(Error::SchemaMismatch(format!(
            "embedded schema '{}' does not describe the fact row layout",
            schema.name
        )));
    }
    let needed = row_count.saturating_mul(min_row_len(&schema)).saturating_add(8 * schema.columns.len() as u64);
    if needed > r.remaining() as u64 {
        return Err(Error::Truncated { section: "rows", needed, available: r.remaining() as u64 });
    }
    let n = usize::try_from(row_count).map_err(|_| Error::ChunkCorrupt(format!("row count {row_count}")))?;
    let mut rows = vec![FactRow::default(); n];

    for def in &schema.columns {
        let column = FactColumn::from_name(&def.name)
            .ok_or_else(|| Error::SchemaMismatch(format!("unknown column {}", def.name)))?;
        let declared = u64::from_le_bytes(r.need_array("column length")?);
        let len = usize::try_from(declared).map_err(|_| Error::ChunkCorrupt(format!("column {} length {declared}", def.name)))?;
        let mut col = Reader::new(r.need(len, "column payload")?);
        for row in &mut rows {
            let value = read_cell(&mut col, def.ty, def.nullable)
                .ok_or_else(|| Error::ChunkCorrupt(format!("column {} shorter than its {n} rows", def.name)))??;
            row.set_field(column, value)?;
        }
        if col.remaining() != 0 {
            return Err(Error::ChunkCorrupt(format!(
                "column {} declares {declared} bytes, {} left unread",
                def.name,
                col.remaining()
            )));
        }
    }
    if r.remaining() != 0 {
        return Err(Error::ChunkCorrupt(format!("{} trailing bytes", r.remaining())));
    }
    Ok((schema, rows))
}

/// Smallest payload one row can occupy: a null in every nullable column.
fn min_row_len(schema: &TableSchema) -> u64 {
    schema
        .columns
        .iter()
        .map(|c| match (c.nullable, c.ty) {
            (true, _) => 1,
            (false, ColumnType::Float64) => 8,
            (false, ColumnType::Utf8 | ColumnType::Date) => 4,
        })
        .sum()
}

/// `None` when the column payload runs out; `Some(Err)` for a malformed cell.
fn read_cell(r: &mut Reader<'_>, ty: ColumnType, nullable: bool) -> Option<Result<FieldValue>> {
    if nullable {
        match r.take_array::<1>()?[0] {
            NULL => return Some(Ok(null_of(ty))),
            VALID => {}
            other => return Some(Err(Error::ChunkCorrupt(format!("validity byte {other}")))),
        }
    }
    let value = match ty {
        ColumnType::Utf8 => {
            let len = u32::from_le_bytes(r.take_array()?) as usize;
            let raw = r.take(len)?;
            match std::str::from_utf8(raw) {
                Ok(s) if nullable => FieldValue::OptText(Some(s.to_string())),
                Ok(s) => FieldValue::Text(s.to_string()),
                Err(e) => return Some(Err(Error::ChunkCorrupt(format!("invalid utf-8: {e}")))),
            }
        }
        ColumnType::Float64 => FieldValue::Float(f64::from_bits(u64::from_le_bytes(r.take_array()?))),
        ColumnType::Date => {
            let days = i32::from_le_bytes(r.take_array()?);
            match NaiveDate::from_num_days_from_ce_opt(days) {
                Some(d) => FieldValue::OptDate(Some(d)),
                None => return Some(Err(Error::ChunkCorrupt(format!("date out of range: {days}")))),
            }
        }
    };
    Some(Ok(value))
}

fn null_of(ty: ColumnType) -> FieldValue {
    match ty {
        ColumnType::Utf8 => FieldValue::OptText(None),
        ColumnType::Date => FieldValue::OptDate(None),
        // Float columns are never nullable in the fact layout; set_field rejects this.
        ColumnType::Float64 => FieldValue::Float(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reports_truncation_with_section() {
        let mut r = Reader::new(&[1, 2]);
        match r.need_array::<4>("version") {
            Err(Error::Truncated { section, needed, available }) => {
                assert_eq!((section, needed, available), ("version", 4, 2));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn all_null_row_is_the_smallest_row() {
        assert_eq!(min_row_len(fact_schema()), 22);
        let row = FactRow { id: String::new(), ..FactRow::default() };
        assert_eq!(row_encoded_len(&row), min_row_len(fact_schema()));
    }

    #[test]
    fn null_cells_cost_one_byte() {
        assert_eq!(cell_len(FieldRef::OptText(None)), 1);
        assert_eq!(cell_len(FieldRef::OptDate(None)), 1);
        assert_eq!(cell_len(FieldRef::OptText(Some("ab"))), 7);
    }
}
