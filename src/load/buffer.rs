// src/load/buffer.rs
//
// Wire format for the bulk-copy path: one record per line, `|` between
// cells. Numeric cells and the bare NULL token are written as-is; text is
// always quoted with `'` (embedded quotes doubled), so free-text fields can
// carry delimiters, quotes and even newlines, and a literal "null" string
// stays distinguishable from NULL.

use crate::schema::ColumnType;
use anyhow::{bail, Result};
use duckdb::types::Value;

pub const DELIMITER: char = '|';
pub const QUOTE: char = '\'';
pub const NULL_TOKEN: &str = "null";

/// Serialize a record set into the delimited buffer.
pub fn write_delimited(rows: &[Vec<Value>]) -> Result<String> {
    let mut out = String::new();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            push_cell(&mut out, cell)?;
        }
        out.push('\n');
    }
    Ok(out)
}

fn push_cell(out: &mut String, cell: &Value) -> Result<()> {
    match cell {
        Value::Null => out.push_str(NULL_TOKEN),
        Value::BigInt(i) => out.push_str(&i.to_string()),
        // Display for f64 is shortest-exact, so the value survives the trip.
        Value::Double(f) => out.push_str(&f.to_string()),
        Value::Text(s) => {
            out.push(QUOTE);
            for ch in s.chars() {
                if ch == QUOTE {
                    out.push(QUOTE);
                }
                out.push(ch);
            }
            out.push(QUOTE);
        }
        other => bail!("unsupported cell type in bulk buffer: {other:?}"),
    }
    Ok(())
}

/// Parse the buffer back into typed rows. Column types come from the target
/// relation's spec; arity or type mismatches are hard errors because they
/// mean the buffer is corrupt, not that the data is bad.
pub fn read_delimited(buf: &str, types: &[ColumnType]) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    let mut chars = buf.chars().peekable();
    let mut cells: Vec<(String, bool)> = Vec::new();
    let mut cur = String::new();
    let mut cur_quoted = false;
    let mut in_quotes = false;
    let mut row_no = 1usize;

    loop {
        let c = chars.next();
        match c {
            Some(ch) if ch == QUOTE && in_quotes => {
                if chars.peek() == Some(&QUOTE) {
                    chars.next();
                    cur.push(QUOTE);
                } else {
                    in_quotes = false;
                }
            }
            Some(ch) if ch == QUOTE && cur.is_empty() && !cur_quoted => {
                in_quotes = true;
                cur_quoted = true;
            }
            Some(ch) if in_quotes => cur.push(ch),
            Some(ch) if ch == DELIMITER => {
                cells.push((std::mem::take(&mut cur), cur_quoted));
                cur_quoted = false;
            }
            Some('\n') | None => {
                let blank = cells.is_empty() && cur.is_empty() && !cur_quoted;
                if !blank {
                    cells.push((std::mem::take(&mut cur), cur_quoted));
                    cur_quoted = false;
                    rows.push(convert_row(&cells, types, row_no)?);
                    cells.clear();
                    row_no += 1;
                }
                if c.is_none() {
                    if in_quotes {
                        bail!("row {row_no}: unterminated quoted cell");
                    }
                    break;
                }
            }
            Some(ch) => cur.push(ch),
        }
    }
    Ok(rows)
}

fn convert_row(cells: &[(String, bool)], types: &[ColumnType], row_no: usize) -> Result<Vec<Value>> {
    if cells.len() != types.len() {
        bail!(
            "row {row_no}: expected {} columns, found {}",
            types.len(),
            cells.len()
        );
    }
    cells
        .iter()
        .zip(types)
        .map(|((text, quoted), ctype)| {
            if !quoted && text == NULL_TOKEN {
                return Ok(Value::Null);
            }
            match ctype {
                ColumnType::BigInt => text
                    .parse::<i64>()
                    .map(Value::BigInt)
                    .map_err(|e| anyhow::anyhow!("row {row_no}: bad integer `{text}`: {e}")),
                ColumnType::Double => text
                    .parse::<f64>()
                    .map(Value::Double)
                    .map_err(|e| anyhow::anyhow!("row {row_no}: bad double `{text}`: {e}")),
                ColumnType::Text => Ok(Value::Text(text.clone())),
            }
        })
        .collect()
}
