//! Plain-text renderers for the listing modes.
//!
//! Tables use a simple aligned layout: a header line, a dashed rule under
//! each column, then one line per row. Columns are separated by two spaces
//! and padded to their widest cell.

use crate::models::{ObjectCollection, Table};
use std::io::{self, Write};

/// `--show` / `--list`: one row per object.
pub fn show_table<W: Write>(objects: &ObjectCollection, out: &mut W) -> io::Result<()> {
    render_table(&objects.as_table(), out)
}

/// `--exts`: the distinct extensions in use.
pub fn show_extensions<W: Write>(objects: &ObjectCollection, out: &mut W) -> io::Result<()> {
    let table = Table {
        headers: vec!["Extensions".to_string()],
        rows: objects.extension_rows(),
    };
    render_table(&table, out)
}

pub fn render_table<W: Write>(table: &Table, out: &mut W) -> io::Result<()> {
    let columns = table
        .rows
        .iter()
        .map(Vec::len)
        .chain([table.headers.len()])
        .max()
        .unwrap_or(0);

    let mut widths = vec![0usize; columns];
    for row in std::iter::once(&table.headers).chain(&table.rows) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(out, &table.headers, &widths)?;
    write_row(out, &rule, &widths)?;
    for row in &table.rows {
        write_row(out, row, &widths)?;
    }
    out.flush()
}

fn write_row<W: Write>(out: &mut W, cells: &[String], widths: &[usize]) -> io::Result<()> {
    let mut line = String::new();
    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let pad = width.saturating_sub(cell.chars().count());
        line.extend(std::iter::repeat_n(' ', pad));
    }
    writeln!(out, "{}", line.trim_end())
}
