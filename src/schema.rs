//! Table discovery, table-name disambiguation, and the two-row header model.

use crate::error::BotResult;
use crate::sheets::GridStore;
use crate::util::flatten_text;

/// Columns scanned per table: A through Z.
pub(crate) const MAX_COLUMNS: usize = 26;
const LAST_COLUMN: &str = "Z";
/// Placeholder for a fuzzy column lookup that found no header.
pub(crate) const MISSING_CELL: &str = "-";

/// Table names in store order, fetched fresh on every call.
pub(crate) fn list_tables(store: &dyn GridStore) -> BotResult<Vec<String>> {
    store.list_tables()
}

/// Longest-prefix match of `args` against `tables`.
///
/// Tries the longest leading run of words first and shrinks it one word at a
/// time, keeping at least `min_rest` words after the name. Returns the table
/// name and how many words it consumed.
pub(crate) fn resolve_table_prefix(
    tables: &[String],
    args: &[String],
    min_rest: usize,
) -> Option<(String, usize)> {
    let longest = args.len().checked_sub(min_rest)?;
    (1..=longest).rev().find_map(|len| {
        let candidate = args[..len].join(" ");
        tables
            .iter()
            .any(|name| *name == candidate)
            .then_some((candidate, len))
    })
}

/// `"{row1} {row2}"` per column, or row 1 alone where row 2 is blank.
pub(crate) fn merge_headers(row1: &[String], row2: &[String]) -> Vec<String> {
    let width = row1.len().max(row2.len()).min(MAX_COLUMNS);
    (0..width)
        .map(|i| {
            let top = row1.get(i).map(|s| s.trim()).unwrap_or("");
            let sub = row2.get(i).map(|s| s.trim()).unwrap_or("");
            if sub.is_empty() {
                top.to_string()
            } else {
                format!("{top} {sub}").trim().to_string()
            }
        })
        .collect()
}

/// Trimmed, case-folded, whitespace removed.
pub(crate) fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Index of the first header matching `keyword`. Header lists are searched in
/// the order given, and a later list is only consulted when no tier matched in
/// an earlier one. Within a list exact matches beat suffix matches, which beat
/// substring matches.
pub(crate) fn find_column(header_lists: &[&[String]], keyword: &str) -> Option<usize> {
    let needle = normalize_label(keyword);
    if needle.is_empty() {
        return None;
    }
    let tiers: [fn(&str, &str) -> bool; 3] = [
        |label, needle| label == needle,
        |label, needle| label.ends_with(needle),
        |label, needle| label.contains(needle),
    ];
    header_lists.iter().find_map(|headers| {
        let labels: Vec<String> = headers.iter().map(|header| normalize_label(header)).collect();
        tiers
            .iter()
            .find_map(|is_match| labels.iter().position(|label| is_match(label.as_str(), needle.as_str())))
    })
}

/// One data row. Cells line up with the table's headers; short rows are
/// padded with empty strings so every field exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub(crate) cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetTable {
    pub(crate) name: String,
    pub(crate) header_rows: usize,
    /// Merged header per scanned column. Not necessarily unique.
    pub(crate) headers: Vec<String>,
    /// Raw second header row, padded to `headers`; empty with one header row.
    pub(crate) sub_headers: Vec<String>,
    pub(crate) records: Vec<Record>,
}

impl SheetTable {
    pub(crate) fn empty(name: &str, header_rows: usize) -> Self {
        Self {
            name: name.to_string(),
            header_rows,
            headers: Vec::new(),
            sub_headers: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Builds the table from raw rows starting at the first header row.
    pub(crate) fn from_rows(name: &str, header_rows: usize, rows: Vec<Vec<String>>) -> Self {
        if rows.len() < header_rows || rows.is_empty() {
            return Self::empty(name, header_rows);
        }
        let mut rows = rows.into_iter();
        let row1 = rows.next().unwrap_or_default();
        let row2 = if header_rows >= 2 {
            rows.next().unwrap_or_default()
        } else {
            Vec::new()
        };
        let headers = merge_headers(&row1, &row2);
        let sub_headers = if header_rows >= 2 {
            (0..headers.len())
                .map(|i| row2.get(i).map(|s| s.trim().to_string()).unwrap_or_default())
                .collect()
        } else {
            Vec::new()
        };
        let width = headers.len();
        let records = rows
            .map(|mut cells| {
                cells.resize(width, String::new());
                Record { cells }
            })
            .collect();
        Self {
            name: name.to_string(),
            header_rows,
            headers,
            sub_headers,
            records,
        }
    }

    /// Number the user types to address the record at `position` (1-based data row).
    pub(crate) fn data_row(&self, position: usize) -> usize {
        position + 1
    }

    /// Absolute row of the record at `position` in the store.
    pub(crate) fn sheet_row(&self, position: usize) -> usize {
        position + 1 + self.header_rows
    }

    /// Value under the header equal to `label`, else under the first header
    /// containing it, else `""`.
    pub(crate) fn field<'a>(&'a self, record: &'a Record, label: &str) -> &'a str {
        let label = label.trim();
        if label.is_empty() {
            return "";
        }
        self.headers
            .iter()
            .position(|header| header == label)
            .or_else(|| self.headers.iter().position(|header| header.contains(label)))
            .and_then(|idx| record.cells.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Column for a loosely formatted label, checking second-row labels first.
    pub(crate) fn find_column(&self, keyword: &str) -> Option<usize> {
        find_column(&[&self.sub_headers, &self.headers], keyword)
    }

    /// Flattened value of the column matching `keyword`, or `"-"`.
    pub(crate) fn lookup(&self, record: &Record, keyword: &str) -> String {
        self.find_column(keyword)
            .map(|idx| flatten_text(record.cells.get(idx).map(String::as_str).unwrap_or("")))
            .unwrap_or_else(|| MISSING_CELL.to_string())
    }

    /// Header/value pairs in column order.
    pub(crate) fn fields(&self, record: &Record) -> Vec<(String, String)> {
        self.headers
            .iter()
            .cloned()
            .zip(record.cells.iter().cloned())
            .collect()
    }
}

/// Reads the whole scanned block of `name`: headers plus every data row.
pub(crate) fn read_table(store: &dyn GridStore, name: &str, header_rows: usize) -> BotResult<SheetTable> {
    let rows = store.read_range(name, &format!("A1:{LAST_COLUMN}"))?;
    Ok(SheetTable::from_rows(name, header_rows, rows))
}

/// Reads only the header rows; the result has no records.
pub(crate) fn read_header_block(
    store: &dyn GridStore,
    name: &str,
    header_rows: usize,
) -> BotResult<SheetTable> {
    let rows = store.read_range(name, &format!("A1:{LAST_COLUMN}{header_rows}"))?;
    Ok(SheetTable::from_rows(name, header_rows, rows))
}

/// Rows present below the header block.
pub(crate) fn count_data_rows(store: &dyn GridStore, name: &str, header_rows: usize) -> BotResult<usize> {
    let first_data_row = header_rows + 1;
    let rows = store.read_range(name, &format!("A{first_data_row}:{LAST_COLUMN}"))?;
    Ok(rows.len())
}
