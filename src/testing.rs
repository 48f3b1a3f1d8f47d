//! In-memory stand-ins for the chat transport and the grid store.

use std::sync::Mutex;

use crate::error::{BotError, BotResult};
use crate::sheets::GridStore;
use crate::types::CellAddress;
use crate::webex::ChatTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportCall {
    Fetch(String),
    Text { room: String, text: String },
    File { room: String, filename: String, bytes: Vec<u8>, mime: String },
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    message: Option<String>,
    fail_posts: bool,
    fail_files: bool,
    calls: Mutex<Vec<TransportCall>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_message(text: &str) -> Self {
        Self {
            message: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn failing_fetch() -> Self {
        Self::default()
    }

    pub(crate) fn failing_posts(text: &str) -> Self {
        Self {
            message: Some(text.to_string()),
            fail_posts: true,
            ..Self::default()
        }
    }

    /// Text posts succeed; every file upload fails.
    pub(crate) fn failing_files(text: &str) -> Self {
        Self {
            message: Some(text.to_string()),
            fail_files: true,
            ..Self::default()
        }
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn recorded(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// One short line per call: `fetch <id>`, `text <room>`, `file <room> <name>`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.recorded()
            .into_iter()
            .map(|call| match call {
                TransportCall::Fetch(id) => format!("fetch {id}"),
                TransportCall::Text { room, .. } => format!("text {room}"),
                TransportCall::File { room, filename, .. } => format!("file {room} {filename}"),
            })
            .collect()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.recorded()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn files(&self) -> Vec<(String, Vec<u8>, String)> {
        self.recorded()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::File {
                    filename, bytes, mime, ..
                } => Some((filename, bytes, mime)),
                _ => None,
            })
            .collect()
    }
}

impl ChatTransport for FakeTransport {
    fn fetch_message_text(&self, message_id: &str) -> BotResult<String> {
        self.record(TransportCall::Fetch(message_id.to_string()));
        self.message.clone().ok_or_else(|| BotError::Auth("fetch message 401: invalid token".into()))
    }

    fn post_text(&self, room_id: &str, text: &str) -> BotResult<()> {
        self.record(TransportCall::Text {
            room: room_id.to_string(),
            text: text.to_string(),
        });
        if self.fail_posts {
            return Err(BotError::Transport {
                op: "post message",
                detail: "503: unavailable".into(),
            });
        }
        Ok(())
    }

    fn post_file(&self, room_id: &str, filename: &str, bytes: Vec<u8>, mime: &str) -> BotResult<()> {
        self.record(TransportCall::File {
            room: room_id.to_string(),
            filename: filename.to_string(),
            bytes,
            mime: mime.to_string(),
        });
        if self.fail_posts || self.fail_files {
            return Err(BotError::Transport {
                op: "post file",
                detail: "503: unavailable".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeStore {
    tables: Mutex<Vec<(String, Vec<Vec<String>>)>>,
    reads: Mutex<Vec<String>>,
    writes: Mutex<Vec<(CellAddress, String)>>,
    fail_list: bool,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            fail_list: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_table(self, name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        self.tables.lock().unwrap().push((name.to_string(), rows));
        self
    }

    /// `table!span` for every read, in order.
    pub(crate) fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub(crate) fn writes(&self) -> Vec<(CellAddress, String)> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn cell(&self, table: &str, column: usize, row_number: usize) -> Option<String> {
        let tables = self.tables.lock().unwrap();
        let (_, rows) = tables.iter().find(|(name, _)| name == table)?;
        rows.get(row_number.checked_sub(1)?)?.get(column).cloned()
    }
}

/// Start row and optional end row of spans like `A1:Z`, `A1:Z2`, `A3:Z`.
fn parse_span_rows(span: &str) -> (usize, Option<usize>) {
    let (start, end) = span.split_once(':').unwrap_or((span, ""));
    let digits = |part: &str| -> Option<usize> {
        let number: String = part.chars().filter(|c| c.is_ascii_digit()).collect();
        number.parse().ok()
    };
    (digits(start).unwrap_or(1), digits(end))
}

fn column_index(letters: &str) -> usize {
    letters
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .fold(0, |acc, c| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1))
        - 1
}

impl GridStore for FakeStore {
    fn list_tables(&self) -> BotResult<Vec<String>> {
        if self.fail_list {
            return Err(BotError::Connection {
                op: "list tables",
                detail: "connection refused".into(),
            });
        }
        Ok(self.tables.lock().unwrap().iter().map(|(name, _)| name.clone()).collect())
    }

    fn read_range(&self, table: &str, span: &str) -> BotResult<Vec<Vec<String>>> {
        self.reads.lock().unwrap().push(format!("{table}!{span}"));
        let tables = self.tables.lock().unwrap();
        let Some((_, rows)) = tables.iter().find(|(name, _)| name == table) else {
            return Err(BotError::Store {
                op: "read range",
                detail: format!("400: Unable to parse range: {table}!{span}"),
            });
        };
        let (start, end) = parse_span_rows(span);
        let end = end.unwrap_or(rows.len()).min(rows.len());
        if start > end {
            return Ok(Vec::new());
        }
        Ok(rows[start - 1..end].to_vec())
    }

    fn write_cell(&self, address: &CellAddress, value: &str) -> BotResult<()> {
        self.writes.lock().unwrap().push((address.clone(), value.to_string()));
        let mut tables = self.tables.lock().unwrap();
        if let Some((_, rows)) = tables.iter_mut().find(|(name, _)| *name == address.table) {
            while rows.len() < address.row_number {
                rows.push(Vec::new());
            }
            let row = &mut rows[address.row_number - 1];
            let column = column_index(&address.column_letter);
            while row.len() <= column {
                row.push(String::new());
            }
            row[column] = value.to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_rows_parse() {
        assert_eq!(parse_span_rows("A1:Z"), (1, None));
        assert_eq!(parse_span_rows("A1:Z2"), (1, Some(2)));
        assert_eq!(parse_span_rows("A3:Z"), (3, None));
    }

    #[test]
    fn column_index_parses_letters() {
        assert_eq!(column_index("A"), 0);
        assert_eq!(column_index("Z"), 25);
        assert_eq!(column_index("AA"), 26);
    }
}
