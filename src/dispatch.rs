//! Sends a reply either inline in chunks or as one attachment.

use chrono::Local;
use serde::Deserialize;

use crate::error::{BotError, BotResult};
use crate::types::ReportRow;
use crate::webex::ChatTransport;

pub(crate) const ATTACHMENT_NOTICE: &str = "📎 ข้อมูลยาวเกิน แนบเป็นไฟล์แทน (output is too long, sending it as a file)";
const TEXT_ATTACHMENT_NAME: &str = "data.txt";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AttachmentFormat {
    /// The rendered text as a plain-text file.
    #[default]
    Txt,
    /// One row per record, one column per distinct header.
    Csv,
}

impl AttachmentFormat {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(AttachmentFormat::Txt),
            "csv" => Some(AttachmentFormat::Csv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DispatchSettings {
    /// Replies longer than this many characters become attachments.
    pub(crate) inline_limit: usize,
    /// Maximum characters per posted message.
    pub(crate) chunk_limit: usize,
    /// Maximum UTF-8 bytes per posted message.
    pub(crate) max_message_bytes: usize,
    pub(crate) attachment_format: AttachmentFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    Inline { chunks: usize },
    Attachment { filename: String },
}

/// Delivers `text` to `room_id`. Takes exactly one path: inline chunks, or a
/// notice followed by a single file. The full text is never posted inline
/// once the attachment path is chosen.
pub(crate) fn deliver(
    transport: &dyn ChatTransport,
    room_id: &str,
    text: &str,
    rows: Option<&[ReportRow]>,
    label: &str,
    settings: &DispatchSettings,
) -> BotResult<Delivery> {
    let length = text.chars().count();
    if length <= settings.inline_limit {
        let chunks = split_text_chunks(text, settings.chunk_limit, settings.max_message_bytes);
        for chunk in &chunks {
            transport.post_text(room_id, chunk)?;
        }
        tracing::debug!(room = room_id, chunks = chunks.len(), length, "sent inline reply");
        return Ok(Delivery::Inline { chunks: chunks.len() });
    }

    let (filename, bytes, mime) = match (settings.attachment_format, rows) {
        (AttachmentFormat::Csv, Some(rows)) if !rows.is_empty() => {
            (csv_file_name(label), render_csv(rows)?, "text/csv")
        }
        _ => (TEXT_ATTACHMENT_NAME.to_string(), text.as_bytes().to_vec(), "text/plain"),
    };
    transport.post_text(room_id, ATTACHMENT_NOTICE)?;
    transport
        .post_file(room_id, &filename, bytes, mime)
        .map_err(|err| BotError::Attachment {
            filename: filename.clone(),
            source: Box::new(err),
        })?;
    tracing::info!(room = room_id, %filename, length, "sent reply as attachment");
    Ok(Delivery::Attachment { filename })
}

#[derive(Debug, Clone, Copy)]
struct ChunkLimits {
    max_chars: usize,
    max_bytes: usize,
}

impl ChunkLimits {
    fn fits(&self, text: &str) -> bool {
        text.len() <= self.max_bytes && text.chars().count() <= self.max_chars
    }
}

/// Splits on paragraph breaks, then on line breaks, then between characters,
/// packing as much as fits into each chunk. Inside a chunk the text is kept
/// verbatim, blank lines included. The separator at a chunk boundary is
/// dropped, and so is any chunk that would hold only whitespace.
pub(crate) fn split_text_chunks(text: &str, max_chars: usize, max_bytes: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let limits = ChunkLimits {
        max_chars: max_chars.max(1),
        max_bytes: max_bytes.max(4),
    };
    let mut chunks = Vec::new();
    pack(text, &["\n\n", "\n"], limits, &mut chunks);
    chunks
}

fn pack(text: &str, separators: &[&str], limits: ChunkLimits, out: &mut Vec<String>) {
    let Some((sep, finer)) = separators.split_first() else {
        hard_split(text, limits, out);
        return;
    };
    // `None` until the first unit; an empty unit still carries its separator.
    let mut current: Option<String> = None;
    for unit in text.split(sep) {
        if !limits.fits(unit) {
            if let Some(done) = current.take() {
                push_chunk(out, done);
            }
            pack(unit, finer, limits, out);
            continue;
        }
        current = Some(match current.take() {
            None => unit.to_string(),
            Some(open) => {
                let joined = format!("{open}{sep}{unit}");
                if limits.fits(&joined) {
                    joined
                } else {
                    push_chunk(out, open);
                    unit.to_string()
                }
            }
        });
    }
    if let Some(done) = current {
        push_chunk(out, done);
    }
}

fn push_chunk(out: &mut Vec<String>, chunk: String) {
    if !chunk.trim().is_empty() {
        out.push(chunk);
    }
}

fn hard_split(text: &str, limits: ChunkLimits, out: &mut Vec<String>) {
    let mut current = String::new();
    let mut count = 0usize;
    for ch in text.chars() {
        if count >= limits.max_chars || current.len() + ch.len_utf8() > limits.max_bytes {
            out.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        out.push(current);
    }
}

/// Spreadsheet-friendly CSV: BOM, a header row, then one row per record.
pub(crate) fn render_csv(rows: &[ReportRow]) -> BotResult<Vec<u8>> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for (header, _) in &row.fields {
            if !header.is_empty() && !columns.contains(&header.as_str()) {
                columns.push(header);
            }
        }
    }

    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::WriterBuilder::new().from_writer(&mut buffer);
        let mut header_row = vec!["ชีต", "แถว", "sheet row"];
        header_row.extend(columns.iter().copied());
        writer.write_record(&header_row)?;
        for row in rows {
            let mut record = vec![row.table.clone(), row.data_row.to_string(), row.sheet_row.to_string()];
            record.extend(columns.iter().map(|column| {
                row.fields
                    .iter()
                    .find(|(header, _)| header == column)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_default()
            }));
            writer.write_record(&record)?;
        }
        writer.flush()?;
    }
    Ok(buffer)
}

fn csv_file_name(label: &str) -> String {
    let stem: String = label
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let stem = if stem.trim_matches('_').is_empty() { "data".to_string() } else { stem };
    format!("{stem}-{}.csv", Local::now().format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    fn settings(inline_limit: usize) -> DispatchSettings {
        DispatchSettings {
            inline_limit,
            chunk_limit: 200,
            max_message_bytes: 7439,
            attachment_format: AttachmentFormat::Txt,
        }
    }

    fn row(table: &str, fields: &[(&str, &str)]) -> ReportRow {
        ReportRow {
            table: table.into(),
            data_row: 1,
            sheet_row: 3,
            fields: fields.iter().map(|(h, v)| (h.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn short_output_is_posted_inline_only() {
        let transport = FakeTransport::new();
        let text = "x".repeat(400);
        let delivery = deliver(&transport, "room", &text, None, "Jobs", &DispatchSettings {
            chunk_limit: 500,
            ..settings(500)
        })
        .unwrap();
        assert_eq!(delivery, Delivery::Inline { chunks: 1 });
        assert_eq!(transport.texts(), vec![text]);
        assert!(transport.files().is_empty());
    }

    #[test]
    fn long_output_sends_notice_then_one_file() {
        let transport = FakeTransport::new();
        let text = "y".repeat(600);
        let delivery = deliver(&transport, "room", &text, None, "Jobs", &settings(500)).unwrap();
        assert_eq!(delivery, Delivery::Attachment { filename: "data.txt".into() });
        assert_eq!(transport.calls(), vec!["text room", "file room data.txt"]);
        assert_eq!(transport.texts(), vec![ATTACHMENT_NOTICE.to_string()]);
        let files = transport.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, text.as_bytes());
        assert_eq!(files[0].2, "text/plain");
    }

    #[test]
    fn csv_attachment_uses_structured_rows() {
        let transport = FakeTransport::new();
        let rows = vec![row("Jobs", &[("Task", "Dig"), ("Owner", "Somchai")])];
        let delivery = deliver(&transport, "room", &"z".repeat(50), Some(&rows), "July Report", &DispatchSettings {
            attachment_format: AttachmentFormat::Csv,
            ..settings(10)
        })
        .unwrap();
        let Delivery::Attachment { filename } = delivery else {
            panic!("expected attachment");
        };
        assert!(filename.starts_with("July_Report-"));
        assert!(filename.ends_with(".csv"));
        let files = transport.files();
        assert_eq!(files[0].2, "text/csv");
        let body = String::from_utf8(files[0].1[3..].to_vec()).unwrap();
        assert_eq!(body, "ชีต,แถว,sheet row,Task,Owner\nJobs,1,3,Dig,Somchai\n");
    }

    #[test]
    fn csv_without_rows_falls_back_to_text_file() {
        let transport = FakeTransport::new();
        let delivery = deliver(&transport, "room", &"z".repeat(50), None, "x", &DispatchSettings {
            attachment_format: AttachmentFormat::Csv,
            ..settings(10)
        })
        .unwrap();
        assert_eq!(delivery, Delivery::Attachment { filename: "data.txt".into() });
    }

    #[test]
    fn render_csv_unions_headers_in_first_seen_order() {
        let rows = vec![
            row("A", &[("Task", "1"), ("Owner", "x")]),
            row("B", &[("Task", "2"), ("Note", "has, comma")]),
        ];
        let bytes = render_csv(&rows).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let body = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(
            body,
            "ชีต,แถว,sheet row,Task,Owner,Note\nA,1,3,1,x,\nB,1,3,2,,\"has, comma\"\n"
        );
    }

    #[test]
    fn chunks_respect_paragraph_boundaries() {
        let blocks: Vec<String> = (0..5).map(|i| format!("block {i}\n{}", "a".repeat(80))).collect();
        let text = blocks.join("\n\n");
        let chunks = split_text_chunks(&text, 200, 7439);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200);
            assert!(chunk.starts_with("block "));
        }
        assert_eq!(chunks.join("\n\n"), text);
    }

    #[test]
    fn blank_lines_inside_a_chunk_are_kept() {
        let text = "a\n\n\n\nb\n\n\n\n\nc";
        assert_eq!(split_text_chunks(text, 200, 7439), vec![text.to_string()]);
    }

    #[test]
    fn boundary_separators_are_the_only_text_dropped() {
        let text = "aaaa\n\n\n\nbb\n\ncccc";
        let chunks = split_text_chunks(text, 8, 7439);
        assert_eq!(chunks, vec!["aaaa\n\n", "bb\n\ncccc"]);
        assert_eq!(chunks.join("\n\n"), text);
    }

    #[test]
    fn failed_upload_after_notice_names_the_attachment() {
        let transport = FakeTransport::failing_files("");
        let err = deliver(&transport, "room", &"y".repeat(600), None, "Jobs", &settings(500)).unwrap_err();
        assert!(matches!(&err, BotError::Attachment { filename, .. } if filename == "data.txt"));
        assert_eq!(transport.calls(), vec!["text room", "file room data.txt"]);
        assert_eq!(transport.texts(), vec![ATTACHMENT_NOTICE.to_string()]);
    }

    #[test]
    fn oversized_lines_are_split_between_characters() {
        let text = "ก".repeat(25);
        let chunks = split_text_chunks(&text, 10, 7439);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn byte_limit_is_enforced_for_multibyte_text() {
        let text = "ข".repeat(10);
        let chunks = split_text_chunks(&text, 100, 9);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() <= 9));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn empty_text_posts_nothing() {
        assert!(split_text_chunks("  ", 10, 100).is_empty());
        let transport = FakeTransport::new();
        let delivery = deliver(&transport, "room", "", None, "x", &settings(500)).unwrap();
        assert_eq!(delivery, Delivery::Inline { chunks: 0 });
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn attachment_format_parses() {
        assert_eq!(AttachmentFormat::parse("CSV"), Some(AttachmentFormat::Csv));
        assert_eq!(AttachmentFormat::parse("text"), Some(AttachmentFormat::Txt));
        assert_eq!(AttachmentFormat::parse("xlsx"), None);
    }
}
