//! Command dispatch: help, search (table dump, column projection, keyword scan) and update.

use crate::command::{classify, CommandKind};
use crate::error::BotResult;
use crate::report::{format_projection_line, format_record, join_blocks, report_row};
use crate::schema::{
    count_data_rows, list_tables, read_header_block, read_table, resolve_table_prefix, SheetTable,
};
use crate::sheets::GridStore;
use crate::types::{CellAddress, CommandInvocation, Reply, Report};
use crate::util::{column_letter, flatten_text};

pub(crate) const NOT_FOUND: &str = "❌ ไม่พบข้อมูลที่ต้องการ (no matching records)";
pub(crate) const UNKNOWN_COMMAND: &str = "❓ ไม่เข้าใจคำสั่ง ลองพิมพ์ \"help\" (unknown command, try \"help\")";
pub(crate) const SEARCH_USAGE: &str = "❗ รูปแบบคำสั่งไม่ถูกต้อง: ค้นหา <คำ | ชื่อชีต | ชื่อชีต ชื่อคอลัมน์>";
pub(crate) const UPDATE_USAGE: &str =
    "❗ รูปแบบคำสั่งไม่ถูกต้อง: แก้ไข <ชื่อชีต> <ชื่อคอลัมน์> <แถวที่> <ข้อความ>";
/// Words an update needs after the table name: column, row, value.
const UPDATE_MIN_REST: usize = 3;

#[derive(Debug, Clone)]
pub(crate) struct ExecSettings {
    /// Header rows above the data in every table (1 or 2).
    pub(crate) header_rows: usize,
    pub(crate) case_sensitive: bool,
    /// Name users address the bot with; only used in the help text.
    pub(crate) mention_name: String,
}

pub(crate) fn execute(
    store: &dyn GridStore,
    invocation: &CommandInvocation,
    settings: &ExecSettings,
) -> BotResult<Reply> {
    match classify(&invocation.command) {
        CommandKind::Help => Ok(Reply::Text(help_text(settings))),
        CommandKind::Search => search(store, invocation, settings),
        CommandKind::Update => update(store, invocation, settings),
        CommandKind::Unknown => Ok(Reply::Text(UNKNOWN_COMMAND.to_string())),
    }
}

pub(crate) fn help_text(settings: &ExecSettings) -> String {
    let bot = format!("@{}", settings.mention_name);
    let first_data_row = settings.header_rows + 1;
    [
        "📌 คำสั่งที่ใช้ได้:".to_string(),
        format!("1. {bot} ค้นหา <คำ> → ค้นหาข้อมูลทุกชีต"),
        format!("2. {bot} ค้นหา <ชื่อชีต> → ดึงข้อมูลทั้งหมดในชีต (แนบไฟล์ถ้ายาว)"),
        format!("3. {bot} ค้นหา <ชื่อชีต> <ชื่อคอลัมน์> → แสดงเฉพาะคอลัมน์นั้นทุกแถว"),
        format!("4. {bot} แก้ไข <ชื่อชีต> <ชื่อคอลัมน์> <แถวที่> <ข้อความ>"),
        format!(
            "   แถวที่ 1 = แถวข้อมูลแรก (แถว {first_data_row} ของชีต) / row 1 is the first data row (sheet row {first_data_row})"
        ),
        format!("5. {bot} help → แสดงวิธีใช้ทั้งหมด"),
        "English aliases: search, update (or edit), help".to_string(),
    ]
    .join("\n")
}

fn search(store: &dyn GridStore, invocation: &CommandInvocation, settings: &ExecSettings) -> BotResult<Reply> {
    let keyword = invocation.joined_args();
    if keyword.is_empty() {
        return Ok(Reply::Text(SEARCH_USAGE.to_string()));
    }
    let tables = list_tables(store)?;

    if tables.iter().any(|name| *name == keyword) {
        let table = read_table(store, &keyword, settings.header_rows)?;
        return Ok(dump_table(&table));
    }

    if let Some((name, used)) = resolve_table_prefix(&tables, &invocation.args, 1) {
        if invocation.args.len() - used == 1 {
            let table = read_table(store, &name, settings.header_rows)?;
            if let Some(reply) = project_column(&table, &invocation.args[used]) {
                return Ok(reply);
            }
        }
    }

    keyword_search(store, &tables, &keyword, settings)
}

fn empty_table_message(name: &str) -> String {
    format!("❌ ไม่พบข้อมูลในชีต \"{name}\" (the table has no data rows)")
}

fn dump_table(table: &SheetTable) -> Reply {
    if table.records.is_empty() {
        return Reply::Text(empty_table_message(&table.name));
    }
    let blocks: Vec<String> = table
        .records
        .iter()
        .enumerate()
        .map(|(position, record)| format_record(table, position, record))
        .collect();
    let rows = table
        .records
        .iter()
        .enumerate()
        .map(|(position, record)| report_row(table, position, record))
        .collect();
    Reply::Report(Report {
        text: join_blocks(&blocks),
        rows,
        label: table.name.clone(),
    })
}

/// `None` when `column` does not resolve, so the caller can fall back to a keyword scan.
fn project_column(table: &SheetTable, column: &str) -> Option<Reply> {
    let index = table.find_column(column)?;
    if table.records.is_empty() {
        return Some(Reply::Text(empty_table_message(&table.name)));
    }
    let header = &table.headers[index];
    let mut lines = vec![format!("📄 {} › {}", table.name, header)];
    let mut rows = Vec::with_capacity(table.records.len());
    for (position, record) in table.records.iter().enumerate() {
        let value = record.cells.get(index).map(String::as_str).unwrap_or("");
        lines.push(format_projection_line(table, position, value));
        let mut row = report_row(table, position, record);
        row.fields = vec![(header.clone(), flatten_text(value))];
        rows.push(row);
    }
    Some(Reply::Report(Report {
        text: lines.join("\n"),
        rows,
        label: format!("{}-{}", table.name, header),
    }))
}

pub(crate) fn record_matches(cells: &[String], keyword: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        cells.iter().any(|cell| flatten_text(cell).contains(keyword))
    } else {
        let needle = keyword.to_lowercase();
        cells
            .iter()
            .any(|cell| flatten_text(cell).to_lowercase().contains(&needle))
    }
}

fn keyword_search(
    store: &dyn GridStore,
    tables: &[String],
    keyword: &str,
    settings: &ExecSettings,
) -> BotResult<Reply> {
    let mut blocks = Vec::new();
    let mut rows = Vec::new();
    for name in tables {
        let table = read_table(store, name, settings.header_rows)?;
        for (position, record) in table.records.iter().enumerate() {
            if record_matches(&record.cells, keyword, settings.case_sensitive) {
                blocks.push(format_record(&table, position, record));
                rows.push(report_row(&table, position, record));
            }
        }
    }
    tracing::info!(keyword, tables = tables.len(), matches = blocks.len(), "keyword search finished");
    if blocks.is_empty() {
        return Ok(Reply::Text(NOT_FOUND.to_string()));
    }
    Ok(Reply::Report(Report {
        text: join_blocks(&blocks),
        rows,
        label: "search".to_string(),
    }))
}

fn update(store: &dyn GridStore, invocation: &CommandInvocation, settings: &ExecSettings) -> BotResult<Reply> {
    let args = &invocation.args;
    if args.len() < UPDATE_MIN_REST + 1 {
        return Ok(Reply::Text(UPDATE_USAGE.to_string()));
    }

    let tables = list_tables(store)?;
    let Some((table_name, used)) = resolve_table_prefix(&tables, args, UPDATE_MIN_REST) else {
        let tried = args[..args.len() - UPDATE_MIN_REST].join(" ");
        return Ok(Reply::Text(format!("❌ ไม่พบชีตชื่อ \"{tried}\" (table not found)")));
    };
    let column_name = &args[used];
    let row_text = args[used + 1].trim();
    let value = args[used + 2..].join(" ");

    let Ok(row) = row_text.parse::<i64>() else {
        return Ok(Reply::Text(format!(
            "❌ แถวที่ต้องเป็นตัวเลข: \"{row_text}\" (row number must be an integer)"
        )));
    };

    let header_block = read_header_block(store, &table_name, settings.header_rows)?;
    let Some(column) = header_block.find_column(column_name) else {
        return Ok(Reply::Text(format!(
            "❌ ไม่พบคอลัมน์ \"{column_name}\" ในชีต \"{table_name}\" (column not found)"
        )));
    };

    let data_rows = count_data_rows(store, &table_name, settings.header_rows)?;
    let in_range = usize::try_from(row).ok().filter(|r| (1..=data_rows).contains(r));
    let Some(row) = in_range else {
        return Ok(Reply::Text(format!(
            "❌ แถว {row} อยู่นอกช่วงข้อมูล 1-{data_rows} ของชีต \"{table_name}\" (row out of range)"
        )));
    };

    let address = CellAddress {
        table: table_name,
        column_letter: column_letter(column),
        row_number: row + settings.header_rows,
    };
    store.write_cell(&address, &value)?;
    tracing::info!(
        table = %address.table,
        cell = %address.cell(),
        header = %header_block.headers[column],
        "cell updated"
    );
    Ok(Reply::Text(format!("✅ แก้ไขแล้ว: {} → {}", address.display(), value)))
}
