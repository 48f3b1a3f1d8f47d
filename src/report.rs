//! Human-readable blocks for matched records.

use crate::schema::{Record, SheetTable};
use crate::types::ReportRow;
use crate::util::flatten_text;

/// Separator between rendered record blocks.
pub(crate) const BLOCK_SEPARATOR: &str = "\n\n";

/// Renders one record. Every field falls back to an empty value or `-`
/// when the table has no such column.
pub(crate) fn format_record(table: &SheetTable, position: usize, record: &Record) -> String {
    let field = |label: &str| flatten_text(table.field(record, label));
    let lookup = |keyword: &str| table.lookup(record, keyword);

    let lines = [
        format!(
            "📄 ชีต: {} (แถว {} · sheet row {})",
            table.name,
            table.data_row(position),
            table.sheet_row(position)
        ),
        format!("📝 ชื่องาน: {} | 🧾 WBS: {}", field("ชื่องาน"), field("WBS")),
        format!(
            "💰 ชำระเงิน/ลว.: {} | ✅ อนุมัติ/ลว.: {} | 📂 รับแฟ้ม: {}",
            field("ชำระเงิน/ลว."),
            field("อนุมัติ/ลว."),
            field("รับแฟ้ม")
        ),
        format!(
            "🔌 หม้อแปลง: {} | ⚡ ระยะทาง HT: {} | ⚡ ระยะทาง LT: {}",
            field("หม้อแปลง"),
            lookup("HT"),
            lookup("LT")
        ),
        format!(
            "🪵 เสา 8 : {} | 🪵 เสา 9 : {} | 🪵 เสา 12 : {} | 🪵 เสา 12.20 : {}",
            lookup("8"),
            lookup("9"),
            lookup("12"),
            lookup("12.20")
        ),
        format!("👷 พชง.ควบคุม: {}", field("พชง.ควบคุม")),
        format!("📌 สถานะงาน: {} | 📊 เปอร์เซ็นงาน: {}", field("สถานะงาน"), field("เปอร์เซ็นงาน")),
        format!("🗒️ หมายเหตุ: {}", field("หมายเหตุ")),
    ];
    lines.join("\n")
}

/// One line of a single-column projection.
pub(crate) fn format_projection_line(table: &SheetTable, position: usize, value: &str) -> String {
    format!("แถว {}: {}", table.data_row(position), flatten_text(value))
}

pub(crate) fn report_row(table: &SheetTable, position: usize, record: &Record) -> ReportRow {
    ReportRow {
        table: table.name.clone(),
        data_row: table.data_row(position),
        sheet_row: table.sheet_row(position),
        fields: table.fields(record),
    }
}

pub(crate) fn join_blocks(blocks: &[String]) -> String {
    blocks.join(BLOCK_SEPARATOR)
}
