use serde::Deserialize;

/// The `data` object of an inbound webhook. Message text is not included;
/// it has to be fetched by `id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventData {
    #[serde(default)]
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) room_id: String,
    #[serde(default)]
    pub(crate) person_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct InboundEvent {
    #[serde(default)]
    pub(crate) resource: Option<String>,
    #[serde(default)]
    pub(crate) event: Option<String>,
    #[serde(default)]
    pub(crate) data: EventData,
}

impl InboundEvent {
    /// Webhooks registered for other resources (memberships, rooms) or
    /// other message events (deleted) carry no command.
    pub(crate) fn is_message_created(&self) -> bool {
        let resource_ok = self.resource.as_deref().is_none_or(|r| r == "messages");
        let event_ok = self.event.as_deref().is_none_or(|e| e == "created");
        resource_ok && event_ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandInvocation {
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) raw_text: String,
}

impl CommandInvocation {
    /// All arguments joined back with single spaces, trimmed.
    pub(crate) fn joined_args(&self) -> String {
        self.args.join(" ").trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CellAddress {
    pub(crate) table: String,
    pub(crate) column_letter: String,
    pub(crate) row_number: usize,
}

impl CellAddress {
    pub(crate) fn cell(&self) -> String {
        format!("{}{}", self.column_letter, self.row_number)
    }

    pub(crate) fn display(&self) -> String {
        format!("{}!{}", self.table, self.cell())
    }
}

/// One matched record in structured form, for tabular attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReportRow {
    pub(crate) table: String,
    pub(crate) data_row: usize,
    pub(crate) sheet_row: usize,
    pub(crate) fields: Vec<(String, String)>,
}

/// What the executor hands to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    /// Help, usage problems, update confirmations, not-found notices.
    Text(String),
    /// Rendered records plus their structured rows.
    Report(Report),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Report {
    pub(crate) text: String,
    pub(crate) rows: Vec<ReportRow>,
    /// Stem used for the attachment file name, e.g. the table searched.
    pub(crate) label: String,
}

impl Reply {
    pub(crate) fn text(&self) -> &str {
        match self {
            Reply::Text(text) => text,
            Reply::Report(report) => &report.text,
        }
    }
}

/// How one inbound event ended, for the HTTP status and the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EventOutcome {
    Ignored,
    Replied { chunks: usize },
    SentFile,
    Failed,
}
