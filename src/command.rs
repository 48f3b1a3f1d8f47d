use crate::error::BotResult;
use crate::types::{CommandInvocation, EventData};
use crate::webex::ChatTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandKind {
    Help,
    Search,
    Update,
    Unknown,
}

impl CommandKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CommandKind::Help => "help",
            CommandKind::Search => "search",
            CommandKind::Update => "update",
            CommandKind::Unknown => "unknown",
        }
    }
}

/// Maps a command word to its operation. Thai words are matched exactly,
/// latin ones case-insensitively.
pub(crate) fn classify(command: &str) -> CommandKind {
    match command.to_ascii_lowercase().as_str() {
        "help" => CommandKind::Help,
        "search" | "ค้นหา" => CommandKind::Search,
        "update" | "edit" | "แก้ไข" => CommandKind::Update,
        _ => CommandKind::Unknown,
    }
}

/// Result of normalizing one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Normalized {
    /// Sent by the bot itself; nothing else may happen.
    Ignored,
    Text(String),
}

/// Self filter first, then fetch the message body and strip the mention.
pub(crate) fn normalize_message(
    transport: &dyn ChatTransport,
    data: &EventData,
    bot_id: &str,
    mention_name: &str,
) -> BotResult<Normalized> {
    if is_self_message(data, bot_id) {
        return Ok(Normalized::Ignored);
    }
    let text = transport.fetch_message_text(&data.id)?;
    Ok(Normalized::Text(strip_mention(&text, mention_name)))
}

pub(crate) fn is_self_message(data: &EventData, bot_id: &str) -> bool {
    let bot_id = bot_id.trim();
    !bot_id.is_empty() && data.person_id.trim() == bot_id
}

/// Drops a leading `mention_name` (optionally `@`-prefixed, any case) and trims.
/// Text that does not start with the mention only loses surrounding whitespace.
pub(crate) fn strip_mention(text: &str, mention_name: &str) -> String {
    let trimmed = text.trim();
    let name = mention_name.trim();
    if name.is_empty() {
        return trimmed.to_string();
    }
    let candidate = trimmed.strip_prefix('@').unwrap_or(trimmed);
    match strip_prefix_ignore_case(candidate, name) {
        Some(rest) => rest.trim().to_string(),
        None => trimmed.to_string(),
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = rest.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    match rest.next() {
        Some((idx, _)) => Some(&text[idx..]),
        None => Some(""),
    }
}

/// Splits on single spaces: first token is the command, the rest are args.
/// Empty text gives an empty command.
pub(crate) fn tokenize(text: &str) -> CommandInvocation {
    let mut parts = text.split(' ').map(str::to_string);
    let command = parts.next().unwrap_or_default();
    CommandInvocation {
        command,
        args: parts.collect(),
        raw_text: text.to_string(),
    }
}
