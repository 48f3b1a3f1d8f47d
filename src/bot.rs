//! One inbound event, start to finish: self filter, fetch, parse, execute, deliver.

use crate::command::{classify, normalize_message, tokenize, Normalized};
use crate::dispatch::{deliver, Delivery, DispatchSettings};
use crate::error::{BotError, BotResult};
use crate::executor::{execute, ExecSettings};
use crate::sheets::GridStore;
use crate::types::{EventData, EventOutcome, Reply};
use crate::webex::ChatTransport;

pub(crate) const FAILURE_REPLY: &str = "⚠️ เกิดข้อผิดพลาดในการประมวลผลคำสั่ง (something went wrong, please try again)";
/// Follows an attachment notice whose file never arrived.
pub(crate) const ATTACHMENT_FAILURE_REPLY: &str =
    "⚠️ ส่งไฟล์แนบไม่สำเร็จ (the attachment announced above could not be sent, please try again)";
const TEXT_REPLY_LABEL: &str = "reply";

/// Everything the handler needs besides its two collaborators.
#[derive(Debug, Clone)]
pub(crate) struct BotProfile {
    /// Messages from this person id are never answered.
    pub(crate) bot_id: String,
    pub(crate) exec: ExecSettings,
    pub(crate) dispatch: DispatchSettings,
}

/// Runs one event. Remote failures never escape: they are logged, the room
/// gets a failure notice when possible, and the outcome is `Failed`.
pub(crate) fn handle_event(
    transport: &dyn ChatTransport,
    store: &dyn GridStore,
    profile: &BotProfile,
    data: &EventData,
) -> EventOutcome {
    match process(transport, store, profile, data) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(
                message_id = %data.id,
                room = %data.room_id,
                error = %err,
                "event processing failed"
            );
            let notice = match &err {
                BotError::Attachment { .. } => ATTACHMENT_FAILURE_REPLY,
                _ => FAILURE_REPLY,
            };
            if let Err(post_err) = transport.post_text(&data.room_id, notice) {
                tracing::warn!(room = %data.room_id, error = %post_err, "failure notice not delivered");
            }
            EventOutcome::Failed
        }
    }
}

fn process(
    transport: &dyn ChatTransport,
    store: &dyn GridStore,
    profile: &BotProfile,
    data: &EventData,
) -> BotResult<EventOutcome> {
    let text = match normalize_message(transport, data, &profile.bot_id, &profile.exec.mention_name)? {
        Normalized::Ignored => {
            tracing::debug!(message_id = %data.id, "ignoring own message");
            return Ok(EventOutcome::Ignored);
        }
        Normalized::Text(text) => text,
    };

    let invocation = tokenize(&text);
    tracing::debug!(message_id = %data.id, text = %invocation.raw_text, "normalized message");
    tracing::info!(
        command = classify(&invocation.command).as_str(),
        args = invocation.args.len(),
        room = %data.room_id,
        "command received"
    );
    let reply = execute(store, &invocation, &profile.exec)?;
    let delivery = send_reply(transport, &data.room_id, &reply, &profile.dispatch)?;
    Ok(match delivery {
        Delivery::Inline { chunks } => EventOutcome::Replied { chunks },
        Delivery::Attachment { .. } => EventOutcome::SentFile,
    })
}

pub(crate) fn send_reply(
    transport: &dyn ChatTransport,
    room_id: &str,
    reply: &Reply,
    settings: &DispatchSettings,
) -> BotResult<Delivery> {
    match reply {
        Reply::Text(text) => deliver(transport, room_id, text, None, TEXT_REPLY_LABEL, settings),
        Reply::Report(report) => deliver(
            transport,
            room_id,
            &report.text,
            Some(report.rows.as_slice()),
            &report.label,
            settings,
        ),
    }
}
