//! Webhook listener. Requests are handled one at a time, in arrival order.

use tiny_http::{Method, Response, Server};

use crate::bot::{handle_event, BotProfile};
use crate::error::{BotError, BotResult};
use crate::sheets::GridStore;
use crate::types::{EventOutcome, InboundEvent};
use crate::webex::ChatTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HttpReply {
    pub(crate) status: u16,
    pub(crate) body: &'static str,
}

impl HttpReply {
    const fn new(status: u16, body: &'static str) -> Self {
        Self { status, body }
    }
}

pub(crate) fn parse_event(body: &str) -> Result<InboundEvent, String> {
    if body.trim().is_empty() {
        return Err("empty body".into());
    }
    let event: InboundEvent = serde_json::from_str(body).map_err(|e| format!("json: {e}"))?;
    if event.data.id.trim().is_empty() {
        return Err("missing data.id".into());
    }
    Ok(event)
}

fn read_body(request: &mut tiny_http::Request) -> Result<String, String> {
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .map_err(|e| format!("read body: {e}"))?;
    Ok(body)
}

pub(crate) fn outcome_reply(outcome: &EventOutcome) -> HttpReply {
    match outcome {
        EventOutcome::Ignored => HttpReply::new(200, "Ignore self-message"),
        EventOutcome::Replied { .. } => HttpReply::new(200, "OK"),
        EventOutcome::SentFile => HttpReply::new(200, "sent file"),
        EventOutcome::Failed => HttpReply::new(500, "Error"),
    }
}

/// Maps one request to a status and body. Everything but a well-formed
/// message-created webhook is answered without touching either service.
pub(crate) fn route(
    is_post: bool,
    body: Result<String, String>,
    transport: &dyn ChatTransport,
    store: &dyn GridStore,
    profile: &BotProfile,
) -> HttpReply {
    if !is_post {
        return HttpReply::new(200, "ok");
    }
    let event = match body.and_then(|body| parse_event(&body)) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting webhook payload");
            return HttpReply::new(400, "Bad Request");
        }
    };
    if !event.is_message_created() {
        tracing::debug!(resource = ?event.resource, event = ?event.event, "ignoring non-message webhook");
        return HttpReply::new(200, "ignored");
    }
    let outcome = handle_event(transport, store, profile, &event.data);
    tracing::info!(message_id = %event.data.id, outcome = ?outcome, "event handled");
    outcome_reply(&outcome)
}

pub(crate) fn run_server(
    bind: &str,
    port: u16,
    transport: &dyn ChatTransport,
    store: &dyn GridStore,
    profile: &BotProfile,
) -> BotResult<()> {
    let addr = format!("{bind}:{port}");
    let server = Server::http(&addr).map_err(|e| BotError::Config(format!("listen on {addr}: {e}")))?;
    tracing::info!(%addr, "webhook listener started");

    for mut request in server.incoming_requests() {
        let is_post = *request.method() == Method::Post;
        let body = if is_post { read_body(&mut request) } else { Ok(String::new()) };
        let reply = route(is_post, body, transport, store, profile);
        let response = Response::from_string(reply.body).with_status_code(reply.status);
        if let Err(err) = request.respond(response) {
            tracing::warn!(error = %err, "failed to write webhook response");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AttachmentFormat, DispatchSettings};
    use crate::executor::ExecSettings;
    use crate::testing::{FakeStore, FakeTransport};

    fn profile() -> BotProfile {
        BotProfile {
            bot_id: "bot-1".into(),
            exec: ExecSettings {
                header_rows: 2,
                case_sensitive: true,
                mention_name: "bot_small".into(),
            },
            dispatch: DispatchSettings {
                inline_limit: 7000,
                chunk_limit: 7000,
                max_message_bytes: 7439,
                attachment_format: AttachmentFormat::Txt,
            },
        }
    }

    fn webhook(person: &str) -> Result<String, String> {
        Ok(format!(
            r#"{{"resource":"messages","event":"created","data":{{"id":"m-1","roomId":"r-1","personId":"{person}"}}}}"#
        ))
    }

    #[test]
    fn get_requests_are_acknowledged() {
        let transport = FakeTransport::new();
        let reply = route(false, Ok(String::new()), &transport, &FakeStore::new(), &profile());
        assert_eq!(reply, HttpReply::new(200, "ok"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let transport = FakeTransport::new();
        let store = FakeStore::new();
        for body in ["", "not json", r#"{"data": {}}"#] {
            let reply = route(true, Ok(body.to_string()), &transport, &store, &profile());
            assert_eq!(reply.status, 400, "body {body:?}");
        }
        let reply = route(true, Err("read body: reset".into()), &transport, &store, &profile());
        assert_eq!(reply.status, 400);
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn non_message_webhooks_are_ignored() {
        let transport = FakeTransport::new();
        let body = r#"{"resource":"memberships","event":"created","data":{"id":"x"}}"#;
        let reply = route(true, Ok(body.into()), &transport, &FakeStore::new(), &profile());
        assert_eq!(reply, HttpReply::new(200, "ignored"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn self_message_is_acknowledged_without_calls() {
        let transport = FakeTransport::with_message("bot_small help");
        let reply = route(true, webhook("bot-1"), &transport, &FakeStore::new(), &profile());
        assert_eq!(reply, HttpReply::new(200, "Ignore self-message"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn handled_command_returns_ok() {
        let transport = FakeTransport::with_message("bot_small help");
        let reply = route(true, webhook("person-1"), &transport, &FakeStore::new(), &profile());
        assert_eq!(reply, HttpReply::new(200, "OK"));
    }

    #[test]
    fn failure_maps_to_server_error() {
        let transport = FakeTransport::with_message("bot_small search x");
        let reply = route(true, webhook("person-1"), &transport, &FakeStore::unreachable(), &profile());
        assert_eq!(reply, HttpReply::new(500, "Error"));
    }

    #[test]
    fn outcomes_map_to_replies() {
        assert_eq!(outcome_reply(&EventOutcome::SentFile), HttpReply::new(200, "sent file"));
        assert_eq!(outcome_reply(&EventOutcome::Replied { chunks: 2 }).status, 200);
    }
}
