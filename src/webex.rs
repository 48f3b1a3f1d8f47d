use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use serde::Deserialize;

use crate::error::{retry_once, retry_unsent, BotError, BotResult};

const WEBEX_API_BASE: &str = "https://webexapis.com/v1";
/// The transport rejects text messages above 7439 bytes.
pub(crate) const WEBEX_MAX_MESSAGE_BYTES: usize = 7439;

/// Outbound side of the chat platform plus the message lookup the webhook needs.
pub(crate) trait ChatTransport {
    /// Full text of a message; webhook payloads only carry its id.
    fn fetch_message_text(&self, message_id: &str) -> BotResult<String>;

    /// Posts one message. Callers chunk to the transport cap first.
    fn post_text(&self, room_id: &str, text: &str) -> BotResult<()>;

    /// Posts a single file attachment.
    fn post_file(&self, room_id: &str, filename: &str, bytes: Vec<u8>, mime: &str) -> BotResult<()>;
}

pub(crate) struct WebexClient {
    agent: ureq::Agent,
    upload: Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WebexMessage {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebexPerson {
    id: String,
}

impl WebexClient {
    pub(crate) fn new(token: String, timeout: Duration) -> BotResult<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        let upload = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Config(format!("http client: {e}")))?;
        Ok(Self {
            agent,
            upload,
            token,
            base_url: WEBEX_API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Id of the identity the token belongs to, used to drop our own messages.
    pub(crate) fn whoami(&self) -> BotResult<String> {
        let person: WebexPerson = retry_once("whoami", || {
            self.agent
                .get(&format!("{}/people/me", self.base_url))
                .set("Authorization", &self.auth())
                .call()
                .map_err(|e| BotError::from_ureq("whoami", e, false))?
                .into_json()
                .map_err(|e| BotError::Decode {
                    op: "whoami",
                    detail: e.to_string(),
                })
        })?;
        Ok(person.id.trim().to_string())
    }
}

impl ChatTransport for WebexClient {
    fn fetch_message_text(&self, message_id: &str) -> BotResult<String> {
        let url = format!("{}/messages/{}", self.base_url, urlencoding::encode(message_id));
        // A failed fetch is final for this event.
        let message: WebexMessage = self
            .agent
            .get(&url)
            .set("Authorization", &self.auth())
            .call()
            .map_err(|e| BotError::from_ureq("fetch message", e, false))?
            .into_json()
            .map_err(|e| BotError::Decode {
                op: "fetch message",
                detail: e.to_string(),
            })?;
        Ok(message.text.unwrap_or_default())
    }

    fn post_text(&self, room_id: &str, text: &str) -> BotResult<()> {
        let payload = serde_json::json!({
            "roomId": room_id,
            "text": text,
        });
        let url = format!("{}/messages", self.base_url);
        retry_unsent("post message", || {
            self.agent
                .post(&url)
                .set("Authorization", &self.auth())
                .set("Content-Type", "application/json")
                .send_json(payload.clone())
                .map(|_| ())
                .map_err(|e| BotError::from_ureq("post message", e, false))
        })
    }

    fn post_file(&self, room_id: &str, filename: &str, bytes: Vec<u8>, mime: &str) -> BotResult<()> {
        let url = format!("{}/messages", self.base_url);
        retry_unsent("post file", || {
            let part = multipart::Part::bytes(bytes.clone())
                .file_name(filename.to_string())
                .mime_str(mime)
                .map_err(|e| BotError::Transport {
                    op: "post file",
                    detail: format!("upload prepare error: {e}"),
                })?;
            let form = multipart::Form::new()
                .text("roomId", room_id.to_string())
                .part("files", part);
            let response = self
                .upload
                .post(&url)
                .header("Authorization", self.auth())
                .multipart(form)
                .send()
                .map_err(|e| reqwest_error("post file", e))?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().unwrap_or_default();
            let detail = format!("{}: {}", status.as_u16(), body.trim());
            if status.as_u16() == 401 || status.as_u16() == 403 {
                Err(BotError::Auth(format!("post file {detail}")))
            } else {
                Err(BotError::Transport {
                    op: "post file",
                    detail,
                })
            }
        })
    }
}

fn reqwest_error(op: &'static str, err: reqwest::Error) -> BotError {
    if err.is_connect() {
        BotError::Connection {
            op,
            detail: err.to_string(),
        }
    } else if err.is_timeout() {
        BotError::Timeout { op }
    } else {
        BotError::Transport {
            op,
            detail: err.to_string(),
        }
    }
}
