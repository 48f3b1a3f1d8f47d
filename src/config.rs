use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::bot::BotProfile;
use crate::dispatch::{AttachmentFormat, DispatchSettings};
use crate::error::{BotError, BotResult};
use crate::executor::ExecSettings;
use crate::sheets::{StoreCredentials, GOOGLE_TOKEN_URL};
use crate::util::{env_bool, env_optional, env_u64, env_usize};
use crate::webex::WEBEX_MAX_MESSAGE_BYTES;

const DEFAULT_BOT_NAME: &str = "bot_small";
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_HEADER_ROWS: usize = 2;
const DEFAULT_INLINE_LIMIT: usize = 7000;
const DEFAULT_CHUNK_LIMIT: usize = 7000;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Non-secret settings. Used for the JSON file, the environment and the CLI
/// alike; later layers overwrite the fields they set.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct FileConfig {
    pub(crate) sheet_file_id: Option<String>,
    pub(crate) bot_id: Option<String>,
    pub(crate) bot_name: Option<String>,
    pub(crate) bind: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) header_rows: Option<usize>,
    pub(crate) inline_limit: Option<usize>,
    pub(crate) chunk_limit: Option<usize>,
    pub(crate) attachment_format: Option<AttachmentFormat>,
    pub(crate) search_case_sensitive: Option<bool>,
    pub(crate) http_timeout_ms: Option<u64>,
}

impl FileConfig {
    pub(crate) fn overlay(self, upper: FileConfig) -> FileConfig {
        FileConfig {
            sheet_file_id: upper.sheet_file_id.or(self.sheet_file_id),
            bot_id: upper.bot_id.or(self.bot_id),
            bot_name: upper.bot_name.or(self.bot_name),
            bind: upper.bind.or(self.bind),
            port: upper.port.or(self.port),
            header_rows: upper.header_rows.or(self.header_rows),
            inline_limit: upper.inline_limit.or(self.inline_limit),
            chunk_limit: upper.chunk_limit.or(self.chunk_limit),
            attachment_format: upper.attachment_format.or(self.attachment_format),
            search_case_sensitive: upper.search_case_sensitive.or(self.search_case_sensitive),
            http_timeout_ms: upper.http_timeout_ms.or(self.http_timeout_ms),
        }
    }

    pub(crate) fn from_env() -> BotResult<FileConfig> {
        let attachment_format = match env_optional("ATTACHMENT_FORMAT") {
            Some(value) => Some(
                AttachmentFormat::parse(&value)
                    .ok_or_else(|| BotError::Config("Invalid ATTACHMENT_FORMAT (txt or csv)".into()))?,
            ),
            None => None,
        };
        let port = match env_u64("PORT")? {
            Some(port) => {
                Some(u16::try_from(port).map_err(|_| BotError::Config("Invalid PORT".into()))?)
            }
            None => None,
        };
        Ok(FileConfig {
            sheet_file_id: env_optional("GOOGLE_SHEET_FILE_ID"),
            bot_id: env_optional("BOT_ID"),
            bot_name: env_optional("WEBEX_BOT_NAME"),
            bind: env_optional("BIND"),
            port,
            header_rows: env_usize("SHEET_HEADER_ROWS")?,
            inline_limit: env_usize("INLINE_LIMIT")?,
            chunk_limit: env_usize("CHUNK_LIMIT")?,
            attachment_format,
            search_case_sensitive: env_bool("SEARCH_CASE_SENSITIVE"),
            http_timeout_ms: env_u64("HTTP_TIMEOUT_MS")?,
        })
    }
}

/// A missing file is an empty layer; a malformed one is an error.
pub(crate) fn load_file_config(path: &Path) -> BotResult<FileConfig> {
    match std::fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data)
            .map_err(|e| BotError::Config(format!("config file {}: {e}", path.display()))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(FileConfig::default())
        }
        Err(err) => Err(err.into()),
    }
}

/// The fields of a downloaded service-account key file that the token grant needs.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

fn service_account(json: &str) -> BotResult<StoreCredentials> {
    let key: ServiceAccountKey = serde_json::from_str(json)
        .map_err(|e| BotError::Config(format!("GOOGLE_CREDENTIALS is not a service account key: {e}")))?;
    Ok(StoreCredentials::ServiceAccount {
        client_email: key.client_email.trim().to_string(),
        // Keys pasted into one env line carry escaped newlines.
        private_key: key.private_key.replace("\\n", "\n"),
        token_uri: key
            .token_uri
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
    })
}

/// Tokens. Only ever read from the environment.
#[derive(Clone, Default)]
pub(crate) struct Secrets {
    pub(crate) webex_token: Option<String>,
    pub(crate) google_access_token: Option<String>,
    /// Service-account key file contents (JSON).
    pub(crate) google_credentials: Option<String>,
    pub(crate) google_client_id: Option<String>,
    pub(crate) google_client_secret: Option<String>,
    pub(crate) google_refresh_token: Option<String>,
}

impl Secrets {
    pub(crate) fn from_env() -> Secrets {
        Secrets {
            webex_token: env_optional("WEBEX_BOT_TOKEN"),
            google_access_token: env_optional("GOOGLE_ACCESS_TOKEN"),
            google_credentials: env_optional("GOOGLE_CREDENTIALS"),
            google_client_id: env_optional("GOOGLE_CLIENT_ID"),
            google_client_secret: env_optional("GOOGLE_CLIENT_SECRET"),
            google_refresh_token: env_optional("GOOGLE_REFRESH_TOKEN"),
        }
    }

    fn store_credentials(&self) -> BotResult<StoreCredentials> {
        if let Some(token) = &self.google_access_token {
            return Ok(StoreCredentials::AccessToken(token.trim().to_string()));
        }
        if let Some(json) = &self.google_credentials {
            return service_account(json);
        }
        match (&self.google_client_id, &self.google_client_secret, &self.google_refresh_token) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(StoreCredentials::RefreshToken {
                client_id: client_id.trim().to_string(),
                client_secret: client_secret.trim().to_string(),
                refresh_token: refresh_token.trim().to_string(),
            }),
            _ => Err(BotError::Config(
                "Missing GOOGLE_ACCESS_TOKEN, GOOGLE_CREDENTIALS or GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET/GOOGLE_REFRESH_TOKEN"
                    .into(),
            )),
        }
    }
}

#[derive(Clone)]
pub(crate) struct BotSettings {
    pub(crate) webex_token: Option<String>,
    pub(crate) sheet_file_id: String,
    /// `None` means ask the chat service who we are at startup.
    pub(crate) bot_id: Option<String>,
    pub(crate) mention_name: String,
    pub(crate) bind: String,
    pub(crate) port: u16,
    pub(crate) header_rows: usize,
    pub(crate) inline_limit: usize,
    pub(crate) chunk_limit: usize,
    pub(crate) attachment_format: AttachmentFormat,
    pub(crate) case_sensitive: bool,
    pub(crate) http_timeout: Duration,
    pub(crate) credentials: StoreCredentials,
}

impl BotSettings {
    /// Defaults, then `--config` file, then environment, then CLI flags.
    pub(crate) fn load(config_path: Option<&Path>, cli: FileConfig) -> BotResult<BotSettings> {
        let file = match config_path {
            Some(path) => load_file_config(path)?,
            None => FileConfig::default(),
        };
        let layered = file.overlay(FileConfig::from_env()?).overlay(cli);
        BotSettings::resolve(layered, Secrets::from_env())
    }

    pub(crate) fn resolve(values: FileConfig, secrets: Secrets) -> BotResult<BotSettings> {
        let sheet_file_id = values
            .sheet_file_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BotError::Config("Missing GOOGLE_SHEET_FILE_ID".into()))?;
        let header_rows = values.header_rows.unwrap_or(DEFAULT_HEADER_ROWS);
        if !(1..=2).contains(&header_rows) {
            return Err(BotError::Config(format!(
                "SHEET_HEADER_ROWS must be 1 or 2, got {header_rows}"
            )));
        }
        let inline_limit = values.inline_limit.unwrap_or(DEFAULT_INLINE_LIMIT);
        let chunk_limit = values.chunk_limit.unwrap_or(DEFAULT_CHUNK_LIMIT);
        if inline_limit == 0 || chunk_limit == 0 {
            return Err(BotError::Config("INLINE_LIMIT and CHUNK_LIMIT must be positive".into()));
        }
        let credentials = secrets.store_credentials()?;

        Ok(BotSettings {
            webex_token: secrets.webex_token.map(|t| t.trim().to_string()),
            sheet_file_id,
            bot_id: values
                .bot_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            mention_name: values.bot_name.unwrap_or_else(|| DEFAULT_BOT_NAME.to_string()),
            bind: values.bind.unwrap_or_else(|| DEFAULT_BIND.to_string()),
            port: values.port.unwrap_or(DEFAULT_PORT),
            header_rows,
            inline_limit,
            chunk_limit,
            attachment_format: values.attachment_format.unwrap_or_default(),
            case_sensitive: values.search_case_sensitive.unwrap_or(true),
            http_timeout: Duration::from_millis(values.http_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
            credentials,
        })
    }

    pub(crate) fn require_webex_token(&self) -> BotResult<String> {
        self.webex_token
            .clone()
            .ok_or_else(|| BotError::Config("Missing WEBEX_BOT_TOKEN".into()))
    }

    pub(crate) fn exec_settings(&self) -> ExecSettings {
        ExecSettings {
            header_rows: self.header_rows,
            case_sensitive: self.case_sensitive,
            mention_name: self.mention_name.clone(),
        }
    }

    pub(crate) fn profile(&self, bot_id: String) -> BotProfile {
        BotProfile {
            bot_id,
            exec: self.exec_settings(),
            dispatch: DispatchSettings {
                inline_limit: self.inline_limit,
                chunk_limit: self.chunk_limit,
                max_message_bytes: WEBEX_MAX_MESSAGE_BYTES,
                attachment_format: self.attachment_format,
            },
        }
    }
}

impl fmt::Debug for BotSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let credentials = match self.credentials {
            StoreCredentials::AccessToken(_) => "access-token",
            StoreCredentials::RefreshToken { .. } => "refresh-token",
            StoreCredentials::ServiceAccount { .. } => "service-account",
        };
        f.debug_struct("BotSettings")
            .field("webex_token", &self.webex_token.as_ref().map(|_| "<redacted>"))
            .field("sheet_file_id", &self.sheet_file_id)
            .field("bot_id", &self.bot_id)
            .field("mention_name", &self.mention_name)
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("header_rows", &self.header_rows)
            .field("inline_limit", &self.inline_limit)
            .field("chunk_limit", &self.chunk_limit)
            .field("attachment_format", &self.attachment_format)
            .field("case_sensitive", &self.case_sensitive)
            .field("http_timeout", &self.http_timeout)
            .field("credentials", &credentials)
            .finish()
    }
}
