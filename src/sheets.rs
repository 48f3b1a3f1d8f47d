use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::{retry_once, retry_unsent, BotError, BotResult};
use crate::types::CellAddress;
use crate::util::a1_range;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SERVICE_ACCOUNT_SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.readonly";
/// Lifetime requested for a signed assertion; Google caps it at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the token actually expires.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Written values are parsed as if typed by a person: numbers, dates and
/// formulas are coerced.
const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

/// Remote grid store addressed by table name and A1 span.
pub(crate) trait GridStore {
    /// Table names in store order.
    fn list_tables(&self) -> BotResult<Vec<String>>;

    /// Rows of the rectangular `span` (e.g. `A1:Z`) of `table`. Trailing empty
    /// cells and rows may be absent.
    fn read_range(&self, table: &str, span: &str) -> BotResult<Vec<Vec<String>>>;

    fn write_cell(&self, address: &CellAddress, value: &str) -> BotResult<()>;
}

#[derive(Clone)]
pub(crate) enum StoreCredentials {
    AccessToken(String),
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    /// Signs an RS256 assertion with the account key and trades it for a token.
    ServiceAccount {
        client_email: String,
        private_key: String,
        token_uri: String,
    },
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreCredentials::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
            StoreCredentials::RefreshToken { client_id, .. } => f
                .debug_struct("RefreshToken")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            StoreCredentials::ServiceAccount {
                client_email, token_uri, ..
            } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .field("token_uri", token_uri)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

fn assertion_claims<'a>(client_email: &'a str, token_uri: &'a str, now: i64) -> AssertionClaims<'a> {
    AssertionClaims {
        iss: client_email,
        scope: SERVICE_ACCOUNT_SCOPES,
        aud: token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    }
}

impl StoreCredentials {
    /// Token endpoint and form body for this grant. `None` for a static token.
    fn grant(&self, now: i64) -> BotResult<Option<(&str, String)>> {
        let mut form = form_urlencoded::Serializer::new(String::new());
        match self {
            StoreCredentials::AccessToken(_) => Ok(None),
            StoreCredentials::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => {
                form.append_pair("client_id", client_id)
                    .append_pair("client_secret", client_secret)
                    .append_pair("grant_type", "refresh_token")
                    .append_pair("refresh_token", refresh_token);
                Ok(Some((GOOGLE_TOKEN_URL, form.finish())))
            }
            StoreCredentials::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => {
                let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
                    .map_err(|e| BotError::Auth(format!("service account key rejected: {e}")))?;
                let claims = assertion_claims(client_email, token_uri, now);
                let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)
                    .map_err(|e| BotError::Auth(format!("assertion signing failed: {e}")))?;
                form.append_pair("grant_type", JWT_BEARER_GRANT)
                    .append_pair("assertion", &assertion);
                Ok(Some((token_uri.as_str(), form.finish())))
            }
        }
    }
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub(crate) struct SheetsClient {
    agent: ureq::Agent,
    spreadsheet_id: String,
    credentials: StoreCredentials,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl SheetsClient {
    pub(crate) fn new(spreadsheet_id: String, credentials: StoreCredentials, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            spreadsheet_id,
            credentials,
            cached: Mutex::new(None),
        }
    }

    fn access_token(&self) -> BotResult<String> {
        if let StoreCredentials::AccessToken(token) = &self.credentials {
            return Ok(token.clone());
        }

        let mut cached = self
            .cached
            .lock()
            .map_err(|_| BotError::Auth("token cache poisoned".into()))?;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let Some((token_url, payload)) = self.credentials.grant(chrono::Utc::now().timestamp())? else {
            return Err(BotError::Auth("no token grant for these credentials".into()));
        };
        let response: TokenResponse = retry_once("token refresh", || {
            self.agent
                .post(token_url)
                .set("content-type", "application/x-www-form-urlencoded")
                .send_string(&payload)
                .map_err(|e| match BotError::from_ureq("token refresh", e, true) {
                    BotError::Store { detail, .. } => BotError::Auth(format!("refresh error {detail}")),
                    other => other,
                })?
                .into_json()
                .map_err(|e| BotError::Decode {
                    op: "token refresh",
                    detail: e.to_string(),
                })
        })?;

        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
        let expires_at = Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_SLACK);
        tracing::debug!(expires_in = lifetime.as_secs(), "refreshed store access token");
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at,
        });
        Ok(response.access_token)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{SHEETS_API_BASE}/{}/values/{}",
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(range)
        )
    }
}

impl GridStore for SheetsClient {
    fn list_tables(&self) -> BotResult<Vec<String>> {
        let token = self.access_token()?;
        let url = format!(
            "{SHEETS_API_BASE}/{}?fields=sheets.properties.title",
            urlencoding::encode(&self.spreadsheet_id)
        );
        let meta: SpreadsheetMeta = retry_once("list tables", || {
            self.agent
                .get(&url)
                .set("Authorization", &format!("Bearer {token}"))
                .call()
                .map_err(|e| BotError::from_ureq("list tables", e, true))?
                .into_json()
                .map_err(|e| BotError::Decode {
                    op: "list tables",
                    detail: e.to_string(),
                })
        })?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    fn read_range(&self, table: &str, span: &str) -> BotResult<Vec<Vec<String>>> {
        let token = self.access_token()?;
        let url = self.values_url(&a1_range(table, span));
        let range: ValueRange = retry_once("read range", || {
            self.agent
                .get(&url)
                .set("Authorization", &format!("Bearer {token}"))
                .call()
                .map_err(|e| BotError::from_ureq("read range", e, true))?
                .into_json()
                .map_err(|e| BotError::Decode {
                    op: "read range",
                    detail: e.to_string(),
                })
        })?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    fn write_cell(&self, address: &CellAddress, value: &str) -> BotResult<()> {
        let token = self.access_token()?;
        let range = a1_range(&address.table, &address.cell());
        let url = format!("{}?valueInputOption={VALUE_INPUT_OPTION}", self.values_url(&range));
        let body = serde_json::json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [[value]],
        });
        retry_unsent("write cell", || {
            self.agent
                .put(&url)
                .set("Authorization", &format!("Bearer {token}"))
                .send_json(body.clone())
                .map(|_| ())
                .map_err(|e| BotError::from_ureq("write cell", e, true))
        })
    }
}

/// Formatted values arrive as strings; anything else is rendered plainly.
fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
