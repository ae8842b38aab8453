use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;

const AMZ_JSON: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

/// A signed-in user. Stored as JSON in the data directory so sign-in
/// survives across invocations, like a browser would keep it in local
/// storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub email: String,
    /// Unix timestamp after which the token is no longer usable.
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Client for the user-pool identity provider. All calls are plain JSON
/// POSTs against one regional endpoint, dispatched by the X-Amz-Target
/// header.
pub struct AuthClient {
    endpoint: String,
    client_id: String,
    client: reqwest::blocking::Client,
    session_path: PathBuf,
}

impl AuthClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_endpoint(
            config.auth_endpoint()?,
            config.client_id.clone(),
            default_session_path(),
        ))
    }

    /// Explicit endpoint and session location, for tests.
    pub fn with_endpoint(endpoint: String, client_id: String, session_path: PathBuf) -> Self {
        Self {
            endpoint,
            client_id,
            client: reqwest::blocking::Client::new(),
            session_path,
        }
    }

    /// Register a new account. The provider emails a confirmation code.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<()> {
        let payload = json!({
            "ClientId": self.client_id,
            "Username": email,
            "Password": password,
            "UserAttributes": [{ "Name": "email", "Value": email }],
        });
        self.call("SignUp", payload)?;
        Ok(())
    }

    /// Confirm a freshly registered account with the emailed code.
    pub fn confirm_sign_up(&self, email: &str, code: &str) -> Result<()> {
        let payload = json!({
            "ClientId": self.client_id,
            "Username": email,
            "ConfirmationCode": code,
        });
        self.call("ConfirmSignUp", payload)?;
        Ok(())
    }

    /// Exchange credentials for a token and persist the session.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let payload = json!({
            "AuthFlow": "USER_PASSWORD_AUTH",
            "ClientId": self.client_id,
            "AuthParameters": { "USERNAME": email, "PASSWORD": password },
        });
        let reply = self.call("InitiateAuth", payload)?;
        let reply: InitiateAuthReply =
            serde_json::from_value(reply).context("Unexpected InitiateAuth response shape")?;
        let auth = match reply.authentication_result {
            Some(auth) => auth,
            None => match reply.challenge_name {
                Some(challenge) => bail!(
                    "Sign-in requires the {challenge} challenge, which this client does not support"
                ),
                None => bail!("Identity provider returned neither credentials nor a challenge"),
            },
        };
        let session = Session {
            token: auth.access_token,
            email: email.to_string(),
            expires_at: Utc::now().timestamp() + auth.expires_in.unwrap_or(3600),
        };
        write_session(&self.session_path, &session)?;
        Ok(session)
    }

    /// Revoke the token and discard the stored session. Revocation is best
    /// effort: the local session is cleared even when the provider call
    /// fails, so sign-out always works offline.
    pub fn sign_out(&self) -> Result<()> {
        if let Some(session) = read_session(&self.session_path)? {
            let payload = json!({ "AccessToken": session.token });
            if let Err(err) = self.call("GlobalSignOut", payload) {
                log::warn!("GlobalSignOut failed: {err:#}");
            }
        }
        clear_session(&self.session_path)
    }

    /// The stored session, if present and not past its expiry. An expired
    /// session is discarded on sight, which signs the user out.
    pub fn current_session(&self) -> Result<Option<Session>> {
        let Some(session) = read_session(&self.session_path)? else {
            return Ok(None);
        };
        if session.is_expired(Utc::now().timestamp()) {
            clear_session(&self.session_path)?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Start a password reset. The provider emails a reset code.
    pub fn forgot_password(&self, email: &str) -> Result<()> {
        let payload = json!({
            "ClientId": self.client_id,
            "Username": email,
        });
        self.call("ForgotPassword", payload)?;
        Ok(())
    }

    /// Complete a password reset with the emailed code.
    pub fn confirm_password(&self, email: &str, code: &str, new_password: &str) -> Result<()> {
        let payload = json!({
            "ClientId": self.client_id,
            "Username": email,
            "ConfirmationCode": code,
            "Password": new_password,
        });
        self.call("ConfirmForgotPassword", payload)?;
        Ok(())
    }

    fn call(&self, action: &str, payload: Value) -> Result<Value> {
        log::debug!("{action} -> {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", AMZ_JSON)
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{action}"))
            .body(payload.to_string())
            .send()
            .with_context(|| format!("Failed to reach the identity provider for {action}"))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .with_context(|| format!("Failed to read the {action} response"))?;
        if !(200..300).contains(&status) {
            return Err(provider_error(action, status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in the {action} response"))
    }
}

#[derive(Debug, Deserialize)]
struct AuthResult {
    #[serde(rename = "AccessToken")]
    access_token: String,
    #[serde(rename = "ExpiresIn", default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct InitiateAuthReply {
    #[serde(rename = "AuthenticationResult", default)]
    authentication_result: Option<AuthResult>,
    #[serde(rename = "ChallengeName", default)]
    challenge_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderFault {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Provider faults come as `{"__type": "...", "message": "..."}`, with the
/// type sometimes namespace-qualified ("com.amazon...#NotAuthorizedException").
fn provider_error(action: &str, status: u16, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ProviderFault>(body) {
        Ok(fault) => {
            let kind = fault
                .kind
                .as_deref()
                .map(|k| k.rsplit('#').next().unwrap_or(k))
                .unwrap_or("UnknownError");
            let message = fault.message.as_deref().unwrap_or("no detail provided");
            anyhow::anyhow!("{action} failed: {kind}: {message}")
        }
        Err(_) => anyhow::anyhow!("{action} failed with HTTP status {status}"),
    }
}

fn default_session_path() -> PathBuf {
    crate::config::data_dir().join("session.json")
}

fn read_session(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file at {}", path.display()))?;
    match serde_json::from_str(&text) {
        Ok(session) => Ok(Some(session)),
        Err(err) => {
            log::warn!("Ignoring unreadable session file at {}: {err}", path.display());
            Ok(None)
        }
    }
}

fn write_session(path: &Path, session: &Session) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory at {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(session).context("Failed to encode session")?;
    fs::write(path, text)
        .with_context(|| format!("Failed to write session file at {}", path.display()))
}

fn clear_session(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove session file at {}", path.display()))?;
    }
    Ok(())
}
