//! HTTP backend for the hosted database and auth service.
//!
//! # Responsibility
//! - Translate table CRUD into the REST data API (`/rest/v1/<table>`,
//!   `col=eq.value` filters, `Prefer: return=representation` on writes).
//! - Drive e-mail/password auth through `/auth/v1/*` and keep the active
//!   session's bearer token for data calls.
//!
//! # Invariants
//! - The transport timeout from [`ClientConfig`] is the only timeout.
//! - A 401 from the data API drops the local session and emits
//!   `AuthEvent::SignedOut`, so stores observe server-side revocation.
//! - Tokens and passwords are never logged.

use crate::config::{ClientConfig, ConfigError};
use crate::logging::sanitize_message;
use crate::model::session::{AuthEvent, AuthUser, Registration, Session};
use crate::remote::{
    ensure_filtered, value_text, AuthApi, AuthBroadcast, Embed, Filter, RemoteError,
    RemoteErrorCode, RemoteResult, RemoteStore, Table,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::mpsc::Receiver;
use std::sync::RwLock;
use std::time::Instant;
use url::Url;

const REST_PREFIX: &str = "rest/v1/";
const AUTH_PREFIX: &str = "auth/v1/";
const API_KEY_HEADER: &str = "apikey";
const PREFER_HEADER: &str = "Prefer";
const RETURN_REPRESENTATION: &str = "return=representation";
/// Sessions expiring within this window are refreshed before use.
const REFRESH_LEEWAY_SECS: i64 = 60;

/// Blocking REST client implementing both [`RemoteStore`] and [`AuthApi`].
pub struct HttpBackend {
    config: ClientConfig,
    client: Client,
    session: RwLock<Option<Session>>,
    events: AuthBroadcast,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| {
                RemoteError::new(
                    RemoteErrorCode::Network,
                    format!("failed to build http client: {err}"),
                )
            })?;

        Ok(Self {
            config,
            client,
            session: RwLock::new(None),
            events: AuthBroadcast::default(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn current(&self) -> Option<Session> {
        self.session
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn replace_session(&self, session: Option<Session>) {
        let mut guard = self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = session;
    }

    fn drop_session(&self) {
        if self.current().is_some() {
            self.replace_session(None);
            info!("event=session_dropped module=remote status=ok");
            self.events.emit(&AuthEvent::SignedOut);
        }
    }

    fn rest_url(&self, table: Table, filter: &Filter, select: Option<&str>) -> RemoteResult<Url> {
        let mut url = self
            .config
            .endpoint(&format!("{REST_PREFIX}{}", table.as_str()))
            .map_err(config_error)?;
        if select.is_some() || !filter.is_empty() {
            let mut pairs = url.query_pairs_mut();
            if let Some(select) = select {
                pairs.append_pair("select", select);
            }
            for (column, value) in filter.clauses() {
                pairs.append_pair(column, &format!("eq.{value}"));
            }
        }
        Ok(url)
    }

    fn auth_url(&self, path: &str) -> RemoteResult<Url> {
        self.config
            .endpoint(&format!("{AUTH_PREFIX}{path}"))
            .map_err(config_error)
    }

    /// Adds the project key and the bearer token (session or anon key).
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self
            .current()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.config.anon_key().to_string());
        builder
            .header(API_KEY_HEADER, self.config.anon_key())
            .bearer_auth(token)
    }

    fn execute(&self, request: RequestBuilder) -> RemoteResult<(StatusCode, String)> {
        let response = request.send().map_err(transport_error)?;
        let status = response.status();
        let body = response.text().map_err(transport_error)?;
        Ok((status, body))
    }

    fn rest_rows(&self, op: &str, table: Table, request: RequestBuilder) -> RemoteResult<Vec<Value>> {
        let started = Instant::now();
        let outcome = self.execute(request).and_then(|(status, body)| {
            if !status.is_success() {
                return Err(self.rest_failure(status, &body));
            }
            if body.trim().is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str::<Vec<Value>>(&body).map_err(|err| {
                RemoteError::decode(format!("`{table}` response is not a row array: {err}"))
            })
        });

        match &outcome {
            Ok(rows) => debug!(
                "event=remote_call module=remote status=ok op={} table={} rows={} duration_ms={}",
                op,
                table,
                rows.len(),
                started.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=remote_call module=remote status=error op={} table={} error_code={} duration_ms={} error={}",
                op,
                table,
                err.code.as_str(),
                started.elapsed().as_millis(),
                sanitize_message(&err.message)
            ),
        }
        outcome
    }

    fn rest_failure(&self, status: StatusCode, body: &str) -> RemoteError {
        let error = error_from_response(status.as_u16(), body);
        if status == StatusCode::UNAUTHORIZED {
            self.drop_session();
        }
        error
    }

    fn auth_call(&self, op: &str, request: RequestBuilder) -> RemoteResult<String> {
        let started = Instant::now();
        let outcome = self.execute(request).and_then(|(status, body)| {
            if status.is_success() {
                Ok(body)
            } else {
                Err(error_from_response(status.as_u16(), &body))
            }
        });
        match &outcome {
            Ok(_) => info!(
                "event=auth_call module=remote status=ok op={} duration_ms={}",
                op,
                started.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=auth_call module=remote status=error op={} error_code={} duration_ms={} error={}",
                op,
                err.code.as_str(),
                started.elapsed().as_millis(),
                sanitize_message(&err.message)
            ),
        }
        outcome
    }

    fn refresh(&self, stale: &Session) -> RemoteResult<Option<Session>> {
        let request = self
            .client
            .post(self.auth_url("token?grant_type=refresh_token")?)
            .header(API_KEY_HEADER, self.config.anon_key())
            .json(&json!({ "refresh_token": stale.refresh_token }));

        match self.auth_call("refresh", request) {
            Ok(body) => {
                let session = parse_token_response(&body, Utc::now())?;
                self.replace_session(Some(session.clone()));
                self.events.emit(&AuthEvent::TokenRefreshed(session.clone()));
                Ok(Some(session))
            }
            Err(err) if err.code == RemoteErrorCode::Unauthorized => {
                self.drop_session();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl RemoteStore for HttpBackend {
    fn select(&self, table: Table, filter: &Filter, embeds: &[Embed]) -> RemoteResult<Vec<Value>> {
        let url = self.rest_url(table, filter, Some(&select_clause(embeds)))?;
        self.rest_rows("select", table, self.authorized(self.client.get(url)))
    }

    fn insert(&self, table: Table, row: Value) -> RemoteResult<Vec<Value>> {
        let url = self.rest_url(table, &Filter::new(), None)?;
        let request = self
            .authorized(self.client.post(url))
            .header(PREFER_HEADER, RETURN_REPRESENTATION)
            .json(&row);
        self.rest_rows("insert", table, request)
    }

    fn update(&self, table: Table, filter: &Filter, patch: Value) -> RemoteResult<Vec<Value>> {
        ensure_filtered(table, filter)?;
        let url = self.rest_url(table, filter, None)?;
        let request = self
            .authorized(self.client.patch(url))
            .header(PREFER_HEADER, RETURN_REPRESENTATION)
            .json(&patch);
        self.rest_rows("update", table, request)
    }

    fn delete(&self, table: Table, filter: &Filter) -> RemoteResult<()> {
        ensure_filtered(table, filter)?;
        let url = self.rest_url(table, filter, None)?;
        self.rest_rows("delete", table, self.authorized(self.client.delete(url)))
            .map(|_| ())
    }
}

impl AuthApi for HttpBackend {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> RemoteResult<Registration> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(name) = name {
            body["data"] = json!({ "name": name });
        }
        let request = self
            .client
            .post(self.auth_url("signup")?)
            .header(API_KEY_HEADER, self.config.anon_key())
            .json(&body);

        let registration = parse_sign_up(&self.auth_call("sign_up", request)?, Utc::now())?;
        if let Some(session) = registration.session.as_ref() {
            self.replace_session(Some(session.clone()));
            self.events.emit(&AuthEvent::SignedIn(session.clone()));
        }
        Ok(registration)
    }

    fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Session> {
        let request = self
            .client
            .post(self.auth_url("token?grant_type=password")?)
            .header(API_KEY_HEADER, self.config.anon_key())
            .json(&json!({ "email": email, "password": password }));

        let session = parse_token_response(&self.auth_call("sign_in", request)?, Utc::now())?;
        self.replace_session(Some(session.clone()));
        self.events.emit(&AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn sign_out(&self) -> RemoteResult<()> {
        if self.current().is_none() {
            return Ok(());
        }
        let request = self.authorized(self.client.post(self.auth_url("logout")?));
        match self.auth_call("sign_out", request) {
            Ok(_) => {
                self.drop_session();
                Ok(())
            }
            // An already-invalid token means the server side is signed out.
            Err(err) if err.code == RemoteErrorCode::Unauthorized => {
                self.drop_session();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn current_session(&self) -> RemoteResult<Option<Session>> {
        match self.current() {
            Some(session) if session.expires_within(Utc::now(), REFRESH_LEEWAY_SECS) => {
                self.refresh(&session)
            }
            other => Ok(other),
        }
    }

    fn reset_password_for_email(&self, email: &str) -> RemoteResult<()> {
        let request = self
            .client
            .post(self.auth_url("recover")?)
            .header(API_KEY_HEADER, self.config.anon_key())
            .json(&json!({ "email": email }));
        self.auth_call("reset_password", request).map(|_| ())
    }

    fn subscribe(&self) -> Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now.timestamp() + secs));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

fn parse_token_response(body: &str, now: DateTime<Utc>) -> RemoteResult<Session> {
    serde_json::from_str::<TokenResponse>(body)
        .map(|token| token.into_session(now))
        .map_err(|err| RemoteError::decode(format!("invalid token response: {err}")))
}

/// Sign-up answers with a token response when the account is usable at
/// once, or with the bare user while e-mail confirmation is pending.
fn parse_sign_up(body: &str, now: DateTime<Utc>) -> RemoteResult<Registration> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| RemoteError::decode(format!("invalid sign-up response: {err}")))?;

    if value.get("access_token").is_some() {
        let session = parse_token_response(body, now)?;
        return Ok(Registration {
            user: session.user.clone(),
            session: Some(session),
        });
    }

    let user_value = value.get("user").cloned().unwrap_or(value);
    let user = serde_json::from_value::<AuthUser>(user_value)
        .map_err(|err| RemoteError::decode(format!("invalid sign-up user: {err}")))?;
    Ok(Registration {
        user,
        session: None,
    })
}

fn select_clause(embeds: &[Embed]) -> String {
    let mut clause = String::from("*");
    for embed in embeds {
        clause.push(',');
        clause.push_str(embed.table.as_str());
        clause.push_str("(*)");
    }
    clause
}

/// Maps an error response from either API onto the shared taxonomy.
fn error_from_response(status: u16, body: &str) -> RemoteError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|value| value.get(name))
            .filter(|value| !value.is_null())
            .map(value_text)
    };
    let service_code = field("code").or_else(|| field("error_code"));
    let auth_error = field("error");
    let message = field("message")
        .or_else(|| field("msg"))
        .or_else(|| field("error_description"))
        .or_else(|| auth_error.clone())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("http status {status}")
            } else {
                trimmed.to_string()
            }
        });

    let code = match (status, service_code.as_deref(), auth_error.as_deref()) {
        (_, Some("23505" | "23503" | "user_already_exists"), _) | (409, _, _) => {
            RemoteErrorCode::Conflict
        }
        (_, Some("PGRST116"), _) | (404, _, _) => RemoteErrorCode::NotFound,
        (401 | 403, _, _)
        | (400, Some("invalid_credentials"), _)
        | (400, _, Some("invalid_grant")) => RemoteErrorCode::Unauthorized,
        (408 | 504, _, _) => RemoteErrorCode::Timeout,
        (500..=599, _, _) => RemoteErrorCode::Server,
        _ => RemoteErrorCode::Rejected,
    };
    RemoteError::new(code, message)
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    let code = if err.is_timeout() {
        RemoteErrorCode::Timeout
    } else if err.is_decode() {
        RemoteErrorCode::Decode
    } else {
        RemoteErrorCode::Network
    };
    RemoteError::new(code, err.to_string())
}

fn config_error(err: ConfigError) -> RemoteError {
    RemoteError::rejected(err.to_string())
}
