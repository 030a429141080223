use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use shared::{
    error::ApiError,
    protocol::{EpsonAuthRequest, EPSON_AUTH_PATH},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};
use url::Url;

use crate::PageEvent;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EpsonAuthError {
    #[error("epson connect authorization rejected with HTTP {status}: {payload}")]
    Rejected { status: u16, payload: Value },
    #[error("epson connect authorization request failed: {0}")]
    Transport(String),
}

impl EpsonAuthError {
    /// Server error in the page's shape, `None` for transport failures.
    pub fn api_error(&self) -> Option<ApiError> {
        match self {
            Self::Rejected { status, payload } => Some(ApiError::from_response(*status, payload)),
            Self::Transport(_) => None,
        }
    }
}

#[async_trait]
pub trait EpsonAuthApi: Send + Sync {
    /// One request, no retries. `Ok` carries the 2xx response payload.
    async fn authenticate(&self, request: &EpsonAuthRequest) -> Result<Value, EpsonAuthError>;
}

pub struct HttpEpsonAuthApi {
    http: Client,
    endpoint: Url,
}

impl HttpEpsonAuthApi {
    pub fn new(server_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build http client")?;
        Self::with_client(http, server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self> {
        let base = Url::parse(server_url)
            .with_context(|| format!("invalid server url: {server_url}"))?;
        let endpoint = base
            .join(EPSON_AUTH_PATH)
            .with_context(|| format!("failed to build auth endpoint from {server_url}"))?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl EpsonAuthApi for HttpEpsonAuthApi {
    async fn authenticate(&self, request: &EpsonAuthRequest) -> Result<Value, EpsonAuthError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|err| EpsonAuthError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| EpsonAuthError::Transport(err.to_string()))?;
        // Error pages are not always JSON; keep them as a string payload.
        let payload = serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));

        if status.is_success() {
            Ok(payload)
        } else {
            Err(EpsonAuthError::Rejected {
                status: status.as_u16(),
                payload,
            })
        }
    }
}

/// Accepts what an `<input type="email" required>` accepts.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ".!#$%&'*+/=?^_`{|}~-".contains(c));
    let domain_ok = domain.split('.').all(|label| {
        (1..=63).contains(&label.len())
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    });
    local_ok && domain_ok
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthDialogState {
    Closed,
    Open,
    Submitting,
    OpenWithError(EpsonAuthError),
}

impl AuthDialogState {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// The dialog's own backdrop element.
    Backdrop,
    /// Anything inside the dialog's content area.
    Content,
}

#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error("authorization dialog is not open")]
    NotOpen,
    #[error("an authorization request is already in flight")]
    InFlight,
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),
    #[error(transparent)]
    Auth(#[from] EpsonAuthError),
}

struct FlowState {
    dialog: AuthDialogState,
    in_flight: bool,
    draft_email: Option<String>,
}

/// Modal flow registering the user's Epson Connect email with the backend.
///
/// `in_flight` is tracked apart from the dialog state so closing and
/// reopening the dialog mid-request still cannot start a second request.
pub struct DeviceAuthorizationFlow {
    api: Arc<dyn EpsonAuthApi>,
    inner: Mutex<FlowState>,
    events: broadcast::Sender<PageEvent>,
}

impl DeviceAuthorizationFlow {
    pub fn new(api: Arc<dyn EpsonAuthApi>, events: broadcast::Sender<PageEvent>) -> Self {
        Self {
            api,
            inner: Mutex::new(FlowState {
                dialog: AuthDialogState::Closed,
                in_flight: false,
                draft_email: None,
            }),
            events,
        }
    }

    pub async fn state(&self) -> AuthDialogState {
        self.inner.lock().await.dialog.clone()
    }

    /// Email kept in the form after a failed attempt.
    pub async fn draft_email(&self) -> Option<String> {
        self.inner.lock().await.draft_email.clone()
    }

    pub async fn open(&self) {
        let mut inner = self.inner.lock().await;
        if inner.dialog == AuthDialogState::Closed {
            // Reopening over a pending request shows it as still submitting.
            let next = if inner.in_flight {
                AuthDialogState::Submitting
            } else {
                AuthDialogState::Open
            };
            self.transition(&mut inner, next);
        }
    }

    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.dialog != AuthDialogState::Closed {
            self.transition(&mut inner, AuthDialogState::Closed);
        }
    }

    /// Returns whether the click closed the dialog.
    pub async fn handle_click(&self, target: ClickTarget) -> bool {
        if target != ClickTarget::Backdrop {
            return false;
        }
        let mut inner = self.inner.lock().await;
        if inner.dialog == AuthDialogState::Closed {
            return false;
        }
        self.transition(&mut inner, AuthDialogState::Closed);
        true
    }

    pub async fn submit(&self, email: &str) -> Result<Value, AuthFlowError> {
        let email = email.trim();
        {
            let mut inner = self.inner.lock().await;
            if inner.in_flight {
                return Err(AuthFlowError::InFlight);
            }
            if inner.dialog == AuthDialogState::Closed {
                return Err(AuthFlowError::NotOpen);
            }
            if !is_valid_email(email) {
                return Err(AuthFlowError::InvalidEmail(email.to_string()));
            }
            inner.in_flight = true;
            inner.draft_email = Some(email.to_string());
            self.transition(&mut inner, AuthDialogState::Submitting);
        }

        let outcome = {
            let request = EpsonAuthRequest::for_email(email);
            self.api.authenticate(&request).await
        };

        let mut inner = self.inner.lock().await;
        inner.in_flight = false;
        match outcome {
            Ok(payload) => {
                info!(payload = %payload, "epson: authenticated successfully");
                inner.draft_email = None;
                if inner.dialog != AuthDialogState::Closed {
                    self.transition(&mut inner, AuthDialogState::Closed);
                }
                Ok(payload)
            }
            Err(err) => {
                error!(error = %err, "epson: authentication failed");
                if inner.dialog == AuthDialogState::Submitting {
                    self.transition(&mut inner, AuthDialogState::OpenWithError(err.clone()));
                } else {
                    warn!("epson: dialog closed before the failed request returned");
                }
                Err(err.into())
            }
        }
    }

    fn transition(&self, inner: &mut FlowState, next: AuthDialogState) {
        inner.dialog = next.clone();
        let _ = self.events.send(PageEvent::AuthDialogChanged(next));
    }
}

#[cfg(test)]
#[path = "tests/epson_auth_tests.rs"]
mod tests;
