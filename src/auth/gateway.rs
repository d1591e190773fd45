//! Single chokepoint for backend calls: attaches the stored bearer token and
//! turns response statuses into [`AuthError`] kinds.

use std::sync::{Arc, Weak};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::auth::config::ConsoleConfig;
use crate::auth::responses::{ApiResponse, ErrorBody};
use crate::auth::store::CredentialStore;
use crate::auth::{AuthError, AuthResult};

/// A call as the rest of the console describes it.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub requires_auth: bool,
}

impl RequestEnvelope {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            requires_auth: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post<B: Serialize>(path: impl Into<String>, body: &B) -> AuthResult<Self> {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put<B: Serialize>(path: impl Into<String>, body: &B) -> AuthResult<Self> {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn with_body<B: Serialize>(mut self, body: &B) -> AuthResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Marks the call as anonymous; no credential is attached even if one is stored.
    pub fn without_auth(mut self) -> Self {
        self.requires_auth = false;
        self
    }
}

/// A call as the transport sees it, credential already resolved.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn json(status: StatusCode, value: serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string().into_bytes(),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(&self, request: OutboundRequest) -> AuthResult<TransportResponse>;
}

#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ConsoleConfig) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent("admin-console/0.1")
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(&self, request: OutboundRequest) -> AuthResult<TransportResponse> {
        let mut builder = self
            .http
            .request(request.method, self.url_for(&request.path));
        if let Some(token) = request.bearer.as_deref() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body.as_ref() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse { status, body })
    }
}

/// Subscriber for the two failure events the gateway publishes.
///
/// Both callbacks run before the failing call resolves and must tolerate
/// being invoked when there is no session left to invalidate.
pub trait AuthEventHandler: Send + Sync {
    fn on_unauthenticated(&self);
    fn on_forbidden(&self, path: &str);
}

pub struct RequestGateway {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    handler: RwLock<Option<Weak<dyn AuthEventHandler>>>,
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            transport,
            store,
            handler: RwLock::new(None),
        }
    }

    /// Registers the auth event subscriber, replacing any earlier one.
    pub fn set_auth_handlers(&self, handler: Weak<dyn AuthEventHandler>) {
        let previous = self.handler.write().replace(handler);
        if previous.is_some() {
            log::debug!("replaced previously registered auth event handler");
        }
    }

    pub async fn send<T: DeserializeOwned>(
        &self,
        envelope: RequestEnvelope,
    ) -> AuthResult<ApiResponse<T>> {
        // Read per dispatch so a login is visible to every later call.
        let bearer = if envelope.requires_auth {
            self.store.token()
        } else {
            None
        };

        let method = envelope.method.clone();
        let path = envelope.path.clone();
        let started = Instant::now();

        let response = self
            .transport
            .dispatch(OutboundRequest {
                method: envelope.method,
                path: envelope.path,
                body: envelope.body,
                bearer,
            })
            .await
            .inspect_err(|err| log::warn!("{} {} failed: {}", method, path, err))?;

        log::debug!(
            "{} {} -> {} ({:.2}ms)",
            method,
            path,
            response.status.as_u16(),
            started.elapsed().as_secs_f64() * 1000.0
        );

        self.interpret(&path, response)
    }

    fn interpret<T: DeserializeOwned>(
        &self,
        path: &str,
        response: TransportResponse,
    ) -> AuthResult<ApiResponse<T>> {
        let status = response.status;

        if status == StatusCode::UNAUTHORIZED {
            log::warn!("{} rejected the session credential", path);
            self.notify(|handler| handler.on_unauthenticated());
            return Err(AuthError::AuthExpired {
                message: server_message(&response.body),
            });
        }

        if status == StatusCode::FORBIDDEN {
            log::warn!("{} denied for the current role", path);
            self.notify(|handler| handler.on_forbidden(path));
            return Err(AuthError::Forbidden {
                message: server_message(&response.body),
            });
        }

        if !status.is_success() {
            let message = server_message(&response.body)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            return Err(AuthError::RequestFailed {
                status: Some(status),
                message,
            });
        }

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ApiResponse::empty_success());
        }

        Ok(serde_json::from_slice(&response.body)?)
    }

    fn notify(&self, deliver: impl FnOnce(&dyn AuthEventHandler)) {
        let handler = self.handler.read().as_ref().and_then(Weak::upgrade);
        match handler {
            Some(handler) => deliver(handler.as_ref()),
            None => log::debug!("no auth event handler registered"),
        }
    }
}

fn server_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
}
