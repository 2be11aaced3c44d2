use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::FeedCache;
use crate::config::Config;
use crate::error::ApiError;
use crate::navigation::Navigator;
use crate::session::Session;
use crate::view::ViewSlot;

/// Scheme the backend's token authentication expects in `Authorization`.
pub const AUTH_SCHEME: &str = "Token";

/// One outbound call, fixed once issued.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    requires_auth: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            requires_auth: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }
}

/// A successful call, paired with the descriptor that produced it.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub payload: T,
    pub descriptor: RequestDescriptor,
}

pub struct ApiClient {
    http: Client,
    base: RwLock<Option<Url>>,
    session: Arc<Session>,
    navigator: Arc<Navigator>,
    pub(crate) feed_cache: FeedCache,
    pub(crate) logging_out: AtomicBool,
}

impl ApiClient {
    pub fn new(
        session: Arc<Session>,
        navigator: Arc<Navigator>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("NewsCrewConsole/0.1")
            .build()?;

        Ok(Self {
            http,
            base: RwLock::new(None),
            session,
            navigator,
            feed_cache: FeedCache::default(),
            logging_out: AtomicBool::new(false),
        })
    }

    pub fn from_config(
        config: &Config,
        session: Arc<Session>,
        navigator: Arc<Navigator>,
    ) -> anyhow::Result<Self> {
        let client = Self::new(
            session,
            navigator,
            Duration::from_secs(config.request_timeout),
        )?;
        client.configure(&config.base_url)?;
        Ok(client)
    }

    /// Point the client at a backend. Repeating the call with the same address
    /// is a no-op; a different address is refused.
    pub fn configure(&self, base_url: &str) -> anyhow::Result<()> {
        let mut url = Url::parse(base_url.trim())?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let mut base = self.base.write();
        match base.as_ref() {
            Some(existing) if *existing == url => Ok(()),
            Some(existing) => anyhow::bail!(
                "API client already configured for {}, refusing {}",
                existing,
                url
            ),
            None => {
                info!("API client configured for {}", url);
                *base = Some(url);
                Ok(())
            }
        }
    }

    pub fn base_url(&self) -> Option<Url> {
        self.base.read().clone()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    pub fn current_session(&self) -> Option<String> {
        self.session.current()
    }

    pub async fn set_session(&self, token: &str) -> anyhow::Result<()> {
        self.session.set(token).await
    }

    pub async fn clear_session(&self) -> anyhow::Result<bool> {
        self.session.clear().await
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Resolved<T>, ApiError> {
        let base = self.base_url().ok_or(ApiError::NotConfigured)?;

        let token = self.session.current();
        if descriptor.requires_auth && token.is_none() {
            warn!(
                "{} {} needs a session but none is active",
                descriptor.method, descriptor.path
            );
            self.navigator.redirect_to_login();
            return Err(ApiError::Unauthenticated);
        }

        let url = base
            .join(descriptor.path.trim_start_matches('/'))
            .map_err(|e| ApiError::Invalid(format!("invalid path '{}': {}", descriptor.path, e)))?;

        let mut builder = self.http.request(descriptor.method.clone(), url.clone());
        if !descriptor.query.is_empty() {
            builder = builder.query(&descriptor.query);
        }
        if let Some(token) = &token {
            builder = builder.header(AUTHORIZATION, format!("{} {}", AUTH_SCHEME, token));
        }
        if let Some(body) = &descriptor.body {
            builder = builder.json(body);
        }

        debug!("{} {}", descriptor.method, url);
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("{} {} got no response: {}", descriptor.method, url, e);
                return Err(ApiError::Unreachable(e.to_string()));
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("{} {} rejected the session", descriptor.method, url);
            self.expire_session(token.as_deref()).await;
            return Err(ApiError::Unauthenticated);
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!("{} {} response body was cut off: {}", descriptor.method, url, e);
                return Err(ApiError::Unreachable(e.to_string()));
            }
        };

        if !status.is_success() {
            let message = server_message(&body);
            warn!(
                "{} {} failed with {}: {}",
                descriptor.method,
                url,
                status,
                message.as_deref().unwrap_or("<no message>")
            );
            return Err(ApiError::rejected(status, message));
        }

        let payload = decode(status, &body).map_err(|e| {
            error!("{} {} returned an unexpected payload: {}", descriptor.method, url, e);
            ApiError::unexpected_shape(status)
        })?;

        Ok(Resolved {
            payload,
            descriptor: descriptor.clone(),
        })
    }

    /// Issue a fetch into `slot` now and settle it when `fetch` completes.
    ///
    /// The ticket is taken before the returned future is first polled, so
    /// issuance order is call order.
    pub fn track<'a, T, F>(&self, slot: &'a ViewSlot<T>, fetch: F) -> impl Future<Output = bool> + 'a
    where
        T: Clone + 'a,
        F: Future<Output = Result<T, ApiError>> + 'a,
    {
        let ticket = slot.begin();
        async move { slot.settle(ticket, fetch.await) }
    }

    pub fn load<'a, T>(
        &'a self,
        slot: &'a ViewSlot<T>,
        descriptor: RequestDescriptor,
    ) -> impl Future<Output = bool> + 'a
    where
        T: DeserializeOwned + Clone + 'a,
    {
        self.track(slot, async move {
            self.request::<T>(&descriptor).await.map(|r| r.payload)
        })
    }

    /// Drop the session `sent` was taken from. A 401 for a token that has
    /// since been replaced leaves the newer session and the route untouched.
    async fn expire_session(&self, sent: Option<&str>) {
        if let Some(sent) = sent {
            if let Err(e) = self.session.clear_if(sent).await {
                error!("Failed to remove expired session from storage: {}", e);
            }
        }
        if self.session.current().is_some_and(|t| Some(t.as_str()) != sent) {
            info!("Ignoring 401 for a session that has already been replaced");
            return;
        }
        self.navigator.redirect_to_login();
    }
}

/// Empty bodies decode as an empty JSON object.
fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> serde_json::Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        debug!("Empty {} response body", status);
        return serde_json::from_slice(b"{}");
    }
    serde_json::from_slice(body)
}

/// Pull a human-readable message out of an error body.
///
/// Looks at `message`, `error` and `detail` first, then at the first entry of
/// any field-level error list such as `{"email": ["already registered"]}`.
pub fn server_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object()?;

    for key in ["message", "error", "detail"] {
        if let Some(Value::String(message)) = object.get(key) {
            return Some(message.clone());
        }
    }

    object
        .values()
        .find_map(|v| v.as_array()?.first()?.as_str().map(str::to_string))
}
