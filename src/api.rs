//! Typed calls to the NewsCrew backend.
//!
//! Every operation builds a [`RequestDescriptor`] and goes through
//! [`ApiClient::request`], so credential handling and failure classification are
//! the same for all of them.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::client::{ApiClient, RequestDescriptor};
use crate::config::Config;
use crate::error::ApiError;
use crate::navigation::Route;
use crate::topics::Topic;

pub const LATEST_FEEDS_PATH: &str = "/api/latest-feeds/";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedItem {
    /// Filled from the response key; the backend does not repeat it per item.
    #[serde(default)]
    pub topic: String,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub published: String,
}

impl FeedItem {
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc2822(self.published.trim())
            .or_else(|_| DateTime::parse_from_rfc3339(self.published.trim()))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Full content when the feed has it, else the summary.
    pub fn body(&self) -> &str {
        self.content.as_deref().unwrap_or(&self.summary)
    }
}

/// Topic name to items, newest first.
pub type LatestFeeds = BTreeMap<String, Vec<FeedItem>>;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct UserSummary {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignupResponse {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SendReport {
    #[serde(default)]
    pub sent_count: u64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub is_staff: bool,
    pub date_joined: Option<DateTime<Utc>>,
    pub subscribed_topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct TopicSetting {
    topic: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct UserRow {
    pub username: String,
    pub email: String,
    pub date_joined: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SubscriptionRow {
    pub email: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct DashboardSummary {
    pub total_subscriptions: u64,
    pub all_users: Vec<UserRow>,
    pub all_subscriptions: Vec<SubscriptionRow>,
}

/// Last successful feed fetch per topic key (`None` is the all-topics list).
#[derive(Default)]
pub struct FeedCache {
    entries: Mutex<HashMap<Option<String>, LatestFeeds>>,
}

impl FeedCache {
    pub fn get(&self, topic: Option<&str>) -> Option<LatestFeeds> {
        self.entries.lock().get(&topic.map(str::to_string)).cloned()
    }

    fn store(&self, topic: Option<&str>, feeds: LatestFeeds) {
        self.entries.lock().insert(topic.map(str::to_string), feeds);
    }
}

pub fn latest_feeds_descriptor(topic: Option<&str>) -> RequestDescriptor {
    let descriptor = RequestDescriptor::get(LATEST_FEEDS_PATH);
    match topic {
        Some(topic) => descriptor.with_query("topic", topic),
        None => descriptor,
    }
}

/// Newest item of each topic, in topic order.
pub fn headlines(feeds: &LatestFeeds) -> Vec<FeedItem> {
    let mut items: Vec<FeedItem> = feeds
        .values()
        .filter_map(|items| items.first().cloned())
        .collect();
    items.sort_by_key(|item| Topic::rank(&item.topic));
    items
}

fn normalize(mut feeds: LatestFeeds) -> LatestFeeds {
    for (topic, items) in feeds.iter_mut() {
        for item in items.iter_mut() {
            item.topic = topic.clone();
            if item.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
                item.content = None;
            }
        }
    }
    feeds
}

fn require(value: &str, message: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Invalid(message.to_string()));
    }
    Ok(())
}

fn parse_topic(topic: &str) -> Result<Topic, ApiError> {
    require(topic, "Please select a topic first.")?;
    topic.parse::<Topic>().map_err(ApiError::Invalid)
}

/// Where a freshly signed-in user lands.
pub fn landing_route(config: &Config, email: &str) -> Route {
    if config.is_admin(email) {
        Route::AdminDashboard
    } else {
        Route::UserDashboard
    }
}

/// Marks a logout as running; released on drop, so a cancelled logout does
/// not block the next one.
struct LogoutGuard<'a>(&'a AtomicBool);

impl<'a> LogoutGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LogoutGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ApiClient {
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        require(username, "Both username and password are required.")?;
        require(password, "Both username and password are required.")?;

        let descriptor = RequestDescriptor::post(
            "/api/login/",
            json!({ "username": username, "password": password }),
        );
        let response: LoginResponse = self.request(&descriptor).await?.payload;
        self.start_session(&response.token).await?;
        info!("Logged in as '{}'", username);
        Ok(response)
    }

    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupResponse, ApiError> {
        require(username, "Username is required.")?;
        require(email, "Email is required.")?;
        require(password, "Password is required.")?;

        let descriptor = RequestDescriptor::post(
            "/api/signup/",
            json!({ "username": username, "email": email, "password": password }),
        );
        let response: SignupResponse = self.request(&descriptor).await?.payload;
        self.start_session(&response.token).await?;
        info!("Signed up as '{}'", username);
        Ok(response)
    }

    async fn start_session(&self, token: &str) -> Result<(), ApiError> {
        if token.trim().is_empty() {
            error!("Backend issued an empty token");
            return Err(ApiError::unexpected_shape(reqwest::StatusCode::OK));
        }
        // The in-memory session is live even if persisting it fails.
        if let Err(e) = self.set_session(token).await {
            warn!("Session will not survive a restart: {}", e);
        }
        Ok(())
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<Acknowledgement, ApiError> {
        require(email, "Please enter your email address.")?;
        let descriptor = RequestDescriptor::post("/api/password-reset/", json!({ "email": email }));
        Ok(self.request(&descriptor).await?.payload)
    }

    pub async fn confirm_password_reset(
        &self,
        uid: &str,
        token: &str,
        password: &str,
    ) -> Result<Acknowledgement, ApiError> {
        require(uid, "Invalid reset link.")?;
        require(token, "Invalid reset link.")?;
        require(password, "Password is required.")?;

        let descriptor = RequestDescriptor::post(
            format!("/api/password-reset-confirm/{}/{}/", uid.trim(), token.trim()),
            json!({ "password": password }),
        );
        Ok(self.request(&descriptor).await?.payload)
    }

    /// Tell the backend, then drop the session and go to the login screen.
    ///
    /// A failed logout call does not keep the user signed in. Returns `false`
    /// when another logout was already running.
    pub async fn logout(&self) -> bool {
        let Some(_guard) = LogoutGuard::acquire(&self.logging_out) else {
            info!("Logout already in progress, skipping");
            return false;
        };

        if self.session().is_active() {
            let descriptor = RequestDescriptor::post("/api/user/logout", json!({})).authenticated();
            if let Err(e) = self.request::<Acknowledgement>(&descriptor).await {
                warn!("Logout request failed: {}", e);
            }
        }

        match self.clear_session().await {
            Ok(true) => info!("Logged out"),
            Ok(false) => debug!("No session left to clear"),
            Err(e) => error!("Failed to remove session from storage: {}", e),
        }
        self.navigator().navigate(Route::Login);
        true
    }

    pub async fn latest_feeds(&self, topic: Option<&str>) -> Result<LatestFeeds, ApiError> {
        let descriptor = latest_feeds_descriptor(topic);
        let feeds = normalize(self.request::<LatestFeeds>(&descriptor).await?.payload);
        debug!(
            "Fetched {} topics ({} items)",
            feeds.len(),
            feeds.values().map(Vec::len).sum::<usize>()
        );
        self.feed_cache.store(topic, feeds.clone());
        Ok(feeds)
    }

    pub fn cached_feeds(&self, topic: Option<&str>) -> Option<LatestFeeds> {
        self.feed_cache.get(topic)
    }

    pub async fn send_latest_newsletter(&self) -> Result<SendReport, ApiError> {
        let descriptor = RequestDescriptor::get("/api/send-latest-newsletter/").authenticated();
        let report: SendReport = self.request(&descriptor).await?.payload;
        info!("Weekly newsletter sent to {} subscribers", report.sent_count);
        Ok(report)
    }

    pub async fn send_topic_feed(&self, topic: &str) -> Result<SendReport, ApiError> {
        let topic = parse_topic(topic)?;
        let descriptor =
            RequestDescriptor::post("/api/send-topic-feed/", json!({ "topic": topic })).authenticated();
        let report: SendReport = self.request(&descriptor).await?.payload;
        info!("{} newsletter sent to {} subscribers", topic, report.sent_count);
        Ok(report)
    }

    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        let descriptor = RequestDescriptor::get("/api/user/profile/").authenticated();
        Ok(self.request(&descriptor).await?.payload)
    }

    /// `None` when the user has not subscribed to anything yet.
    pub async fn subscribed_topic(&self) -> Result<Option<String>, ApiError> {
        let descriptor = RequestDescriptor::get("/api/update_user_topic/").authenticated();
        match self.request::<TopicSetting>(&descriptor).await {
            Ok(resolved) => Ok(Some(resolved.payload.topic)),
            Err(ApiError::RequestRejected { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn update_topic(&self, topic: &str) -> Result<Acknowledgement, ApiError> {
        let topic = parse_topic(topic)?;
        let descriptor =
            RequestDescriptor::post("/api/update_user_topic/", json!({ "topic": topic })).authenticated();
        Ok(self.request(&descriptor).await?.payload)
    }

    pub async fn subscribe(&self, email: &str, topic: &str) -> Result<Acknowledgement, ApiError> {
        require(email, "Please enter your email address.")?;
        let topic = parse_topic(topic)?;
        let descriptor = RequestDescriptor::post(
            "/api/subscribe/",
            json!({ "email": email.trim(), "topic": topic }),
        );
        Ok(self.request(&descriptor).await?.payload)
    }

    pub async fn dashboard(&self) -> Result<DashboardSummary, ApiError> {
        let descriptor = RequestDescriptor::get("/api/dashboard/").authenticated();
        Ok(self.request(&descriptor).await?.payload)
    }
}
