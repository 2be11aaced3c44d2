//! Console screens.
//!
//! Pages keep only what a screen renders: form status, busy flags and one
//! [`ViewSlot`] per displayed resource. Dropping a page unmounts its scope, so
//! replies that arrive afterwards change nothing.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::{headlines, landing_route, DashboardSummary, FeedItem};
use crate::client::ApiClient;
use crate::config::Config;
use crate::error::ApiError;
use crate::navigation::Route;
use crate::topics::Topic;
use crate::view::{LoadState, ViewScope, ViewSlot};

pub const LOGIN_FAILED: &str = "Login failed. Please check your credentials.";
pub const SIGNUP_FAILED: &str = "An error occurred during sign-up. Please try again.";
pub const RESET_SENT: &str = "Password reset link sent to your email.";
pub const RESET_FAILED: &str = "Failed to send reset link. Please check your email.";
pub const WEEKLY_FAILED: &str = "Failed to send weekly newsletter.";
pub const TOPIC_FAILED: &str = "Failed to send topic newsletter.";
pub const LOAD_FAILED: &str = "Failed to load articles.";

/// Mount guard for screens that need a session.
struct Protected {
    scope: ViewScope,
    route: watch::Receiver<Route>,
}

impl Protected {
    fn mount(client: &ApiClient, name: &str) -> Option<Self> {
        if client.current_session().is_none() {
            client.navigator().redirect_to_login();
            return None;
        }
        Some(Self {
            scope: ViewScope::mount(name),
            route: client.navigator().subscribe(),
        })
    }

    fn redirect_pending(&self) -> bool {
        *self.route.borrow() == Route::Login
    }
}

impl Drop for Protected {
    fn drop(&mut self) {
        self.scope.unmount();
    }
}

fn select(list: &ViewSlot<Vec<FeedItem>>, selected: &ViewSlot<FeedItem>, index: usize) -> bool {
    let item = list
        .state()
        .loaded()
        .and_then(|items| items.get(index))
        .cloned();
    match item {
        Some(item) => {
            selected.show(item);
            true
        }
        None => false,
    }
}

pub struct SignInPage {
    client: Arc<ApiClient>,
    config: Arc<Config>,
    submitting: bool,
    error: Option<String>,
    reset_sending: bool,
    reset_message: Option<String>,
}

impl SignInPage {
    pub fn new(client: Arc<ApiClient>, config: Arc<Config>) -> Self {
        Self {
            client,
            config,
            submitting: false,
            error: None,
            reset_sending: false,
            reset_message: None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn reset_message(&self) -> Option<&str> {
        self.reset_message.as_deref()
    }

    pub fn is_sending_reset(&self) -> bool {
        self.reset_sending
    }

    /// Returns the landing route on success.
    pub async fn submit(&mut self, username: &str, password: &str) -> Option<Route> {
        if self.submitting {
            return None;
        }
        self.error = None;
        self.submitting = true;

        let outcome = self.client.login(username, password).await;
        self.submitting = false;

        match outcome {
            Ok(response) => {
                let route = landing_route(&self.config, &response.user.email);
                self.client.navigator().navigate(route);
                Some(route)
            }
            Err(e) => {
                self.error = e.user_message(LOGIN_FAILED);
                None
            }
        }
    }

    pub async fn send_reset_link(&mut self, email: &str) -> bool {
        self.reset_message = None;
        self.reset_sending = true;

        let outcome = self.client.request_password_reset(email).await;
        self.reset_sending = false;

        match outcome {
            Ok(_) => {
                self.reset_message = Some(RESET_SENT.to_string());
                true
            }
            Err(ApiError::Invalid(message)) => {
                self.reset_message = Some(message);
                false
            }
            Err(_) => {
                self.reset_message = Some(RESET_FAILED.to_string());
                false
            }
        }
    }
}

pub struct SignUpPage {
    client: Arc<ApiClient>,
    config: Arc<Config>,
    submitting: bool,
    error: Option<String>,
}

impl SignUpPage {
    pub fn new(client: Arc<ApiClient>, config: Arc<Config>) -> Self {
        Self {
            client,
            config,
            submitting: false,
            error: None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub async fn submit(&mut self, username: &str, email: &str, password: &str) -> Option<Route> {
        if self.submitting {
            return None;
        }
        self.error = None;
        self.submitting = true;

        let outcome = self.client.signup(username, email, password).await;
        self.submitting = false;

        match outcome {
            Ok(_) => {
                let route = landing_route(&self.config, email);
                self.client.navigator().navigate(route);
                Some(route)
            }
            Err(e) => {
                self.error = e.user_message(SIGNUP_FAILED);
                None
            }
        }
    }
}

/// Newsletter dispatch controls.
pub struct SettingsPage {
    client: Arc<ApiClient>,
    guard: Protected,
    busy: bool,
    status: Option<String>,
}

impl SettingsPage {
    /// `None` when there is no session; the navigator has been sent to login.
    pub fn mount(client: Arc<ApiClient>) -> Option<Self> {
        let guard = Protected::mount(&client, "settings")?;
        Some(Self {
            client,
            guard,
            busy: false,
            status: None,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn redirect_pending(&self) -> bool {
        self.guard.redirect_pending()
    }

    pub async fn send_weekly(&mut self) -> Option<u64> {
        if self.busy {
            return None;
        }
        self.busy = true;
        self.status = Some("Sending weekly newsletter...".to_string());

        let outcome = self.client.send_latest_newsletter().await;
        self.busy = false;

        match outcome {
            Ok(report) => {
                self.status = Some(format!(
                    "Weekly newsletter sent to {} subscribers.",
                    report.sent_count
                ));
                Some(report.sent_count)
            }
            Err(e) => {
                self.status = e.user_message(WEEKLY_FAILED);
                None
            }
        }
    }

    pub async fn send_topic(&mut self, topic: &str) -> Option<u64> {
        if self.busy {
            return None;
        }
        self.busy = true;
        let label = topic
            .parse::<Topic>()
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|_| topic.trim().to_string());
        self.status = Some(format!("Sending newsletter for topic: {}...", label));

        let outcome = self.client.send_topic_feed(topic).await;
        self.busy = false;

        match outcome {
            Ok(report) => {
                self.status = Some(format!(
                    "Newsletter sent to {} subscribers of '{}'.",
                    report.sent_count, label
                ));
                Some(report.sent_count)
            }
            Err(e) => {
                self.status = e.user_message(TOPIC_FAILED);
                None
            }
        }
    }

    pub async fn logout(&self) -> bool {
        let done = self.client.logout().await;
        self.guard.scope.unmount();
        done
    }
}

/// Public list of the newest article per topic.
pub struct LatestNewsPage {
    client: Arc<ApiClient>,
    scope: ViewScope,
    headlines: ViewSlot<Vec<FeedItem>>,
    selected: ViewSlot<FeedItem>,
}

impl LatestNewsPage {
    pub fn mount(client: Arc<ApiClient>) -> Self {
        let scope = ViewScope::mount("latest-news");
        let headlines = scope.slot("headlines");
        let selected = scope.slot("selected-headline");
        Self {
            client,
            scope,
            headlines,
            selected,
        }
    }

    /// Fetch (or re-fetch) the headlines.
    pub async fn load(&self) -> bool {
        let client = &self.client;
        client
            .track(&self.headlines, async move {
                client.latest_feeds(None).await.map(|feeds| headlines(&feeds))
            })
            .await
    }

    pub fn headlines(&self) -> LoadState<Vec<FeedItem>> {
        self.headlines.state()
    }

    pub fn open(&self, index: usize) -> bool {
        select(&self.headlines, &self.selected, index)
    }

    pub fn close(&self) {
        self.selected.reset();
    }

    pub fn selected(&self) -> Option<FeedItem> {
        self.selected.state().loaded().cloned()
    }
}

impl Drop for LatestNewsPage {
    fn drop(&mut self) {
        self.scope.unmount();
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TopicArticles {
    /// `None` when the user has no subscription.
    pub topic: Option<String>,
    pub items: Vec<FeedItem>,
}

async fn fetch_topic_articles(client: &ApiClient) -> Result<TopicArticles, ApiError> {
    let profile = client.profile().await?;
    let Some(topic) = profile.subscribed_topic else {
        return Ok(TopicArticles::default());
    };
    let feeds = client.latest_feeds(Some(&topic)).await?;
    Ok(TopicArticles {
        items: feeds.get(&topic).cloned().unwrap_or_default(),
        topic: Some(topic),
    })
}

/// Signed-in user's articles for their subscribed topic.
pub struct ArticlesPage {
    client: Arc<ApiClient>,
    guard: Protected,
    articles: ViewSlot<TopicArticles>,
    selected: ViewSlot<FeedItem>,
}

impl ArticlesPage {
    pub fn mount(client: Arc<ApiClient>) -> Option<Self> {
        let guard = Protected::mount(&client, "articles")?;
        let articles = guard.scope.slot("dashboard-articles");
        let selected = guard.scope.slot("selected-article");
        Some(Self {
            client,
            guard,
            articles,
            selected,
        })
    }

    pub async fn load(&self) -> bool {
        let client = &self.client;
        client
            .track(&self.articles, fetch_topic_articles(client))
            .await
    }

    pub fn articles(&self) -> LoadState<TopicArticles> {
        self.articles.state()
    }

    /// Inline text for a failed load; auth failures have none.
    pub fn error_message(&self) -> Option<String> {
        self.articles.state().error()?.user_message(LOAD_FAILED)
    }

    pub fn open(&self, index: usize) -> bool {
        let item = self
            .articles
            .state()
            .loaded()
            .and_then(|a| a.items.get(index))
            .cloned();
        match item {
            Some(item) => {
                self.selected.show(item);
                true
            }
            None => false,
        }
    }

    pub fn close(&self) {
        self.selected.reset();
    }

    pub fn selected(&self) -> Option<FeedItem> {
        self.selected.state().loaded().cloned()
    }

    pub fn redirect_pending(&self) -> bool {
        self.guard.redirect_pending()
    }

    pub async fn logout(&self) -> bool {
        let done = self.client.logout().await;
        self.guard.scope.unmount();
        done
    }
}

/// Admin overview of users and subscriptions.
pub struct AdminDashboardPage {
    client: Arc<ApiClient>,
    guard: Protected,
    summary: ViewSlot<DashboardSummary>,
}

impl AdminDashboardPage {
    pub fn mount(client: Arc<ApiClient>) -> Option<Self> {
        let guard = Protected::mount(&client, "admin-dashboard")?;
        let summary = guard.scope.slot("dashboard-summary");
        Some(Self {
            client,
            guard,
            summary,
        })
    }

    pub async fn load(&self) -> bool {
        let client = &self.client;
        client.track(&self.summary, client.dashboard()).await
    }

    pub fn summary(&self) -> LoadState<DashboardSummary> {
        self.summary.state()
    }

    pub fn redirect_pending(&self) -> bool {
        self.guard.redirect_pending()
    }
}
