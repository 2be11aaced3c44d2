use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, info};

/// Console screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Signup,
    AdminDashboard,
    UserDashboard,
    Settings,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::AdminDashboard => "/dashboard",
            Route::UserDashboard => "/uDashboard",
            Route::Settings => "/settings",
        }
    }

    pub fn requires_session(&self) -> bool {
        matches!(
            self,
            Route::AdminDashboard | Route::UserDashboard | Route::Settings
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Current route, observable by every mounted view.
///
/// Auth failures funnel through [`Navigator::redirect_to_login`], which only
/// moves the route when it is not already on the login screen. Any number of
/// concurrent failures therefore produce a single redirect.
pub struct Navigator {
    route: watch::Sender<Route>,
    redirects: AtomicU64,
}

impl Navigator {
    pub fn new(start: Route) -> Self {
        let (route, _) = watch::channel(start);
        Self {
            route,
            redirects: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Route {
        *self.route.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Route> {
        self.route.subscribe()
    }

    pub fn navigate(&self, to: Route) {
        let from = self.route.send_replace(to);
        if from != to {
            info!("Navigating {} -> {}", from, to);
        }
    }

    /// Returns `true` if this call performed the redirect.
    pub fn redirect_to_login(&self) -> bool {
        let redirected = self.route.send_if_modified(|route| {
            if *route == Route::Login {
                false
            } else {
                *route = Route::Login;
                true
            }
        });

        if redirected {
            self.redirects.fetch_add(1, Ordering::SeqCst);
            info!("Authentication required, redirecting to {}", Route::Login);
        } else {
            debug!("Login redirect already in progress");
        }
        redirected
    }

    /// Number of login redirects performed so far.
    pub fn redirect_count(&self) -> u64 {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Route::Home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_paths() {
        assert_eq!(Route::Login.path(), "/login");
        assert_eq!(Route::UserDashboard.to_string(), "/uDashboard");
    }

    #[test]
    fn test_protected_routes() {
        assert!(Route::Settings.requires_session());
        assert!(Route::AdminDashboard.requires_session());
        assert!(!Route::Home.requires_session());
        assert!(!Route::Login.requires_session());
    }

    #[test]
    fn test_repeated_redirects_collapse() {
        let nav = Navigator::new(Route::Settings);
        assert!(nav.redirect_to_login());
        assert!(!nav.redirect_to_login());
        assert!(!nav.redirect_to_login());
        assert_eq!(nav.current(), Route::Login);
        assert_eq!(nav.redirect_count(), 1);
    }

    #[test]
    fn test_redirect_rearms_after_navigation() {
        let nav = Navigator::new(Route::Settings);
        nav.redirect_to_login();
        nav.navigate(Route::UserDashboard);
        assert!(nav.redirect_to_login());
        assert_eq!(nav.redirect_count(), 2);
    }

    #[tokio::test]
    async fn test_subscribers_observe_redirect() {
        let nav = Navigator::new(Route::UserDashboard);
        let mut rx = nav.subscribe();

        nav.redirect_to_login();
        nav.redirect_to_login();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Route::Login);
        assert!(!rx.has_changed().unwrap());
    }
}
