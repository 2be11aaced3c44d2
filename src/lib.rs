//! NewsCrew Console - client side of the NewsCrew newsletter console
//!
//! Every backend call goes through a session-scoped API client that attaches
//! the login token, classifies failures and sends the user back to the login
//! screen when the session expires. Screens bind to per-resource load states
//! that ignore stale or late replies.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod navigation;
pub mod pages;
pub mod session;
pub mod storage;
pub mod topics;
pub mod view;
