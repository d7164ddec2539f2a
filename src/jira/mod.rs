//! Jira OAuth lifecycle and data-access layer.
//!
//! `oauth` owns the authorization-code flow, token refresh and the
//! integration record lifecycle; `client` selects a working API client for
//! a linked site; `dashboard` composes client calls into aggregate views.

pub mod client;
pub mod dashboard;
pub mod error;
pub mod oauth;
pub mod types;

pub use client::{JiraApi, JiraClientFactory};
pub use dashboard::DashboardService;
pub use error::JiraError;
pub use oauth::JiraOAuthService;
