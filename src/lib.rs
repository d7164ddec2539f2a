//! # Jiralink Library
//!
//! This library provides the core functionality for the jiralink service:
//! OAuth linking of a user's Jira Cloud account, encrypted token storage
//! with transparent refresh, and a uniform query surface over the linked
//! site's projects, issues, boards and sprints.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jira;
pub mod models;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub use migration;
