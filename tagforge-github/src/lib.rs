//! TAGFORGE GitHub - REST client for the source-control upstream
//!
//! Wraps the handful of GitHub endpoints the service needs: repository
//! tags, workflow runs and their artifacts, workflow dispatch and artifact
//! download.

pub mod client;
pub mod config;

pub use client::{status_error, GithubClient, PER_PAGE};
pub use config::{validate_repository, GithubConfig, GithubToken};
