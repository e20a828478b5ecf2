//! Scrapes a Tableau Server instance for "Who Has Seen" view statistics.
//!
//! The pipeline drives a Chrome browser through chromedriver: it verifies
//! the SSO session, enumerates the user's workbooks and their views,
//! downloads the per-view access CSV exports, merges them with workbook
//! metadata, resolves usernames to full names through an internal lookup
//! tool, and writes a two-sheet Excel report.

pub mod aggregate;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod identity;
pub mod report;
pub mod session;
