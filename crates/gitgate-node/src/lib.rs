//! # gitgate node
//!
//! A reverse proxy in front of a hosted git service that writes an audit
//! log entry for every push it forwards.
//!
//! ```text
//! git client ──► /github.com/{owner}/{repo}/... ──► access list ──► upstream
//!                                                      │
//!                                 POST git-receive-pack│ copy of body
//!                                                      ▼
//!                                          gitgate_git::PushEvent ──► tracing
//! ```
//!
//! Decoding never affects forwarding: a push that cannot be decoded is
//! logged and proxied unchanged.
//!
//! ## Modules
//!
//! - [`access`] - Repository access list
//! - [`config`] - Node configuration management
//! - [`observability`] - Structured logging and request tracing
//! - [`proxy`] - Router, upstream forwarding and push observation

pub mod access;
pub mod config;
pub mod observability;
pub mod proxy;
