//! # Observability Module
//!
//! - **Structured Logging**: pretty or JSON logs with request IDs and context
//! - **Request Tracing**: request ID propagation through the proxy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::Router;
//! use gitgate_node::observability::{init_logging, request_id_middleware, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//!
//! let app: Router<()> =
//!     Router::new().layer(axum::middleware::from_fn(request_id_middleware));
//! ```

mod logging;
pub mod middleware;

pub use logging::{init_logging, LogFormat};
pub use middleware::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
