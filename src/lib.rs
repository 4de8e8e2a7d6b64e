//! # Trackline - a resilient client core for work-item tracking services
//!
//! Trackline talks to JSON:API-based work-item trackers: an authenticated
//! transport with retry/backoff built on `reqwest`, plus a schema-flexible
//! decoding layer that reconciles the service's inconsistent custom-field
//! encodings into uniform typed accessors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use trackline::{Client, CustomFields, RetryStrategy};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct WorkItem {
//!     id: String,
//!     attributes: CustomFields,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), trackline::Error> {
//!     let client = Client::builder()
//!         .base_url("https://tracker.example.com/api/v1")?
//!         .bearer_token(std::env::var("TRACKER_TOKEN").unwrap())
//!         .timeout(Duration::from_secs(30))
//!         .retry_strategy(RetryStrategy::ExponentialBackoff {
//!             min_wait: Duration::from_millis(100),
//!             max_wait: Duration::from_secs(10),
//!             max_retries: 3,
//!         })
//!         .build()?;
//!
//!     let item = client
//!         .get::<WorkItem>("/projects/elibrary/workitems/EL-101")
//!         .await?;
//!
//!     // Typed reads over whatever shapes the server sent.
//!     let points = item.data.attributes.get_int("storyPoints");
//!     let budget = item.data.attributes.get_float("budget"); // number or "12.50"
//!     let assignee = item.data.attributes.get_relation("assignee");
//!     println!("{points:?} {budget:?} {assignee:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Layering
//!
//! - [`retry`] runs the attempt loop: jittered exponential backoff, a
//!   pluggable [`RetryPredicate`], deadline-based cancellation, and
//!   optional server rate-limit hints.
//! - [`Client`] is the authenticated transport: bearer credentials, media
//!   type negotiation, and classification of `>= 400` responses into
//!   [`Error::Api`] with the parsed per-field error envelope.
//! - [`response`] unwraps the service's `{"data": ...}` envelope into
//!   caller types.
//! - [`CustomFields`] and [`ResourceRef`] make up the field layer: pure,
//!   never-erroring coercion from raw JSON values to semantic kinds, and
//!   relationship references in both their envelope and legacy encodings.
//!
//! Which failures are retried is the caller's call: pass a
//! [`RetryPredicate`] matching the idempotency of the operation. Writes
//! that must not repeat can use [`retry::Retrier::once`] or leave the
//! strategy at its [`RetryStrategy::None`] default.

mod client;
mod error;
pub mod fields;
pub mod metadata;
pub mod rate_limit;
mod relations;
pub mod response;
pub mod retry;

pub use client::{Client, ClientBuilder, MEDIA_TYPE};
pub use error::{Error, ErrorDetail, Result};
pub use fields::{CustomFields, RichText, Table, TableRow};
pub use relations::{ResourceKind, ResourceRef};
pub use response::Response;
pub use retry::{Retrier, RetryPredicate, RetryStrategy};
