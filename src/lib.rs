//! Session-aware command execution and batched writes for MongoDB clients.
//!
//! This crate sits between an application-facing API and an RPC [`channel`](channel::Channel)
//! to a single server. Every command it sends is decorated with the session id, the highest
//! known cluster time, a causal read concern and, for writes that can be safely replayed, a
//! transaction number. Bulk writes are split into batches that respect the server's count and
//! size limits, and the per-batch replies are merged back into one result whose indexes refer
//! to the caller's original operations.
//!
//! # Example
//!
//! ```rust
//! # use std::sync::Arc;
//! # use mongodb_session_engine::{
//! #     bson::doc,
//! #     channel::Channel,
//! #     error::Result,
//! #     options::SessionOptions,
//! #     Client,
//! # };
//! #
//! # async fn example(channel: Arc<dyn Channel>) -> Result<()> {
//! let client = Client::new(channel);
//! let options = SessionOptions::builder().causal_consistency(true).build();
//! let mut session = client.start_session(options)?;
//!
//! let coll = client.database("app").collection("events");
//! let mut bulk = coll.initialize_unordered_bulk_op();
//! for i in 0..2500 {
//!     bulk.insert(doc! { "i": i })?;
//! }
//! let result = bulk.execute_with_session(None, &mut session).await?;
//! assert_eq!(result.n_inserted, 2500);
//!
//! // Observes the inserts above.
//! session
//!     .database("app")
//!     .run_command(doc! { "count": "events" })
//!     .await?;
//! session.end().await?;
//! # Ok(())
//! # }
//! ```
#![warn(
    rustdoc::missing_crate_level_docs,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
#![allow(
    clippy::unreadable_literal,
    clippy::cognitive_complexity,
    clippy::match_like_matches_macro,
    clippy::derive_partial_eq_without_eq
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod options;

mod bson_util;
pub mod bulk;
pub mod channel;
mod client;
mod coll;
mod command;
mod concern;
mod db;
pub mod error;
mod operation;
pub mod results;
mod selection_criteria;
mod trace;

pub use ::bson;

pub use crate::{
    bulk::BulkWrite,
    client::{
        session::{ClientSession, ClusterTime},
        Client,
    },
    coll::{Collection, Namespace},
    db::{Database, SessionDatabase},
};
