//! Contains all of the types needed to configure clients, sessions and bulk writes.
//!
//! The options structs in this module use the
//! [`typed-builder`](https://crates.io/crates/typed-builder) crate to derive a type-safe builder
//! API on them. For example, to create an instance of
//! [`ClientOptions`](struct.ClientOptions.html) that never retries writes:
//!
//! ```rust
//! # use mongodb_session_engine::options::ClientOptions;
//! #
//! let options = ClientOptions::builder()
//!     .retry_writes(false)
//!     .max_write_batch_size(500)
//!     .build();
//! ```

pub use crate::{client::options::*, concern::*, selection_criteria::*};
