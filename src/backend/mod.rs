//! backend
//!
//! The remote state backend facade.
//!
//! # Architecture
//!
//! [`StateBackend`] is built explicitly from a validated
//! [`BackendConfig`](crate::core::config::BackendConfig) and owns everything
//! it talks to: the codec, the lock coordinator with its store connection,
//! and the git durability layer. There is no global state, so tests build
//! backends from parts with an in-memory lock store.
//!
//! # Modules
//!
//! - `facade`: [`StateBackend`] and [`ApplyAck`]
//! - `error`: [`BackendError`], [`ErrorKind`] and status codes

mod error;
mod facade;

pub use error::{BackendError, ErrorKind};
pub use facade::{ApplyAck, StateBackend};
