//! # System Interaction Layer
//!
//! This module is the boundary between the core logic and the operating
//! system. Everything that spawns or observes child processes lives here.
//!
//! ## Modules
//!
//! - **`process_env`**: Materialises the resolved variable set of an
//!   environment and builds child processes that carry it.
//! - **`executor`**: Drives the parsed command stream: synchronous commands,
//!   the deferred background queue with its `WAIT` barrier, template
//!   rendering and per-command error policy.
//! - **`logger`**: The observer interface the executor reports lifecycle
//!   events through, with a colored console implementation.

pub mod executor;
pub mod logger;
pub mod process_env;
