//! Notification delivery core.
//!
//! - `queue`: broker-backed envelope queue with a simulated in-process fallback
//! - `service`: the notification state machine (create, process, retry)
//! - `registry` / `transport`: type-directed dispatch to channel transports
//! - `store`: persistence with optimistic concurrency
//! - `recovery`: re-enqueues notifications stuck in a non-terminal state

pub mod queue;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod service;
pub mod store;
pub mod transport;
