//! Periodic background tasks.
//!
//! Each submodule provides a long-running async `run` function intended to
//! be spawned via `tokio::spawn`. All tasks accept a [`CancellationToken`]
//! for graceful shutdown.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod publish;
pub mod sampling;
