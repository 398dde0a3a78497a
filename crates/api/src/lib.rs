//! Powerwatch API server library.
//!
//! Exposes the building blocks (config, state, router, handlers, sampler
//! adapter, background tasks) so integration tests and the binary
//! entrypoint can both access them.

pub mod background;
pub mod collector;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod thermal;
