//! Connection acceptance, routing and shutdown.

pub mod handler;
pub mod listener;
pub mod registry;
