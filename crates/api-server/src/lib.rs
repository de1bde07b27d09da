//! HTTP surface for the delivery engine — the trigger endpoint plus
//! operational probes.

pub mod rest;
pub mod server;

pub use rest::AppState;
pub use server::ApiServer;
