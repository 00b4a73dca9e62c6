//! prism-gateway - browser front end for Prism
//!
//! Serves the single prompt page and a WebSocket endpoint. Each submitted
//! prompt is routed to a provider and every cumulative snapshot is pushed
//! back to the page, which replaces its markdown panel with it.

pub mod events;
pub mod page;
pub mod protocol;
pub mod server;
pub mod session;

pub use server::{GatewayServer, GatewayState};
