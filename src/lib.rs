//! flowprobe - HTTP test-fixture server
//!
//! Request handlers exercising streaming, flow control and cross-connection
//! coordination: echo, `100-continue`, flow-controlled random bodies, health
//! checks and `/wait` + `/release` pairs.

pub mod config;
pub mod context;
pub mod handler;
pub mod http;
pub mod registry;
pub mod server;
pub mod transaction;
