pub mod api;
pub mod config;
pub mod predict;
pub mod prometheus;
pub mod router;
pub mod server;
