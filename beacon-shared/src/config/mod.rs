//! # Configuration
//!
//! Configuration structures for the Beacon server and its clients.

pub mod server;
