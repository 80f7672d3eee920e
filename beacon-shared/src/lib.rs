#![cfg_attr(not(test), forbid(unsafe_code))]

//! Models, configuration, and client-side session logic shared by the Beacon
//! server and command-line client.

pub mod config;
pub mod models;
pub mod session;
