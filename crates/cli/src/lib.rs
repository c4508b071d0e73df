//! warpgen CLI
//!
//! Command-line client for the warpgen web service, plus local key
//! generation and allow-list previews.

pub mod client;
pub mod commands;
pub mod output;
