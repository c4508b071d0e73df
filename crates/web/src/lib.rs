//! warpgen Web Service
//!
//! Registers a fresh WARP device per request and returns the matching
//! WireGuard configuration and QR image over HTTP.

pub mod config;
pub mod pipeline;
pub mod qr;
pub mod registration;
pub mod server;

pub use config::{QrBackend, WarpgenConfig};
pub use pipeline::{GenerationStats, Generator, StatsSnapshot};
pub use qr::{QrEncoder, QrOptions};
pub use registration::{Provisioner, RegistrationClient};
pub use server::{ApiError, WebServer};
