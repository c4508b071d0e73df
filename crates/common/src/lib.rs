//! warpgen Common Library
//!
//! Request types, key generation, allow-list aggregation and config rendering
//! shared by the warpgen service and CLI. Nothing in this crate performs I/O
//! on the request path.

pub mod aggregate;
pub mod catalog;
pub mod crypto;
pub mod error;
pub mod profile;
pub mod render;
pub mod types;

// Re-export commonly used types
pub use aggregate::{Aggregation, IpRangeAggregator, RangesStats};
pub use catalog::{ServiceCatalog, ServiceDirectory, ServiceInfo};
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use profile::{DeviceProfile, DeviceProfiles};
pub use render::ConfigRenderer;
pub use types::*;

/// warpgen version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
