//! CLI Commands

pub mod generate;
pub mod keygen;
pub mod ranges;
pub mod services;
