//! # wacast-core
//!
//! Core types, traits, configuration, and error handling for the wacast bot.

pub mod config;
pub mod contacts;
pub mod csv_codec;
pub mod error;
pub mod message;
pub mod phone;
pub mod traits;

pub use config::shellexpand;
