//! # wacast-channels
//!
//! Messaging platform integrations for wacast.

pub mod whatsapp;
