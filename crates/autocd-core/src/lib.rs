//! Core domain types and traits for autocd.
//!
//! This crate contains:
//! - Run identifiers
//! - The script runner trait and execution result types
//! - Webhook payload types and their script environment mapping
//! - Webhook signature verification
//! - Output line classification

pub mod classify;
pub mod error;
pub mod event;
pub mod executor;
pub mod id;
pub mod signature;

pub use error::{Error, Result};
pub use id::RunId;
