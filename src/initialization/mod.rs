//! Shared resource setup.
//!
//! This module provides functions to initialize:
//! - The process logger (plain or JSON lines)
//! - A [`crate::ThrottledClient`] with its HTTP connection pool and admission controller

mod client;
mod logger;

pub use client::{init_client, init_http_client};
pub use logger::init_logger_with;
