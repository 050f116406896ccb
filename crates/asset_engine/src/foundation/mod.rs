//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Interning and cache arenas
//! - Time stamps for persisted documents
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod time;
pub mod logging;
