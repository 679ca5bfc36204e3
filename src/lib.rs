// src/lib.rs

//! gapscan library
//!
//! Incrementally crawls paginated listings of tracked entities, caches what
//! it discovers per entity, and reports the titles that are neither held
//! locally nor already downloaded.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
