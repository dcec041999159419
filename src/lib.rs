//! writing-compiler library crate
//!
//! Exposes the pipeline, settings and rendering so the binary, benchmarks
//! and other front ends share one implementation.

pub mod app;
pub mod compiler;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod ui;
pub mod util;
