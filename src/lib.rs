#![deny(missing_docs)]

//! Core library for the docbrief document summarization service.

/// HTTP routing and REST handlers.
pub mod api;
/// Output document rendering.
pub mod artifact;
/// Environment-driven configuration management.
pub mod config;
/// Text extraction from slide decks and PDFs.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Summarization metrics helpers.
pub mod metrics;
/// Extract, chunk, summarize, and aggregate pipeline.
pub mod pipeline;
/// Request-scoped upload files.
pub mod staging;
/// Text generation backends and the per-chunk summarizer.
pub mod summarization;
