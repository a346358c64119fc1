//! Blog post pipeline library.
//!
//! Scrapes posts from a hosted blog with a headless browser (or its RSS
//! feed), stores them in SQLite keyed by normalized title, serves them as
//! JSON and RSS, and emails subscribers when new posts appear.

// Test fixtures embed HTML and XML in raw strings.
#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod db;
pub mod extractor;
pub mod feed;
pub mod ingest;
pub mod notify;
pub mod slug;
pub mod web;
