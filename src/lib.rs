//! # scandex
//!
//! Watches a folder of scanned documents, extracts their text with OCR and
//! keeps a full-text search index in sync with what is on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  notify     │──▶│   Pipeline   │──▶│   Store   │
//! │  + rescan   │   │ hash→OCR→put │   │ FTS5 / ES │
//! └─────────────┘   └──────┬───────┘   └─────┬─────┘
//!                          │                 │
//!                     ┌────▼────┐       ┌────▼─────┐
//!                     │ Ledger  │       │ HTTP API │
//!                     └─────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scandex init                  # wait for the store, create the index
//! scandex scan                  # one pass over the watched folder
//! scandex watch                 # keep the index in sync until Ctrl-C
//! scandex serve                 # start the query API
//! scandex search "factura"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Content hashing |
//! | [`ledger`] | Last indexed fingerprint per path, per-path locks |
//! | [`extract`] | OCR adapter (tesseract, pdftoppm) |
//! | [`store`] | Document store backends |
//! | [`ingest`] | Ingestion pipeline |
//! | [`connector_fs`] | Recursive directory listing |
//! | [`watcher`] | Filesystem events |
//! | [`change_source`] | Watcher + periodic rescan daemon |
//! | [`search`] | Free-text search |
//! | [`get`] | Fetch and list documents |
//! | [`server`] | Read-only HTTP API |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | SQLite schema |

pub mod change_source;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod extract;
pub mod fingerprint;
pub mod get;
pub mod ingest;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod store;
pub mod watcher;
