//! # malmail
//!
//! Collects suspect email, pulls the links out of it, and crawls those links
//! with a roster of browser identities to catch sites that serve different
//! content to different requesters (cloaking). Everything observed is kept
//! in a provenance graph: domains, URLs, content, emails, and edges tagged
//! with the identity that saw them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │ Mailbox  │──▶│  email   │──▶│  provenance   │──▶│ Provenance   │
//! │ (*.eml)  │   │ content  │   │  (record_*)   │   │ Store        │
//! └──────────┘   └──────────┘   └───────▲───────┘   └──────┬───────┘
//!                                       │                  │ unexplored
//!                               ┌───────┴───────┐   ┌──────▼───────┐
//!                               │ MultiAgent    │◀──│ Crawl        │
//!                               │ Fetcher       │   │ Scheduler    │
//!                               └───────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! malmail init                          # create database
//! malmail ingest                        # read ./mail/**/*.eml
//! malmail crawl --depth 2               # fetch discovered links
//! malmail fetch https://suspect.example/ --out ./snap
//! malmail stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Provenance record types |
//! | [`content`] | Content variants and link extraction |
//! | [`html`] | `src`/`href` scan |
//! | [`charset`] | Charset decoding with 8-bit fallback |
//! | [`email`] | Message parsing and multipart flattening |
//! | [`transport`] | Single-fetch transport |
//! | [`fetcher`] | Multi-identity fetch and grouping |
//! | [`provenance`] | Store insertion contracts |
//! | [`store`] | Store trait and in-memory backend |
//! | [`sqlite_store`] | SQLite backend |
//! | [`mailbox`] | Message sources |
//! | [`ingest`] | Email ingestion |
//! | [`crawl`] | Round-based crawl |
//! | [`snapshot`] | `fetch` command output |
//! | [`stats`] | Store overview |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod charset;
pub mod config;
pub mod content;
pub mod crawl;
pub mod db;
pub mod email;
pub mod fetcher;
pub mod html;
pub mod ingest;
pub mod mailbox;
pub mod migrate;
pub mod models;
pub mod provenance;
pub mod snapshot;
pub mod sqlite_store;
pub mod stats;
pub mod store;
pub mod transport;
