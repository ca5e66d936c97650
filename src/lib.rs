//! # food-etl
//!
//! Extracts product records from the Open Food Facts API, normalizes them,
//! and loads them into a relational database with deduplicated reference
//! data (brands, categories, tags, nutrients, ingredients).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │   Fetcher   │──▶│  Transform  │──▶│ Load+Resolve │──▶│  SQLite  │
//! │ (OFF API v2)│   │ (normalize) │   │ (one tx/code)│   │          │
//! └─────────────┘   └─────────────┘   └──────────────┘   └────┬─────┘
//!                                                              │
//!                                              ┌───────────────┤
//!                                              ▼               ▼
//!                                         ┌────────┐      ┌────────┐
//!                                         │  get   │      │ stats  │
//!                                         └────────┘      └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! food-etl init                                   # create the schema
//! food-etl run 3017620422003 7622210449283        # load two products
//! food-etl run --codes-file codes.txt --dry-run   # validate without writing
//! food-etl get 3017620422003 --json
//! food-etl stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and placeholder guard |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Normalized record and reference entity types |
//! | [`fetch`] | Upstream product source |
//! | [`transform`] | Raw document → normalized record |
//! | [`resolve`] | Get-or-create for reference entities |
//! | [`load`] | Writes one normalized record |
//! | [`pipeline`] | Per-code fetch/transform/load with transactions |
//! | [`progress`] | Run progress on stderr |
//! | [`get`] | Read a product back by code |
//! | [`stats`] | Row counts and last load |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod get;
pub mod load;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod resolve;
pub mod stats;
pub mod transform;
