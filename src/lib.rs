//! # dbscribe
//!
//! Persistence and retrieval for semantic models of relational databases.
//!
//! A semantic model is an enriched description of a database schema:
//! tables, views, and stored procedures, each carrying structural facts
//! plus AI-generated semantic descriptions. dbscribe stores these models
//! across pluggable backends (local disk, S3-compatible blob storage, a
//! SQLite document store), loads them lazily with caching and change
//! tracking, and indexes the entities as embedding vectors for
//! similarity search.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   ┌───────────────┐   ┌─────────────────┐
//! │ ModelRepository │──▶│  ModelStore    │──▶│ local-disk      │
//! │ cache + tracker │   │  (per strategy)│   │ blob (S3)       │
//! └───────┬────────┘   └───────────────┘   │ document-db     │
//!         │                                 └─────────────────┘
//!         ▼
//! ┌────────────────┐   ┌───────────────┐
//! │ SemanticModel  │──▶│ VectorIndex    │──▶ exhaustive cosine
//! │ lazy entities  │   │ writer/search  │    search
//! └────────────────┘   └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`model`] | Semantic model data types and entity collections |
//! | [`lazy`] | Lazily resolved entity slots with single-flight loading |
//! | [`tracking`] | Dirty/removed change tracking for partial saves |
//! | [`cache`] | TTL cache of loaded models |
//! | [`store`] | Persistence strategies and the manifest format |
//! | [`repository`] | Load/save orchestration over stores and cache |
//! | [`vector`] | Vector records, index writer, similarity search |
//! | [`embedding`] | Embedding provider seam |
//! | [`error`] | Storage and vector error taxonomy |

pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod lazy;
pub mod model;
pub mod repository;
pub mod store;
pub mod tracking;
pub mod vector;
