//! Shared types, error model, and configuration for TenderWatch.
//!
//! This crate is the foundation depended on by all other TenderWatch crates.
//! It provides:
//! - [`TenderWatchError`], the unified error type
//! - Domain types ([`UniqueId`], [`RecordFragment`], [`HistorySet`], [`EnrichedTender`])
//! - Configuration ([`AppConfig`], [`FilterCriteria`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_AUTHORITIES, DEFAULT_CPV_CODES, DEFAULT_KEYWORDS, FeedConfig,
    FilterCriteria, FiltersConfig, GeminiConfig, StorageConfig, api_key, config_dir,
    config_file_path, data_dir, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{Result, TenderWatchError};
pub use types::{EnrichedTender, HistorySet, IdSource, RecordFragment, UniqueId};
