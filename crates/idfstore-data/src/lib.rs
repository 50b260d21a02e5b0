//! File-backed loading and saving for idfstore.
//!
//! - [`persist`] reads schema and instance files into catalogs, collections
//!   and stores, and writes them back without clobbering by default.
//! - [`config`] loads a [`StoreConfig`](idfstore_core::config::StoreConfig)
//!   from RON, TOML or JSON.
//! - [`report`] renders validity reports as JSON.

pub mod config;
pub mod loader;
pub mod persist;
pub mod report;

pub use config::{ConfigData, find_config, load_config};
pub use loader::{Format, LoadError};
pub use persist::{
    PersistError, load_catalog, load_collection, load_store, save_collection, save_store,
};
pub use report::{report_document, report_json};
