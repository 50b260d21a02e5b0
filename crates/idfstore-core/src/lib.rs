//! idfstore core -- a schema-driven, text-serializable object store.
//!
//! A [`catalog::SchemaCatalog`] describes object types and their fields. An
//! instance file holds records of those types, each a comma-separated list
//! of values terminated by `;`, with `!` comments. The crate parses such a
//! file into an [`collection::InstanceCollection`], promotes it into a live
//! [`store::Store`], and prints it back.
//!
//! # Layers
//!
//! 1. **Schema** -- [`schema_text`] parses schema text into a frozen
//!    catalog: field kinds, bounds, keys, defaults, extensible groups and
//!    the group tags that decide which types a reference may target.
//! 2. **Text** -- [`text`] lexes records and comments; [`instance`] and
//!    [`collection`] bind them to the catalog and print them back.
//! 3. **Store** -- [`store`] keeps objects under generational handles with
//!    name, type and reference indices that every mutation keeps in step.
//! 4. **Validity** -- [`validity`] grades a store at a [`validity::Strictness`]
//!    and reports [`validity::DataError`]s.
//!
//! # Reference Pattern
//!
//! Reference fields hold the target's name as text. The store resolves them
//! and follows renames:
//!
//! ```rust,ignore
//! let store = Store::parse(text, Arc::new(catalog), StoreConfig::default())?;
//! let wall = store.objects_by_name("W1")[0].handle();
//! let zone = store.resolve(wall, 1);
//! ```
//!
//! # Key Types
//!
//! - [`store::Store`] -- Live object store and its indices.
//! - [`instance::Instance`] -- One typed record, values as optional text.
//! - [`catalog::SchemaCatalog`] -- Immutable set of object schemas.
//! - [`refs::OutboundRef`] / [`refs::InboundRef`] -- Views of the reference
//!   index.
//! - [`event::EventBus`] -- Synchronous, prioritized change notification.
//! - [`config::StoreConfig`] -- Removal policy, unknown-type policy,
//!   default strictness and print layout.

pub mod catalog;
pub mod collection;
pub mod config;
pub mod event;
pub mod field;
pub mod id;
pub mod instance;
pub mod naming;
pub mod refs;
pub mod schema;
pub mod schema_text;
pub mod store;
pub mod text;
pub mod validity;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use catalog::{CatalogBuilder, CatalogError, SchemaCatalog};
pub use collection::{InstanceCollection, Record};
pub use config::{RemovalPolicy, StoreConfig, UnknownTypePolicy};
pub use field::{FieldKind, FieldSpec};
pub use id::{ObjectHandle, ObjectTypeId, SubscriptionId};
pub use instance::Instance;
pub use schema::ObjectSchema;
pub use schema_text::SchemaError;
pub use store::{Order, Store, StoreError, StoredObject};
pub use text::ParseError;
pub use validity::{DataError, ErrorKind, Strictness, ValidityReport};
