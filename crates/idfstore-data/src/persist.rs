//! Reading and writing schema and instance files.

use idfstore_core::catalog::SchemaCatalog;
use idfstore_core::collection::InstanceCollection;
use idfstore_core::config::{StoreConfig, UnknownTypePolicy};
use idfstore_core::store::Store;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::loader::{LoadError, read_text};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// `overwrite` was false and the destination already exists.
    #[error("refusing to overwrite existing file {0}")]
    FileExists(PathBuf),
    #[error("{file}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ===========================================================================
// Loading
// ===========================================================================

pub fn load_catalog(path: &Path) -> Result<SchemaCatalog, LoadError> {
    let text = read_text(path)?;
    let catalog = SchemaCatalog::parse(&text).map_err(|source| LoadError::Schema {
        file: path.to_path_buf(),
        source,
    })?;
    info!(
        target: "idfstore::persist",
        file = %path.display(),
        types = catalog.len(),
        version = %catalog.version(),
        "loaded schema"
    );
    Ok(catalog)
}

pub fn load_collection(
    path: &Path,
    catalog: &SchemaCatalog,
    unknown_types: UnknownTypePolicy,
) -> Result<InstanceCollection, LoadError> {
    let text = read_text(path)?;
    InstanceCollection::parse(&text, catalog, unknown_types).map_err(|source| LoadError::Instance {
        file: path.to_path_buf(),
        source,
    })
}

/// Load an instance file into a store.
pub fn load_store(path: &Path, catalog: Arc<SchemaCatalog>, config: StoreConfig) -> Result<Store, LoadError> {
    let collection = load_collection(path, &catalog, config.unknown_types)?;
    let store = Store::from_collection(catalog, collection, config);
    info!(
        target: "idfstore::persist",
        file = %path.display(),
        objects = store.len(),
        "loaded store"
    );
    Ok(store)
}

// ===========================================================================
// Saving
// ===========================================================================

/// Write `text` to `path`. Without `overwrite` the file is created
/// exclusively, so an existing file is never clobbered.
fn write_text(path: &Path, text: &str, overwrite: bool) -> Result<(), PersistError> {
    let io_error = |source| PersistError::Io {
        file: path.to_path_buf(),
        source,
    };
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options.open(path).map_err(|e| {
        if e.kind() == ErrorKind::AlreadyExists {
            PersistError::FileExists(path.to_path_buf())
        } else {
            io_error(e)
        }
    })?;
    file.write_all(text.as_bytes()).map_err(io_error)?;
    file.sync_all().map_err(io_error)
}

pub fn save_store(store: &Store, path: &Path, overwrite: bool) -> Result<(), PersistError> {
    write_text(path, &store.print(), overwrite)?;
    info!(
        target: "idfstore::persist",
        file = %path.display(),
        objects = store.len(),
        "saved store"
    );
    Ok(())
}

pub fn save_collection(
    collection: &InstanceCollection,
    catalog: &SchemaCatalog,
    path: &Path,
    overwrite: bool,
) -> Result<(), PersistError> {
    write_text(path, &collection.print(catalog), overwrite)?;
    info!(
        target: "idfstore::persist",
        file = %path.display(),
        records = collection.len(),
        "saved collection"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idfstore_core::test_utils::{SAMPLE_FILE, SCHEMA, shared_catalog};
    use idfstore_core::text::ParseError;
    use std::fs;

    #[test]
    fn load_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.idd");
        fs::write(&path, SCHEMA).unwrap();
        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.version(), "1.2.0");
        assert!(catalog.type_id("Zone").is_some());
    }

    #[test]
    fn schema_errors_carry_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.idd");
        fs::write(&path, "Zone,\n  \\bogus-directive\n  A1 ; \\field Name\n").unwrap();
        let err = load_catalog(&path).unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("bad.idd"));
    }

    #[test]
    fn store_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.idf");
        fs::write(&source, SAMPLE_FILE).unwrap();
        let store = load_store(&source, shared_catalog(), StoreConfig::default()).unwrap();
        assert_eq!(store.len(), 9);

        let target = dir.path().join("out.idf");
        save_store(&store, &target, false).unwrap();
        let again = load_store(&target, shared_catalog(), StoreConfig::default()).unwrap();
        assert_eq!(again.print(), store.print());
    }

    #[test]
    fn save_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.idf");
        fs::write(&path, "keep me").unwrap();
        let store = Store::new(shared_catalog());
        assert!(matches!(
            save_store(&store, &path, false),
            Err(PersistError::FileExists(_))
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");

        save_store(&store, &path, true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn instance_errors_carry_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.idf");
        fs::write(&path, "Zone, Z1;\nZone, Z2\n").unwrap();
        let err = load_store(&path, shared_catalog(), StoreConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Instance {
                source: ParseError::Unterminated { line: 2, .. },
                ..
            }
        ));
    }

    #[test]
    fn collection_save_and_reject_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.idf");
        fs::write(&path, "Zone, Z1;\nGizmo, G1;\n").unwrap();
        let catalog = shared_catalog();
        assert!(load_collection(&path, &catalog, UnknownTypePolicy::Reject).is_err());

        let collection = load_collection(&path, &catalog, UnknownTypePolicy::Catchall).unwrap();
        let out = dir.path().join("copy.idf");
        save_collection(&collection, &catalog, &out, false).unwrap();
        let copy = load_collection(&out, &catalog, UnknownTypePolicy::Catchall).unwrap();
        // Catchall records remember their source line, so compare renderings.
        assert_eq!(copy.print(&catalog), collection.print(&catalog));
        assert_eq!(copy.len(), 2);
    }
}
