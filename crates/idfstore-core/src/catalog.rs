//! The schema catalog: every object type a store can hold.
//!
//! Built once through [`CatalogBuilder`] (or parsed from schema text) and
//! shared read-only behind an `Arc`. Lookups by type name ignore case.

use crate::field::FieldSpec;
use crate::id::ObjectTypeId;
use crate::schema::ObjectSchema;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown object type id: {0:?}")]
    UnknownType(ObjectTypeId),
    #[error("unknown object type: {0}")]
    UnknownTypeName(String),
    #[error("duplicate object type: {0}")]
    DuplicateName(String),
    #[error("object type {0} declares an empty extensible group")]
    EmptyExtensibleGroup(String),
}

/// Builder for constructing an immutable [`SchemaCatalog`].
/// Two-phase lifecycle: registration -> finalization.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    version: String,
    header: String,
    objects: Vec<ObjectSchema>,
    name_to_id: HashMap<String, ObjectTypeId>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn header(mut self, header: &str) -> Self {
        self.header = header.to_string();
        self
    }

    /// Phase 1: Register an object schema. Returns its type id.
    pub fn register(&mut self, mut schema: ObjectSchema) -> Result<ObjectTypeId, CatalogError> {
        let key = schema.name.to_ascii_lowercase();
        if self.name_to_id.contains_key(&key) {
            return Err(CatalogError::DuplicateName(schema.name));
        }
        let id = ObjectTypeId(self.objects.len() as u32);
        schema.type_id = id;
        self.objects.push(schema);
        self.name_to_id.insert(key, id);
        Ok(id)
    }

    /// Lookup a registered type id by declared name.
    pub fn type_id(&self, name: &str) -> Option<ObjectTypeId> {
        self.name_to_id.get(&name.to_ascii_lowercase()).copied()
    }

    /// Phase 2: Finalize and build the immutable catalog.
    pub fn build(mut self) -> Result<SchemaCatalog, CatalogError> {
        for schema in &self.objects {
            if schema.extensible.as_ref().is_some_and(Vec::is_empty) {
                return Err(CatalogError::EmptyExtensibleGroup(schema.name.clone()));
            }
        }

        // Which types can be targeted under each group tag.
        let mut groups: HashMap<String, BTreeSet<ObjectTypeId>> = HashMap::new();
        for schema in &self.objects {
            for tag in schema.reference_tags() {
                groups
                    .entry(tag.to_ascii_lowercase())
                    .or_default()
                    .insert(schema.type_id);
            }
        }

        for schema in &mut self.objects {
            let tags: Vec<String> = schema
                .fields
                .iter()
                .chain(schema.extensible.iter().flatten())
                .filter(|f| f.is_reference())
                .flat_map(|f| f.object_lists.iter().cloned())
                .collect();
            for tag in tags {
                let targets = groups
                    .get(&tag.to_ascii_lowercase())
                    .cloned()
                    .unwrap_or_default();
                if targets.is_empty() {
                    warn!(
                        target: "idfstore::catalog",
                        object = %schema.name,
                        group = %tag,
                        "reference group has no target types"
                    );
                }
                schema.cross_references.insert(tag, targets);
            }
        }

        Ok(SchemaCatalog {
            version: self.version,
            header: self.header,
            objects: self.objects,
            name_to_id: self.name_to_id,
            groups,
        })
    }
}

/// Immutable schema catalog. Frozen after build; share it behind an `Arc`.
#[derive(Debug)]
pub struct SchemaCatalog {
    version: String,
    header: String,
    objects: Vec<ObjectSchema>,
    name_to_id: HashMap<String, ObjectTypeId>,
    groups: HashMap<String, BTreeSet<ObjectTypeId>>,
}

impl SchemaCatalog {
    pub fn object_schema(&self, id: ObjectTypeId) -> Result<&ObjectSchema, CatalogError> {
        self.objects
            .get(id.index())
            .ok_or(CatalogError::UnknownType(id))
    }

    /// Case-insensitive lookup by declared name.
    pub fn object_schema_by_name(&self, name: &str) -> Option<&ObjectSchema> {
        self.type_id(name).and_then(|id| self.objects.get(id.index()))
    }

    pub fn type_id(&self, name: &str) -> Option<ObjectTypeId> {
        self.name_to_id.get(&name.to_ascii_lowercase()).copied()
    }

    /// Like [`type_id`](Self::type_id) but failing with `UnknownTypeName`.
    pub fn require_type(&self, name: &str) -> Result<ObjectTypeId, CatalogError> {
        self.type_id(name)
            .ok_or_else(|| CatalogError::UnknownTypeName(name.to_string()))
    }

    pub fn required_types(&self) -> Vec<ObjectTypeId> {
        self.objects
            .iter()
            .filter(|s| s.required)
            .map(|s| s.type_id)
            .collect()
    }

    pub fn unique_types(&self) -> Vec<ObjectTypeId> {
        self.objects
            .iter()
            .filter(|s| s.unique)
            .map(|s| s.type_id)
            .collect()
    }

    /// Types whose objects can be targeted under a group tag.
    pub fn group_targets(&self, tag: &str) -> Option<&BTreeSet<ObjectTypeId>> {
        self.groups.get(&tag.to_ascii_lowercase())
    }

    /// Whether a reference field may point at an object of `target` type.
    ///
    /// A reference field without group tags may target any nameable type.
    pub fn can_target(&self, field: &FieldSpec, target: ObjectTypeId) -> bool {
        if field.object_lists.is_empty() {
            return self
                .objects
                .get(target.index())
                .is_some_and(|s| s.name_field().is_some());
        }
        field.object_lists.iter().any(|tag| {
            self.group_targets(tag)
                .is_some_and(|targets| targets.contains(&target))
        })
    }

    /// Whether two types share at least one group tag, so equal names on
    /// their objects would make references ambiguous.
    pub fn share_reference_group(&self, a: ObjectTypeId, b: ObjectTypeId) -> bool {
        self.groups
            .values()
            .any(|types| types.contains(&a) && types.contains(&b))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectSchema> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn header(&self) -> &str {
        &self.header
    }
}
