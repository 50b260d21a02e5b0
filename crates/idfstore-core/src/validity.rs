//! Strictness-graded validation of a store.
//!
//! Validation never mutates and never fails; problems accumulate as
//! [`DataError`]s in a [`ValidityReport`]. Structural problems that stop a
//! file from loading are [`ParseError`](crate::text::ParseError)s instead.

use crate::field::FieldProblem;
use crate::id::{ObjectHandle, ObjectTypeId};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// How strictly to validate. Each level reports a superset of the one below.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Report nothing.
    None,
    /// Problems that make a value unusable.
    #[default]
    Draft,
    /// Everything needed for a complete model.
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Field,
    Object,
    Collection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NullAndRequired,
    NumericBound,
    DataType,
    InvalidKey,
    UnresolvedReference,
    Duplicate,
    MissingRequiredObject,
    NumberOfFields,
    NameConflict,
    TooFewFields,
    UnknownType,
}

impl ErrorKind {
    pub fn scope(self) -> Scope {
        match self {
            ErrorKind::NullAndRequired
            | ErrorKind::NumericBound
            | ErrorKind::DataType
            | ErrorKind::InvalidKey
            | ErrorKind::UnresolvedReference => Scope::Field,
            ErrorKind::NameConflict | ErrorKind::TooFewFields => Scope::Object,
            ErrorKind::Duplicate
            | ErrorKind::MissingRequiredObject
            | ErrorKind::NumberOfFields
            | ErrorKind::UnknownType => Scope::Collection,
        }
    }

    /// Lowest strictness at which this kind is reported.
    pub fn level(self) -> Strictness {
        match self {
            ErrorKind::NullAndRequired
            | ErrorKind::UnresolvedReference
            | ErrorKind::MissingRequiredObject
            | ErrorKind::TooFewFields => Strictness::Final,
            _ => Strictness::Draft,
        }
    }
}

impl From<FieldProblem> for ErrorKind {
    fn from(problem: FieldProblem) -> Self {
        match problem {
            FieldProblem::DataType => ErrorKind::DataType,
            FieldProblem::NumericBound => ErrorKind::NumericBound,
            FieldProblem::InvalidKey => ErrorKind::InvalidKey,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataError {
    pub scope: Scope,
    pub kind: ErrorKind,
    pub object: Option<ObjectHandle>,
    pub field: Option<usize>,
    pub type_id: Option<ObjectTypeId>,
}

impl DataError {
    fn new(kind: ErrorKind) -> Self {
        Self {
            scope: kind.scope(),
            kind,
            object: None,
            field: None,
            type_id: None,
        }
    }

    fn on(kind: ErrorKind, object: ObjectHandle, type_id: ObjectTypeId) -> Self {
        Self {
            object: Some(object),
            type_id: Some(type_id),
            ..Self::new(kind)
        }
    }

    fn at(mut self, field: usize) -> Self {
        self.field = Some(field);
        self
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityReport {
    pub strictness: Strictness,
    pub errors: Vec<DataError>,
}

impl ValidityReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }

    pub fn for_object(&self, handle: ObjectHandle) -> impl Iterator<Item = &DataError> {
        self.errors.iter().filter(move |e| e.object == Some(handle))
    }

    /// Errors grouped by the object they concern.
    pub fn by_object(&self) -> BTreeMap<ObjectHandle, Vec<&DataError>> {
        let mut grouped: BTreeMap<ObjectHandle, Vec<&DataError>> = BTreeMap::new();
        for error in &self.errors {
            if let Some(handle) = error.object {
                grouped.entry(handle).or_default().push(error);
            }
        }
        grouped
    }

    /// Errors that concern no single object.
    pub fn collection_errors(&self) -> impl Iterator<Item = &DataError> {
        self.errors.iter().filter(|e| e.object.is_none())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate every object in declaration order, then the collection as a
/// whole.
pub fn validate(store: &Store, strictness: Strictness) -> ValidityReport {
    let mut errors = Vec::new();
    if strictness == Strictness::None {
        return ValidityReport { strictness, errors };
    }
    let catalog = store.catalog();
    let at_final = strictness >= Strictness::Final;

    let mut seen_unique: HashSet<ObjectTypeId> = HashSet::new();
    for object in store.iter() {
        let handle = object.handle();
        let instance = object.instance();
        let type_id = instance.type_id();
        let Ok(schema) = catalog.object_schema(type_id) else {
            errors.push(DataError::on(ErrorKind::UnknownType, handle, type_id));
            continue;
        };

        // Field scope.
        let count = instance.field_count().max(schema.leading_count());
        for index in 0..count {
            let Some(spec) = schema.field_spec(index) else {
                continue;
            };
            match instance.get(index) {
                None if spec.required && at_final => {
                    errors.push(DataError::on(ErrorKind::NullAndRequired, handle, type_id).at(index));
                }
                None => {}
                Some(value) => {
                    if let Some(problem) = spec.check(value) {
                        errors.push(DataError::on(problem.into(), handle, type_id).at(index));
                    }
                }
            }
        }
        if at_final {
            for reference in store.outbound_refs(handle) {
                if reference.target.is_none() {
                    errors.push(
                        DataError::on(ErrorKind::UnresolvedReference, handle, type_id)
                            .at(reference.field),
                    );
                }
            }
        }

        // Object scope.
        if at_final && instance.field_count() < schema.min_fields {
            errors.push(DataError::on(ErrorKind::TooFewFields, handle, type_id));
        }
        if has_name_conflict(store, handle) {
            errors.push(DataError::on(ErrorKind::NameConflict, handle, type_id));
        }

        // Collection scope.
        if schema.unique && !seen_unique.insert(type_id) {
            errors.push(DataError::on(ErrorKind::Duplicate, handle, type_id));
        }
        if !schema.accepts_field_count(instance.field_count()) {
            errors.push(DataError::on(ErrorKind::NumberOfFields, handle, type_id));
        }
    }

    if at_final {
        for type_id in catalog.required_types() {
            if store.num_objects_of_type(type_id) == 0 {
                errors.push(DataError {
                    type_id: Some(type_id),
                    ..DataError::new(ErrorKind::MissingRequiredObject)
                });
            }
        }
    }
    for _ in store.unrecognized() {
        errors.push(DataError::new(ErrorKind::UnknownType));
    }

    ValidityReport { strictness, errors }
}

/// Whether another object carries the same name under a shared group tag.
fn has_name_conflict(store: &Store, handle: ObjectHandle) -> bool {
    let Some(object) = store.get(handle) else {
        return false;
    };
    let Some(name) = object.name() else {
        return false;
    };
    let type_id = object.type_id();
    store.objects_by_name(name).iter().any(|other| {
        other.handle() != handle && store.catalog().share_reference_group(type_id, other.type_id())
    })
}
