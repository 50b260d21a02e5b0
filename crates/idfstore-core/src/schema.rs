//! Object schemas: leading fields, an optional repeating extensible group,
//! and collection-level cardinality flags.

use crate::field::FieldSpec;
use crate::id::ObjectTypeId;
use std::collections::{BTreeMap, BTreeSet};

/// Schema of one object type.
///
/// Built declaratively and handed to a
/// [`CatalogBuilder`](crate::catalog::CatalogBuilder), which assigns the type
/// id and resolves cross-reference groups.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    pub name: String,
    /// Heading from the schema file (`\group`).
    pub group: Option<String>,
    pub memo: Option<String>,
    pub fields: Vec<FieldSpec>,
    /// Fields that repeat as a unit after the leading fields.
    pub extensible: Option<Vec<FieldSpec>>,
    /// At most one instance store-wide.
    pub unique: bool,
    /// At least one instance at final strictness.
    pub required: bool,
    pub min_fields: usize,
    pub(crate) type_id: ObjectTypeId,
    pub(crate) cross_references: BTreeMap<String, BTreeSet<ObjectTypeId>>,
}

impl ObjectSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            group: None,
            memo: None,
            fields: Vec::new(),
            extensible: None,
            unique: false,
            required: false,
            min_fields: 0,
            type_id: ObjectTypeId(u32::MAX),
            cross_references: BTreeMap::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn extensible_group(mut self, specs: Vec<FieldSpec>) -> Self {
        self.extensible = Some(specs);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn with_min_fields(mut self, n: usize) -> Self {
        self.min_fields = n;
        self
    }

    pub fn type_id(&self) -> ObjectTypeId {
        self.type_id
    }

    pub fn leading_count(&self) -> usize {
        self.fields.len()
    }

    /// Number of fields in one extensible group; 0 when not extensible.
    pub fn group_size(&self) -> usize {
        self.extensible.as_ref().map_or(0, Vec::len)
    }

    pub fn is_extensible(&self) -> bool {
        self.group_size() > 0
    }

    /// Index of the name field, if this type is nameable.
    pub fn name_field(&self) -> Option<usize> {
        self.fields
            .first()
            .is_some_and(FieldSpec::is_name_like)
            .then_some(0)
    }

    /// Field spec for any index, folding extensible indices onto the group.
    pub fn field_spec(&self, index: usize) -> Option<&FieldSpec> {
        if let Some(spec) = self.fields.get(index) {
            return Some(spec);
        }
        let (_, offset) = self.extensible_position(index)?;
        self.extensible.as_ref()?.get(offset)
    }

    /// `(group index, offset within group)` for an extensible field index.
    pub fn extensible_position(&self, index: usize) -> Option<(usize, usize)> {
        let size = self.group_size();
        if size == 0 || index < self.leading_count() {
            return None;
        }
        let rel = index - self.leading_count();
        Some((rel / size, rel % size))
    }

    /// Whether `count` fields form a structurally valid instance.
    ///
    /// Trailing leading fields may be omitted; past the leading fields the
    /// count must cover whole extensible groups.
    pub fn accepts_field_count(&self, count: usize) -> bool {
        if count <= self.leading_count() {
            return true;
        }
        match self.group_size() {
            0 => false,
            size => (count - self.leading_count()) % size == 0,
        }
    }

    /// Indices of reference fields among the first `count` fields.
    pub fn reference_indices(&self, count: usize) -> impl Iterator<Item = usize> + '_ {
        (0..count).filter(move |&i| self.field_spec(i).is_some_and(FieldSpec::is_reference))
    }

    /// Group tags used by this type's reference fields, each mapped to the
    /// types that can be targeted under it.
    pub fn cross_reference_groups(&self) -> &BTreeMap<String, BTreeSet<ObjectTypeId>> {
        &self.cross_references
    }

    /// Group tags under which objects of this type can be targeted.
    pub fn reference_tags(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .chain(self.extensible.iter().flatten())
            .flat_map(|f| f.references.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> ObjectSchema {
        ObjectSchema::new("Surface")
            .field(FieldSpec::text("Name").required())
            .field(FieldSpec::reference("Zone Name", "ZoneNames"))
            .extensible_group(vec![
                FieldSpec::real("X"),
                FieldSpec::real("Y"),
                FieldSpec::real("Z"),
            ])
    }

    #[test]
    fn field_spec_folds_extensible_indices() {
        let s = surface();
        assert_eq!(s.field_spec(0).unwrap().name.as_deref(), Some("Name"));
        assert_eq!(s.field_spec(2).unwrap().name.as_deref(), Some("X"));
        assert_eq!(s.field_spec(6).unwrap().name.as_deref(), Some("Y"));
        assert_eq!(s.extensible_position(7), Some((1, 2)));
        assert_eq!(s.extensible_position(1), None);
    }

    #[test]
    fn non_extensible_has_no_fields_past_leading() {
        let zone = ObjectSchema::new("Zone").field(FieldSpec::text("Name"));
        assert!(zone.field_spec(1).is_none());
        assert!(!zone.accepts_field_count(2));
        assert!(zone.accepts_field_count(0));
    }

    #[test]
    fn field_counts_must_cover_whole_groups() {
        let s = surface();
        assert!(s.accepts_field_count(1));
        assert!(s.accepts_field_count(2));
        assert!(s.accepts_field_count(5));
        assert!(s.accepts_field_count(8));
        assert!(!s.accepts_field_count(4));
        assert!(!s.accepts_field_count(6));
    }

    #[test]
    fn name_field_requires_name_like_first_field() {
        assert_eq!(surface().name_field(), Some(0));
        let unnamed = ObjectSchema::new("Timestep").field(FieldSpec::integer("Steps"));
        assert_eq!(unnamed.name_field(), None);
    }

    #[test]
    fn reference_indices_span_groups() {
        let s = ObjectSchema::new("List")
            .field(FieldSpec::text("Name"))
            .extensible_group(vec![FieldSpec::reference("Member", "ZoneNames")]);
        let refs: Vec<usize> = s.reference_indices(4).collect();
        assert_eq!(refs, vec![1, 2, 3]);
    }
}
