//! Field definitions: the per-field half of an object schema.
//!
//! A [`FieldSpec`] is pure data. Store code never dispatches on the object
//! type; it looks the field spec up by index and asks it questions.

use serde::{Deserialize, Serialize};

/// The value kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text.
    Text,
    /// Enumerated text restricted to the field's keys.
    Choice,
    /// The name of another object, restricted by cross-reference groups.
    Reference,
    Integer,
    Real,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Real)
    }
}

/// One end of a numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: f64,
    pub exclusive: bool,
}

/// Declared numeric range of a field. Both ends are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericBounds {
    pub min: Option<Bound>,
    pub max: Option<Bound>,
}

impl NumericBounds {
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, value: f64) -> bool {
        let above_min = match self.min {
            Some(Bound { value: min, exclusive: true }) => value > min,
            Some(Bound { value: min, exclusive: false }) => value >= min,
            None => true,
        };
        let below_max = match self.max {
            Some(Bound { value: max, exclusive: true }) => value < max,
            Some(Bound { value: max, exclusive: false }) => value <= max,
            None => true,
        };
        above_min && below_max
    }
}

/// Why a non-empty value does not satisfy its field spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldProblem {
    /// Text where a number was expected.
    DataType,
    /// A number outside the declared bounds.
    NumericBound,
    /// A choice value that is not one of the keys.
    InvalidKey,
}

/// Schema of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: Option<String>,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<String>,
    /// Only meaningful for numeric kinds.
    pub bounds: NumericBounds,
    /// Only meaningful for [`FieldKind::Choice`].
    pub keys: Vec<String>,
    pub autosizable: bool,
    pub autocalculatable: bool,
    /// Cross-reference groups a [`FieldKind::Reference`] field may target.
    pub object_lists: Vec<String>,
    /// Groups under which the owning object can be targeted by name.
    pub references: Vec<String>,
    pub units: Option<String>,
    pub note: Option<String>,
}

impl FieldSpec {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            name: None,
            kind,
            required: false,
            default: None,
            bounds: NumericBounds::default(),
            keys: Vec::new(),
            autosizable: false,
            autocalculatable: false,
            object_lists: Vec::new(),
            references: Vec::new(),
            units: None,
            note: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(FieldKind::Text).named(name)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(FieldKind::Integer).named(name)
    }

    pub fn real(name: &str) -> Self {
        Self::new(FieldKind::Real).named(name)
    }

    pub fn choice(name: &str, keys: &[&str]) -> Self {
        let mut spec = Self::new(FieldKind::Choice).named(name);
        spec.keys = keys.iter().map(|k| k.to_string()).collect();
        spec
    }

    /// A reference field that may point at objects in `group`.
    pub fn reference(name: &str, group: &str) -> Self {
        let mut spec = Self::new(FieldKind::Reference).named(name);
        spec.object_lists.push(group.to_string());
        spec
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn min(mut self, value: f64) -> Self {
        self.bounds.min = Some(Bound { value, exclusive: false });
        self
    }

    pub fn min_exclusive(mut self, value: f64) -> Self {
        self.bounds.min = Some(Bound { value, exclusive: true });
        self
    }

    pub fn max(mut self, value: f64) -> Self {
        self.bounds.max = Some(Bound { value, exclusive: false });
        self
    }

    pub fn max_exclusive(mut self, value: f64) -> Self {
        self.bounds.max = Some(Bound { value, exclusive: true });
        self
    }

    pub fn autosizable(mut self) -> Self {
        self.autosizable = true;
        self
    }

    pub fn autocalculatable(mut self) -> Self {
        self.autocalculatable = true;
        self
    }

    /// Declare that the owning object can be targeted under `group`.
    pub fn referenced_as(mut self, group: &str) -> Self {
        self.references.push(group.to_string());
        self
    }

    pub fn is_reference(&self) -> bool {
        self.kind == FieldKind::Reference
    }

    /// Whether this field can serve as the object's name field.
    pub fn is_name_like(&self) -> bool {
        self.kind == FieldKind::Text
            && (!self.references.is_empty()
                || self
                    .name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case("name")))
    }

    /// Check a non-empty value against the kind, keys and bounds.
    ///
    /// Empty values are the caller's concern (see `required`).
    pub fn check(&self, value: &str) -> Option<FieldProblem> {
        match self.kind {
            FieldKind::Integer | FieldKind::Real => {
                if self.autosizable && value.eq_ignore_ascii_case("autosize") {
                    return None;
                }
                if self.autocalculatable && value.eq_ignore_ascii_case("autocalculate") {
                    return None;
                }
                let number = match self.kind {
                    FieldKind::Integer => value.parse::<i64>().ok().map(|v| v as f64),
                    _ => value.parse::<f64>().ok().filter(|v| v.is_finite()),
                };
                match number {
                    None => Some(FieldProblem::DataType),
                    Some(v) if !self.bounds.contains(v) => Some(FieldProblem::NumericBound),
                    Some(_) => None,
                }
            }
            FieldKind::Choice => {
                if self.keys.is_empty() || self.keys.iter().any(|k| k.eq_ignore_ascii_case(value)) {
                    None
                } else {
                    Some(FieldProblem::InvalidKey)
                }
            }
            FieldKind::Text | FieldKind::Reference => None,
        }
    }
}
