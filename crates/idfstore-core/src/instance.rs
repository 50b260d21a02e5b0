//! A single schema-typed record.
//!
//! Values are plain optional text. Reference fields hold the target's name,
//! never a pointer; resolution is the store's job.

use crate::config::DEFAULT_COMMENT_COLUMN;
use crate::id::ObjectTypeId;
use crate::schema::ObjectSchema;
use crate::text::{self, Item, ParseError, RawRecord, RecordLayout};
use std::collections::BTreeMap;

/// Most extensible groups a single [`Instance::set`] may add.
pub const MAX_GROWTH_GROUPS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    type_id: ObjectTypeId,
    values: Vec<Option<String>>,
    field_comments: BTreeMap<usize, String>,
    record_comment: Option<String>,
    type_comment: Option<String>,
}

impl Instance {
    /// An instance with no fields.
    pub fn new(type_id: ObjectTypeId) -> Self {
        Self {
            type_id,
            values: Vec::new(),
            field_comments: BTreeMap::new(),
            record_comment: None,
            type_comment: None,
        }
    }

    /// Leading fields filled with their declared defaults.
    pub fn with_defaults(schema: &ObjectSchema) -> Self {
        let mut instance = Self::new(schema.type_id());
        instance.values = schema.fields.iter().map(|f| f.default.clone()).collect();
        instance
    }

    /// Build from raw values without checking the field count against the
    /// schema. Values are trimmed and empty text becomes absent.
    pub fn from_values<S: AsRef<str>>(type_id: ObjectTypeId, values: &[Option<S>]) -> Self {
        let mut instance = Self::new(type_id);
        instance.values = values
            .iter()
            .map(|v| v.as_ref().and_then(|s| text::clean_value(s.as_ref())))
            .collect();
        instance
    }

    /// Parse exactly one object of the given type.
    pub fn parse(input: &str, schema: &ObjectSchema) -> Result<Instance, ParseError> {
        let lexed = text::lex(input)?;
        let mut records: Vec<RawRecord> = lexed
            .items
            .into_iter()
            .filter_map(|item| match item {
                Item::Record(record) => Some(record),
                Item::Comment { .. } => None,
            })
            .collect();
        if records.len() != 1 {
            return Err(ParseError::NotSingleObject {
                found: records.len(),
            });
        }
        let mut record = records.remove(0);
        if !record.type_name.eq_ignore_ascii_case(&schema.name) {
            return Err(ParseError::TypeMismatch {
                line: record.line,
                expected: schema.name.clone(),
                found: record.type_name,
            });
        }
        // A lone record's leading comment is its own, not a file header.
        if record.record_comment.is_none() {
            record.record_comment = lexed.header;
        }
        Self::from_raw(record, schema)
    }

    /// Resolve a lexed record against its schema.
    pub(crate) fn from_raw(record: RawRecord, schema: &ObjectSchema) -> Result<Instance, ParseError> {
        if !schema.accepts_field_count(record.values.len()) {
            return Err(ParseError::FieldCount {
                line: record.line,
                type_name: record.type_name,
                count: record.values.len(),
                leading: schema.leading_count(),
                group: schema.group_size(),
            });
        }
        Ok(Self {
            type_id: schema.type_id(),
            values: record.values,
            field_comments: record.field_comments,
            record_comment: record.record_comment,
            type_comment: record.type_comment,
        })
    }

    pub fn print(&self, schema: &ObjectSchema) -> String {
        self.print_with_column(schema, DEFAULT_COMMENT_COLUMN)
    }

    pub fn print_with_column(&self, schema: &ObjectSchema, column: usize) -> String {
        let mut out = String::new();
        self.write_to(&mut out, schema, column);
        out
    }

    pub(crate) fn write_to(&self, out: &mut String, schema: &ObjectSchema, column: usize) {
        text::write_record(
            out,
            &RecordLayout {
                type_name: &schema.name,
                values: &self.values,
                field_comments: &self.field_comments,
                record_comment: self.record_comment.as_deref(),
                type_comment: self.type_comment.as_deref(),
            },
            column,
        );
    }

    pub fn type_id(&self) -> ObjectTypeId {
        self.type_id
    }

    pub fn field_count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Value of a field; absent and out-of-range both read as `None`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// The object's name, if its type has a name field and it is set.
    pub fn name<'a>(&'a self, schema: &ObjectSchema) -> Option<&'a str> {
        schema.name_field().and_then(|i| self.get(i))
    }

    /// Set a field, growing the instance if needed.
    ///
    /// Growth pads absent leading fields, then whole extensible groups, at
    /// most [`MAX_GROWTH_GROUPS`] of them. Returns false when the index is
    /// unreachable or the text contains a grammar delimiter. Empty text
    /// stores an absent value.
    pub fn set(&mut self, schema: &ObjectSchema, index: usize, value: &str) -> bool {
        if !text::is_storable(value) {
            return false;
        }
        if index >= self.values.len() {
            let Some(len) = grown_len(schema, self.values.len(), index) else {
                return false;
            };
            self.values.resize(len, None);
        }
        self.values[index] = text::clean_value(value);
        true
    }

    /// Append one extensible group. Missing trailing values are absent.
    ///
    /// Returns the new group's index, or `None` if the type is not
    /// extensible, too many values were given, or a value is not storable.
    pub fn push_extensible_group(&mut self, schema: &ObjectSchema, values: &[&str]) -> Option<usize> {
        let size = schema.group_size();
        if size == 0 || values.len() > size || !values.iter().all(|v| text::is_storable(v)) {
            return None;
        }
        if self.values.len() < schema.leading_count() {
            self.values.resize(schema.leading_count(), None);
        }
        self.values.extend(values.iter().map(|v| text::clean_value(v)));
        self.values.resize(self.values.len() + size - values.len(), None);
        Some(self.extensible_group_count(schema) - 1)
    }

    /// Remove extensible group `group`, shifting later groups down.
    pub fn remove_extensible_group(
        &mut self,
        schema: &ObjectSchema,
        group: usize,
    ) -> Option<Vec<Option<String>>> {
        if group >= self.extensible_group_count(schema) {
            return None;
        }
        let size = schema.group_size();
        let start = schema.leading_count() + group * size;
        let end = start + size;
        let removed: Vec<Option<String>> = self.values.drain(start..end).collect();
        self.field_comments = std::mem::take(&mut self.field_comments)
            .into_iter()
            .filter(|(i, _)| !(start..end).contains(i))
            .map(|(i, c)| if i >= end { (i - size, c) } else { (i, c) })
            .collect();
        Some(removed)
    }

    pub fn extensible_group_count(&self, schema: &ObjectSchema) -> usize {
        let size = schema.group_size();
        if size == 0 || self.values.len() <= schema.leading_count() {
            return 0;
        }
        (self.values.len() - schema.leading_count()) / size
    }

    pub fn extensible_group(&self, schema: &ObjectSchema, group: usize) -> Option<&[Option<String>]> {
        if group >= self.extensible_group_count(schema) {
            return None;
        }
        let start = schema.leading_count() + group * schema.group_size();
        self.values.get(start..start + schema.group_size())
    }

    pub fn field_comment(&self, index: usize) -> Option<&str> {
        self.field_comments.get(&index).map(String::as_str)
    }

    /// Set or clear an inline field comment. A leading `!` is added when
    /// missing. Returns false for comments spanning lines.
    pub fn set_field_comment(&mut self, index: usize, comment: Option<&str>) -> bool {
        match comment.map(comment_text) {
            Some(None) => false,
            Some(Some(text)) => {
                self.field_comments.insert(index, text);
                true
            }
            None => {
                self.field_comments.remove(&index);
                true
            }
        }
    }

    pub fn record_comment(&self) -> Option<&str> {
        self.record_comment.as_deref()
    }

    /// Set or clear the comment printed above the record. Each line gets a
    /// leading `!` when missing.
    pub fn set_record_comment(&mut self, comment: Option<&str>) {
        self.record_comment = comment.map(|c| {
            c.lines()
                .map(|line| {
                    let line = line.trim();
                    if line.starts_with('!') {
                        line.to_string()
                    } else {
                        format!("! {line}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        });
    }

    pub fn type_comment(&self) -> Option<&str> {
        self.type_comment.as_deref()
    }
}

/// Length an instance of `current` values must grow to so that `index`
/// exists.
fn grown_len(schema: &ObjectSchema, current: usize, index: usize) -> Option<usize> {
    let leading = schema.leading_count();
    if index < leading {
        return Some(index + 1);
    }
    let size = schema.group_size();
    if size == 0 {
        return None;
    }
    let have = current.saturating_sub(leading) / size;
    let last = (index - leading) / size;
    if last.saturating_sub(have) >= MAX_GROWTH_GROUPS {
        return None;
    }
    Some(leading + (last + 1) * size)
}

fn comment_text(comment: &str) -> Option<String> {
    if comment.contains(['\n', '\r']) {
        return None;
    }
    let comment = comment.trim();
    Some(if comment.starts_with('!') {
        comment.to_string()
    } else {
        format!("!- {comment}")
    })
}
