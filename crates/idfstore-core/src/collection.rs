//! Whole-file instance model: ordered records plus the file header.

use crate::catalog::SchemaCatalog;
use crate::config::{DEFAULT_COMMENT_COLUMN, UnknownTypePolicy};
use crate::instance::Instance;
use crate::text::{self, Item, ParseError, RawRecord};
use crate::validity::ErrorKind;
use tracing::{debug, warn};

/// One top-level record of an instance file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Object(Instance),
    /// A comment-only block.
    Comment(String),
    /// A record whose type the catalog does not know, kept verbatim.
    Unknown(RawRecord),
}

/// Structural problem found by [`InstanceCollection::minimal_check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WellFormednessIssue {
    /// Position in [`InstanceCollection::records`].
    pub record: usize,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceCollection {
    header: Option<String>,
    version: Option<String>,
    records: Vec<Record>,
}

impl InstanceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a whole instance file.
    pub fn parse(
        input: &str,
        catalog: &SchemaCatalog,
        unknown_types: UnknownTypePolicy,
    ) -> Result<Self, ParseError> {
        let lexed = text::lex(input)?;
        let mut collection = Self::new();
        collection.set_header(lexed.header);
        if let Some(version) = &collection.version
            && !catalog.version().is_empty()
            && version != catalog.version()
        {
            warn!(
                target: "idfstore::collection",
                file_version = %version,
                catalog_version = %catalog.version(),
                "instance file version differs from schema version"
            );
        }

        for item in lexed.items {
            let record = match item {
                Item::Comment { text, .. } => Record::Comment(text),
                Item::Record(raw) => match catalog.object_schema_by_name(&raw.type_name) {
                    Some(schema) => Record::Object(Instance::from_raw(raw, schema)?),
                    None => match unknown_types {
                        UnknownTypePolicy::Reject => {
                            return Err(ParseError::UnknownType {
                                line: raw.line,
                                type_name: raw.type_name,
                            });
                        }
                        UnknownTypePolicy::Catchall => {
                            warn!(
                                target: "idfstore::collection",
                                type_name = %raw.type_name,
                                line = raw.line,
                                "unknown object type kept as catchall record"
                            );
                            Record::Unknown(raw)
                        }
                    },
                },
            };
            collection.records.push(record);
        }
        debug!(
            target: "idfstore::collection",
            records = collection.records.len(),
            "parsed instance collection"
        );
        Ok(collection)
    }

    pub fn print(&self, catalog: &SchemaCatalog) -> String {
        self.print_with_column(catalog, DEFAULT_COMMENT_COLUMN)
    }

    pub fn print_with_column(&self, catalog: &SchemaCatalog, column: usize) -> String {
        let mut blocks = Vec::with_capacity(self.records.len() + 1);
        if let Some(header) = &self.header {
            blocks.push(header.clone());
        }
        for record in &self.records {
            let block = match record {
                Record::Object(instance) => match catalog.object_schema(instance.type_id()) {
                    Ok(schema) => instance.print_with_column(schema, column),
                    // Not expressible in this catalog; nothing sensible to print.
                    Err(_) => continue,
                },
                Record::Comment(text) => text.clone(),
                Record::Unknown(raw) => raw.print(column),
            };
            blocks.push(block);
        }
        text::join_blocks(blocks)
    }

    /// Shallow structural check: every object's type exists and its field
    /// count fits the schema, and no catchall records remain.
    pub fn minimal_check(&self, catalog: &SchemaCatalog) -> Vec<WellFormednessIssue> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(record, r)| {
                let kind = match r {
                    Record::Object(instance) => match catalog.object_schema(instance.type_id()) {
                        Ok(schema) if schema.accepts_field_count(instance.field_count()) => {
                            return None;
                        }
                        Ok(_) => ErrorKind::NumberOfFields,
                        Err(_) => ErrorKind::UnknownType,
                    },
                    Record::Unknown(_) => ErrorKind::UnknownType,
                    Record::Comment(_) => return None,
                };
                Some(WellFormednessIssue { record, kind })
            })
            .collect()
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Version token from an `!IDF_Version <v>` header line.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_header(&mut self, header: Option<String>) {
        self.version = header.as_deref().and_then(header_version);
        self.header = header;
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn objects(&self) -> impl Iterator<Item = &Instance> {
        self.records.iter().filter_map(|r| match r {
            Record::Object(instance) => Some(instance),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> (Option<String>, Vec<Record>) {
        (self.header, self.records)
    }
}

/// Read the version token from a header, e.g. `!IDF_Version 1.2.0`.
pub(crate) fn header_version(header: &str) -> Option<String> {
    header.lines().find_map(|line| {
        let mut words = line.trim_start_matches('!').split_whitespace();
        let key = words.next()?;
        if key.to_ascii_lowercase().ends_with("_version") {
            words.next().map(str::to_string)
        } else {
            None
        }
    })
}
