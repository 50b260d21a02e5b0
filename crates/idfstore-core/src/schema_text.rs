//! Parser for the schema-definition grammar.
//!
//! ```text
//! !IDD_Version 1.2.0
//! \group Thermal Zones
//!
//! Zone,
//!        \memo A thermal zone
//!   A1 , \field Name
//!        \required-field
//!        \reference ZoneNames
//!   N1 ; \field Direction of Relative North
//!        \minimum 0
//!        \maximum< 360
//! ```
//!
//! Objects start with `Name,` (or `Name;` when they carry no fields). Field
//! declarations are `A<n>` (text) or `N<n>` (numeric) terminated by `,` or
//! `;`. Slash directives after the object line and before the first field
//! describe the object; directives after a field describe that field.

use crate::catalog::{CatalogBuilder, CatalogError, SchemaCatalog};
use crate::field::{Bound, FieldKind, FieldSpec};
use crate::schema::ObjectSchema;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("line {line}: malformed directive '\\{directive}': {detail}")]
    MalformedDirective {
        line: usize,
        directive: String,
        detail: String,
    },
    #[error("line {line}: unknown directive '\\{directive}'")]
    UnknownDirective { line: usize, directive: String },
    #[error("line {line}: directive '\\{directive}' outside of an object")]
    OutsideObject { line: usize, directive: String },
    #[error("line {line}: field directive '\\{directive}' before the first field of {object}")]
    BeforeFirstField {
        line: usize,
        directive: String,
        object: String,
    },
    #[error("line {line}: malformed field declaration '{text}'")]
    MalformedField { line: usize, text: String },
    #[error(
        "line {line}: {object} declares extensible:{size} but only {available} fields follow the start of the group"
    )]
    ExtensibleOutOfRange {
        line: usize,
        object: String,
        size: usize,
        available: usize,
    },
    #[error("line {line}: object {object} is not terminated with ';'")]
    Unterminated { line: usize, object: String },
    #[error("line {line}: {source}")]
    Catalog {
        line: usize,
        #[source]
        source: CatalogError,
    },
}

impl SchemaError {
    /// 1-based line the error was detected on.
    pub fn line(&self) -> usize {
        match self {
            SchemaError::MalformedDirective { line, .. }
            | SchemaError::UnknownDirective { line, .. }
            | SchemaError::OutsideObject { line, .. }
            | SchemaError::BeforeFirstField { line, .. }
            | SchemaError::MalformedField { line, .. }
            | SchemaError::ExtensibleOutOfRange { line, .. }
            | SchemaError::Unterminated { line, .. }
            | SchemaError::Catalog { line, .. } => *line,
        }
    }
}

impl SchemaCatalog {
    /// Parse a schema file into a catalog.
    pub fn parse(text: &str) -> Result<SchemaCatalog, SchemaError> {
        let mut parser = SchemaParser::default();
        for (i, line) in text.lines().enumerate() {
            parser.line(i + 1, line)?;
        }
        parser.finish()
    }
}

/// A field being collected; `explicit_type` records whether `\type` was seen.
#[derive(Debug)]
struct PendingField {
    spec: FieldSpec,
    explicit_type: bool,
}

#[derive(Debug)]
struct PendingObject {
    schema: ObjectSchema,
    line: usize,
    fields: Vec<PendingField>,
    extensible: Option<(usize, usize)>,
    begin_extensible: Option<usize>,
    closed: bool,
}

#[derive(Debug, Default)]
struct SchemaParser {
    builder: CatalogBuilder,
    header: Vec<String>,
    version: String,
    seen_content: bool,
    group: Option<String>,
    current: Option<PendingObject>,
}

impl SchemaParser {
    fn line(&mut self, number: usize, raw: &str) -> Result<(), SchemaError> {
        let trimmed = raw.trim();
        if !self.seen_content {
            if let Some(comment) = trimmed.strip_prefix('!') {
                self.header_line(trimmed, comment);
                return Ok(());
            }
            if trimmed.is_empty() {
                return Ok(());
            }
            self.seen_content = true;
        }

        let code = match trimmed.find('!') {
            Some(pos) => trimmed[..pos].trim(),
            None => trimmed,
        };
        if code.is_empty() {
            return Ok(());
        }

        let (decl, directives) = match code.find('\\') {
            Some(pos) => (code[..pos].trim(), &code[pos..]),
            None => (code, ""),
        };
        if !decl.is_empty() {
            self.declaration(number, decl)?;
        }
        for directive in directives.split('\\').map(str::trim).filter(|d| !d.is_empty()) {
            self.directive(number, directive)?;
        }
        Ok(())
    }

    fn header_line(&mut self, line: &str, comment: &str) {
        let mut words = comment.split_whitespace();
        if let (Some(key), Some(value)) = (words.next(), words.next())
            && key.to_ascii_lowercase().ends_with("version")
            && self.version.is_empty()
        {
            self.version = value.to_string();
        }
        self.header.push(line.to_string());
    }

    fn declaration(&mut self, line: usize, decl: &str) -> Result<(), SchemaError> {
        let open = self.current.as_ref().is_some_and(|o| !o.closed);
        if !open {
            return self.start_object(line, decl);
        }
        let Some(object) = self.current.as_mut() else {
            return Ok(());
        };
        let mut rest = decl;
        while !rest.is_empty() {
            let end = rest
                .find([',', ';'])
                .ok_or_else(|| SchemaError::MalformedField {
                    line,
                    text: decl.to_string(),
                })?;
            let token = rest[..end].trim();
            let terminator = rest.as_bytes()[end];
            let kind = match token.chars().next() {
                Some('A' | 'a') => FieldKind::Text,
                Some('N' | 'n') => FieldKind::Real,
                _ => {
                    return Err(SchemaError::MalformedField {
                        line,
                        text: decl.to_string(),
                    });
                }
            };
            if token.len() < 2 || !token[1..].chars().all(|c| c.is_ascii_digit()) {
                return Err(SchemaError::MalformedField {
                    line,
                    text: decl.to_string(),
                });
            }
            object.fields.push(PendingField {
                spec: FieldSpec::new(kind),
                explicit_type: false,
            });
            rest = rest[end + 1..].trim_start();
            if terminator == b';' {
                object.closed = true;
                if !rest.is_empty() {
                    return Err(SchemaError::MalformedField {
                        line,
                        text: decl.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn start_object(&mut self, line: usize, decl: &str) -> Result<(), SchemaError> {
        self.finish_object()?;
        let (name, closed) = if let Some(name) = decl.strip_suffix(',') {
            (name.trim(), false)
        } else if let Some(name) = decl.strip_suffix(';') {
            (name.trim(), true)
        } else {
            return Err(SchemaError::MalformedField {
                line,
                text: decl.to_string(),
            });
        };
        if name.is_empty() || name.contains([',', ';']) {
            return Err(SchemaError::MalformedField {
                line,
                text: decl.to_string(),
            });
        }
        let mut schema = ObjectSchema::new(name);
        schema.group = self.group.clone();
        self.current = Some(PendingObject {
            schema,
            line,
            fields: Vec::new(),
            extensible: None,
            begin_extensible: None,
            closed,
        });
        Ok(())
    }

    fn directive(&mut self, line: usize, text: &str) -> Result<(), SchemaError> {
        let split = text
            .find(|c: char| c.is_whitespace() || c == '>' || c == '<')
            .map_or(text.len(), |pos| match text.as_bytes()[pos] {
                b'>' | b'<' => pos + 1,
                _ => pos,
            });
        let name = text[..split].to_ascii_lowercase();
        let arg = text[split..].trim();

        if name == "group" {
            self.finish_object()?;
            self.group = Some(require_arg(line, &name, arg)?.to_string());
            return Ok(());
        }

        let Some(object) = self.current.as_mut() else {
            return Err(SchemaError::OutsideObject {
                line,
                directive: name,
            });
        };

        if let Some(size) = name.strip_prefix("extensible:") {
            let size: usize = size.parse().map_err(|_| malformed(line, &name, "expected a group size"))?;
            if size == 0 {
                return Err(malformed(line, &name, "group size must be positive"));
            }
            object.extensible = Some((size, line));
            return Ok(());
        }

        match name.as_str() {
            "memo" => {
                let memo = object.schema.memo.get_or_insert_with(String::new);
                if !memo.is_empty() {
                    memo.push('\n');
                }
                memo.push_str(arg);
                return Ok(());
            }
            "unique-object" => {
                object.schema.unique = true;
                return Ok(());
            }
            "required-object" => {
                object.schema.required = true;
                return Ok(());
            }
            "min-fields" => {
                object.schema.min_fields = require_arg(line, &name, arg)?
                    .parse()
                    .map_err(|_| malformed(line, &name, "expected a field count"))?;
                return Ok(());
            }
            "format" | "obsolete" => return Ok(()),
            _ => {}
        }

        if !is_field_directive(&name) {
            return Err(SchemaError::UnknownDirective {
                line,
                directive: name,
            });
        }
        let field_index = object.fields.len().checked_sub(1);
        let Some(field) = object.fields.last_mut() else {
            return Err(SchemaError::BeforeFirstField {
                line,
                directive: name,
                object: object.schema.name.clone(),
            });
        };
        let spec = &mut field.spec;
        match name.as_str() {
            "field" => spec.name = Some(arg.to_string()),
            "note" => {
                let note = spec.note.get_or_insert_with(String::new);
                if !note.is_empty() {
                    note.push('\n');
                }
                note.push_str(arg);
            }
            "required-field" => spec.required = true,
            "type" => {
                spec.kind = match require_arg(line, &name, arg)?.to_ascii_lowercase().as_str() {
                    "alpha" | "node" | "external-list" | "handle" => FieldKind::Text,
                    "choice" => FieldKind::Choice,
                    "object-list" => FieldKind::Reference,
                    "integer" => FieldKind::Integer,
                    "real" => FieldKind::Real,
                    other => {
                        return Err(malformed(line, &name, &format!("unknown field type '{other}'")));
                    }
                };
                field.explicit_type = true;
            }
            "key" => spec.keys.push(require_arg(line, &name, arg)?.to_string()),
            "default" => spec.default = Some(require_arg(line, &name, arg)?.to_string()),
            "minimum" | "minimum>" => {
                spec.bounds.min = Some(Bound {
                    value: parse_number(line, &name, arg)?,
                    exclusive: name.ends_with('>'),
                });
            }
            "maximum" | "maximum<" => {
                spec.bounds.max = Some(Bound {
                    value: parse_number(line, &name, arg)?,
                    exclusive: name.ends_with('<'),
                });
            }
            "autosizable" => spec.autosizable = true,
            "autocalculatable" => spec.autocalculatable = true,
            "reference" => spec.references.push(require_arg(line, &name, arg)?.to_string()),
            "object-list" => spec
                .object_lists
                .push(require_arg(line, &name, arg)?.to_string()),
            "units" => spec.units = Some(require_arg(line, &name, arg)?.to_string()),
            "begin-extensible" => {
                if object.begin_extensible.is_none() {
                    object.begin_extensible = field_index;
                }
            }
            // ip-units, retaincase, deprecated carry nothing the store uses.
            _ => {}
        }
        Ok(())
    }

    fn finish_object(&mut self) -> Result<(), SchemaError> {
        let Some(pending) = self.current.take() else {
            return Ok(());
        };
        if !pending.closed {
            return Err(SchemaError::Unterminated {
                line: pending.line,
                object: pending.schema.name,
            });
        }

        let mut schema = pending.schema;
        let mut fields: Vec<FieldSpec> = pending
            .fields
            .into_iter()
            .map(|f| {
                let mut spec = f.spec;
                if !f.explicit_type && spec.kind == FieldKind::Text {
                    if !spec.object_lists.is_empty() {
                        spec.kind = FieldKind::Reference;
                    } else if !spec.keys.is_empty() {
                        spec.kind = FieldKind::Choice;
                    }
                }
                spec
            })
            .collect();

        if let Some((size, line)) = pending.extensible {
            let start = match pending.begin_extensible {
                Some(start) => start,
                None => fields.len().checked_sub(size).ok_or_else(|| {
                    SchemaError::ExtensibleOutOfRange {
                        line,
                        object: schema.name.clone(),
                        size,
                        available: fields.len(),
                    }
                })?,
            };
            let available = fields.len() - start;
            if available < size {
                return Err(SchemaError::ExtensibleOutOfRange {
                    line,
                    object: schema.name,
                    size,
                    available,
                });
            }
            // Fields listed past the first group are repeats of it.
            let mut group = fields.split_off(start);
            group.truncate(size);
            schema.extensible = Some(group);
        }
        schema.fields = fields;

        self.builder
            .register(schema)
            .map_err(|source| SchemaError::Catalog {
                line: pending.line,
                source,
            })?;
        Ok(())
    }

    fn finish(mut self) -> Result<SchemaCatalog, SchemaError> {
        self.finish_object()?;
        let header = self.header.join("\n");
        self.builder
            .version(&self.version)
            .header(&header)
            .build()
            .map_err(|source| SchemaError::Catalog { line: 0, source })
    }
}

fn is_field_directive(name: &str) -> bool {
    matches!(
        name,
        "field"
            | "note"
            | "required-field"
            | "type"
            | "key"
            | "default"
            | "minimum"
            | "minimum>"
            | "maximum"
            | "maximum<"
            | "autosizable"
            | "autocalculatable"
            | "reference"
            | "object-list"
            | "units"
            | "ip-units"
            | "begin-extensible"
            | "retaincase"
            | "deprecated"
    )
}

fn malformed(line: usize, directive: &str, detail: &str) -> SchemaError {
    SchemaError::MalformedDirective {
        line,
        directive: directive.to_string(),
        detail: detail.to_string(),
    }
}

fn require_arg<'a>(line: usize, directive: &str, arg: &'a str) -> Result<&'a str, SchemaError> {
    if arg.is_empty() {
        Err(malformed(line, directive, "missing argument"))
    } else {
        Ok(arg)
    }
}

fn parse_number(line: usize, directive: &str, arg: &str) -> Result<f64, SchemaError> {
    require_arg(line, directive, arg)?
        .parse()
        .map_err(|_| malformed(line, directive, "expected a number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r"!IDD_Version 1.2.0
!IDD_BUILD abc123

\group Simulation Parameters

Version,
       \unique-object
       \required-object
  A1 ; \field Version Identifier
       \required-field
       \default 1.2

\group Thermal Zones

Zone,
       \memo Defines a thermal zone
  A1 , \field Name
       \required-field
       \reference ZoneNames
  N1 , \field Direction of Relative North
       \units deg
       \default 0
       \minimum 0
       \maximum< 360
  N2 ; \field Multiplier
       \type integer
       \minimum> 0

Wall,
       \extensible:3
       \min-fields 5
  A1 , \field Name
       \required-field
       \reference SurfaceNames
  A2 , \field Zone Name
       \required-field
       \object-list ZoneNames
  A3 , \field Boundary
       \key Outdoors
       \key Ground
  N1 , \field Vertex 1 X
       \begin-extensible
  N2 , \field Vertex 1 Y
  N3 , \field Vertex 1 Z
  N4 , \field Vertex 2 X
  N5 , \field Vertex 2 Y
  N6 ; \field Vertex 2 Z

Lead Input;
";

    #[test]
    fn parses_header_and_version() {
        let catalog = SchemaCatalog::parse(SCHEMA).unwrap();
        assert_eq!(catalog.version(), "1.2.0");
        assert!(catalog.header().contains("IDD_BUILD"));
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn parses_object_and_field_directives() {
        let catalog = SchemaCatalog::parse(SCHEMA).unwrap();
        let version = catalog.object_schema_by_name("Version").unwrap();
        assert!(version.unique && version.required);
        assert_eq!(version.group.as_deref(), Some("Simulation Parameters"));
        assert_eq!(version.fields[0].default.as_deref(), Some("1.2"));

        let zone = catalog.object_schema_by_name("Zone").unwrap();
        assert_eq!(zone.memo.as_deref(), Some("Defines a thermal zone"));
        assert_eq!(zone.name_field(), Some(0));
        let north = &zone.fields[1];
        assert_eq!(north.kind, FieldKind::Real);
        assert_eq!(north.units.as_deref(), Some("deg"));
        assert!(north.bounds.contains(0.0));
        assert!(!north.bounds.contains(360.0));
        let multiplier = &zone.fields[2];
        assert_eq!(multiplier.kind, FieldKind::Integer);
        assert!(!multiplier.bounds.contains(0.0));
    }

    #[test]
    fn infers_reference_and_choice_kinds() {
        let catalog = SchemaCatalog::parse(SCHEMA).unwrap();
        let wall = catalog.object_schema_by_name("Wall").unwrap();
        assert_eq!(wall.fields[1].kind, FieldKind::Reference);
        assert_eq!(wall.fields[2].kind, FieldKind::Choice);
        assert_eq!(wall.fields[2].keys, vec!["Outdoors", "Ground"]);
        assert_eq!(wall.min_fields, 5);
    }

    #[test]
    fn extensible_group_starts_at_begin_marker() {
        let catalog = SchemaCatalog::parse(SCHEMA).unwrap();
        let wall = catalog.object_schema_by_name("Wall").unwrap();
        assert_eq!(wall.leading_count(), 3);
        assert_eq!(wall.group_size(), 3);
        let group = wall.extensible.as_ref().unwrap();
        assert_eq!(group[0].name.as_deref(), Some("Vertex 1 X"));
        assert_eq!(group[2].name.as_deref(), Some("Vertex 1 Z"));
    }

    #[test]
    fn object_without_fields() {
        let catalog = SchemaCatalog::parse(SCHEMA).unwrap();
        let lead = catalog.object_schema_by_name("Lead Input").unwrap();
        assert_eq!(lead.leading_count(), 0);
        assert!(lead.name_field().is_none());
    }

    #[test]
    fn unknown_directive_reports_line() {
        let text = "Zone,\n  A1 ; \\field Name\n       \\colour red\n";
        let err = SchemaCatalog::parse(text).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownDirective { .. }));
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn malformed_bound_reports_line() {
        let text = "Zone,\n  N1 ; \\field Area\n       \\minimum lots\n";
        let err = SchemaCatalog::parse(text).unwrap_err();
        assert!(matches!(err, SchemaError::MalformedDirective { line: 3, .. }));
    }

    #[test]
    fn extensible_beyond_fields_is_rejected() {
        let text = "List,\n       \\extensible:3\n  A1 , \\field Name\n  A2 ; \\field Member\n       \\begin-extensible\n";
        let err = SchemaCatalog::parse(text).unwrap_err();
        match err {
            SchemaError::ExtensibleOutOfRange {
                line,
                size,
                available,
                ..
            } => {
                assert_eq!(line, 2);
                assert_eq!(size, 3);
                assert_eq!(available, 1);
            }
            other => panic!("expected ExtensibleOutOfRange, got: {other:?}"),
        }
    }

    #[test]
    fn zero_sized_extensible_is_rejected() {
        let text = "List,\n       \\extensible:0\n  A1 ; \\field Name\n";
        assert!(matches!(
            SchemaCatalog::parse(text),
            Err(SchemaError::MalformedDirective { line: 2, .. })
        ));
    }

    #[test]
    fn field_directive_before_first_field() {
        let text = "Zone,\n       \\required-field\n  A1 ; \\field Name\n";
        assert!(matches!(
            SchemaCatalog::parse(text),
            Err(SchemaError::BeforeFirstField { line: 2, .. })
        ));
    }

    #[test]
    fn directive_outside_object() {
        let text = "\\memo floating\nZone;\n";
        assert!(matches!(
            SchemaCatalog::parse(text),
            Err(SchemaError::OutsideObject { line: 1, .. })
        ));
    }

    #[test]
    fn unterminated_object() {
        let text = "Zone,\n  A1 , \\field Name\n";
        assert!(matches!(
            SchemaCatalog::parse(text),
            Err(SchemaError::Unterminated { line: 1, .. })
        ));
    }

    #[test]
    fn duplicate_object_reports_its_line() {
        let text = "Zone;\n\nzone;\n";
        let err = SchemaCatalog::parse(text).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Catalog {
                line: 3,
                source: CatalogError::DuplicateName(_)
            }
        ));
    }

    #[test]
    fn several_fields_on_one_line() {
        let text = "Point,\n  N1, N2, N3;\n";
        let catalog = SchemaCatalog::parse(text).unwrap();
        assert_eq!(catalog.object_schema_by_name("Point").unwrap().leading_count(), 3);
    }
}
