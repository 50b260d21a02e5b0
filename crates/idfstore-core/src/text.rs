//! Lexer and printer for the instance grammar.
//!
//! ```text
//! !IDF_Version 1.2.0
//!
//! ! Ground floor
//! Zone,
//!   Z1,                               !- Name
//!   0;                                !- Direction of Relative North
//! ```
//!
//! The lexer knows nothing about schemas; it turns text into [`RawRecord`]s
//! and comment blocks, which [`Instance`](crate::instance::Instance) and
//! [`InstanceCollection`](crate::collection::InstanceCollection) resolve
//! against the catalog.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: object {type_name} is not terminated with ';'")]
    Unterminated { line: usize, type_name: String },
    #[error("line {line}: missing object type name")]
    MissingTypeName { line: usize },
    #[error("line {line}: unknown object type '{type_name}'")]
    UnknownType { line: usize, type_name: String },
    #[error(
        "line {line}: {type_name} has {count} fields; expected at most {leading} leading fields or whole groups of {group} after them"
    )]
    FieldCount {
        line: usize,
        type_name: String,
        count: usize,
        leading: usize,
        group: usize,
    },
    #[error("line {line}: expected object type {expected}, found {found}")]
    TypeMismatch {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("expected exactly one object, found {found}")]
    NotSingleObject { found: usize },
}

impl ParseError {
    /// 1-based line of the offending record, when one applies.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Unterminated { line, .. }
            | ParseError::MissingTypeName { line }
            | ParseError::UnknownType { line, .. }
            | ParseError::FieldCount { line, .. }
            | ParseError::TypeMismatch { line, .. } => Some(*line),
            ParseError::NotSingleObject { .. } => None,
        }
    }
}

/// A record as written, before schema resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub type_name: String,
    /// Empty tokens are `None`.
    pub values: Vec<Option<String>>,
    /// Inline comments by field index, kept verbatim including the `!`.
    pub field_comments: BTreeMap<usize, String>,
    /// Comment lines directly above the record, joined with `\n`.
    pub record_comment: Option<String>,
    /// Inline comment on the type-name token.
    pub type_comment: Option<String>,
    /// 1-based line of the type name.
    pub line: usize,
}

impl RawRecord {
    fn new(line: usize, record_comment: Option<String>) -> Self {
        Self {
            type_name: String::new(),
            values: Vec::new(),
            field_comments: BTreeMap::new(),
            record_comment,
            type_comment: None,
            line,
        }
    }

    pub fn print(&self, column: usize) -> String {
        let mut out = String::new();
        write_record(
            &mut out,
            &RecordLayout {
                type_name: &self.type_name,
                values: &self.values,
                field_comments: &self.field_comments,
                record_comment: self.record_comment.as_deref(),
                type_comment: self.type_comment.as_deref(),
            },
            column,
        );
        out
    }
}

/// One top-level item of an instance file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Record(RawRecord),
    /// A comment block followed by a blank line (or the end of the file).
    Comment { text: String, line: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lexed {
    /// Leading comment block of the file.
    pub header: Option<String>,
    pub items: Vec<Item>,
}

/// Where a trailing `!` comment attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Type,
    Field(usize),
}

#[derive(Debug)]
struct OpenRecord {
    record: RawRecord,
    token: String,
    has_type: bool,
    last_slot: Option<Slot>,
    /// Comments seen while `token` was still unterminated; they belong to
    /// the slot the token ends up in.
    held: Option<String>,
}

impl OpenRecord {
    fn hold(&mut self, comment: &str) {
        match self.held.as_mut() {
            Some(held) => {
                held.push('\n');
                held.push_str(comment);
            }
            None => self.held = Some(comment.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct Lexer {
    out: Lexed,
    pending: Vec<String>,
    pending_line: usize,
    open: Option<OpenRecord>,
}

/// Split instance text into records and comment blocks.
pub fn lex(text: &str) -> Result<Lexed, ParseError> {
    let mut lexer = Lexer::default();
    for (i, line) in text.lines().enumerate() {
        lexer.line(i + 1, line)?;
    }
    lexer.finish()
}

impl Lexer {
    fn line(&mut self, number: usize, line: &str) -> Result<(), ParseError> {
        let trimmed = line.trim();
        if self.open.is_none() {
            if trimmed.is_empty() {
                self.flush_comments();
                return Ok(());
            }
            if trimmed.starts_with('!') {
                if self.pending.is_empty() {
                    self.pending_line = number;
                }
                self.pending.push(trimmed.to_string());
                return Ok(());
            }
        } else if trimmed.is_empty() {
            return Ok(());
        } else if trimmed.starts_with('!') {
            // A comment line inside an object continues the comment of the
            // last terminated token, or waits for the pending one.
            if let Some(open) = self.open.as_mut() {
                if open.token.trim().is_empty() {
                    let slot = open.last_slot.unwrap_or(Slot::Type);
                    attach(&mut open.record, slot, trimmed, true);
                } else {
                    open.hold(trimmed);
                }
            }
            return Ok(());
        }

        // Slot terminated on this line, in the open record or the record
        // this line closed.
        let mut line_slot: Option<(Slot, bool)> = None;
        for (pos, c) in trimmed.char_indices() {
            if self.open.is_none() {
                if c.is_whitespace() {
                    continue;
                }
                if c != '!' {
                    let comment = self.take_pending();
                    self.open = Some(OpenRecord {
                        record: RawRecord::new(number, comment),
                        token: String::new(),
                        has_type: false,
                        last_slot: None,
                        held: None,
                    });
                    line_slot = None;
                }
            }
            match c {
                '!' => {
                    let comment = trimmed[pos..].trim_end();
                    self.attach_line_comment(line_slot, comment);
                    if let Some(open) = self.open.as_mut()
                        && !open.token.trim().is_empty()
                    {
                        open.token.truncate(open.token.trim_end().len());
                        open.token.push(' ');
                    }
                    return Ok(());
                }
                ',' | ';' => {
                    let Some(open) = self.open.as_mut() else {
                        continue;
                    };
                    let token = open.token.trim().to_string();
                    open.token.clear();
                    let slot = if open.has_type {
                        open.record
                            .values
                            .push((!token.is_empty()).then_some(token));
                        Slot::Field(open.record.values.len() - 1)
                    } else {
                        if token.is_empty() {
                            return Err(ParseError::MissingTypeName {
                                line: open.record.line,
                            });
                        }
                        open.record.type_name = token;
                        open.has_type = true;
                        Slot::Type
                    };
                    open.last_slot = Some(slot);
                    if let Some(held) = open.held.take() {
                        attach(&mut open.record, slot, &held, true);
                    }
                    if c == ';' {
                        if let Some(done) = self.open.take() {
                            self.out.items.push(Item::Record(done.record));
                        }
                        line_slot = Some((slot, true));
                    } else {
                        line_slot = Some((slot, false));
                    }
                }
                _ => {
                    if let Some(open) = self.open.as_mut() {
                        open.token.push(c);
                    }
                }
            }
        }
        // A value split over lines keeps a separating space.
        if let Some(open) = self.open.as_mut()
            && !open.token.trim().is_empty()
        {
            open.token.push(' ');
        }
        Ok(())
    }

    fn attach_line_comment(&mut self, line_slot: Option<(Slot, bool)>, comment: &str) {
        match line_slot {
            Some((slot, true)) => {
                if let Some(Item::Record(record)) = self.out.items.last_mut() {
                    attach(record, slot, comment, true);
                }
            }
            Some((slot, false)) => {
                if let Some(open) = self.open.as_mut() {
                    attach(&mut open.record, slot, comment, true);
                }
            }
            None => {
                if let Some(open) = self.open.as_mut() {
                    if open.token.trim().is_empty() {
                        let slot = open.last_slot.unwrap_or(Slot::Type);
                        attach(&mut open.record, slot, comment, true);
                    } else {
                        open.hold(comment);
                    }
                }
            }
        }
    }

    fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending).join("\n"))
        }
    }

    fn flush_comments(&mut self) {
        let line = self.pending_line;
        let Some(text) = self.take_pending() else {
            return;
        };
        if self.out.items.is_empty() && self.out.header.is_none() {
            self.out.header = Some(text);
        } else {
            self.out.items.push(Item::Comment { text, line });
        }
    }

    fn finish(mut self) -> Result<Lexed, ParseError> {
        if let Some(open) = self.open {
            let type_name = if open.has_type {
                open.record.type_name
            } else {
                open.token.trim().to_string()
            };
            return Err(ParseError::Unterminated {
                line: open.record.line,
                type_name,
            });
        }
        self.flush_comments();
        Ok(self.out)
    }
}

fn attach(record: &mut RawRecord, slot: Slot, comment: &str, append: bool) {
    let target = match slot {
        Slot::Type => &mut record.type_comment,
        Slot::Field(i) => {
            let entry = record.field_comments.entry(i).or_default();
            if append && !entry.is_empty() {
                entry.push('\n');
            }
            entry.push_str(comment);
            return;
        }
    };
    match target {
        Some(existing) if append => {
            existing.push('\n');
            existing.push_str(comment);
        }
        _ => *target = Some(comment.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Printing
// ---------------------------------------------------------------------------

/// Borrowed view of everything needed to print one record.
pub(crate) struct RecordLayout<'a> {
    pub type_name: &'a str,
    pub values: &'a [Option<String>],
    pub field_comments: &'a BTreeMap<usize, String>,
    pub record_comment: Option<&'a str>,
    pub type_comment: Option<&'a str>,
}

/// Append one record, one field per line, without a trailing newline.
pub(crate) fn write_record(out: &mut String, layout: &RecordLayout<'_>, column: usize) {
    if let Some(comment) = layout.record_comment {
        for line in comment.lines() {
            out.push_str(line);
            out.push('\n');
        }
    }
    let head_delim = if layout.values.is_empty() { ';' } else { ',' };
    write_line(
        out,
        &format!("{}{head_delim}", layout.type_name),
        layout.type_comment,
        column,
    );
    let last = layout.values.len().saturating_sub(1);
    for (i, value) in layout.values.iter().enumerate() {
        out.push('\n');
        let delim = if i == last { ';' } else { ',' };
        write_line(
            out,
            &format!("  {}{delim}", value.as_deref().unwrap_or("")),
            layout.field_comments.get(&i).map(String::as_str),
            column,
        );
    }
}

fn write_line(out: &mut String, code: &str, comment: Option<&str>, column: usize) {
    out.push_str(code);
    if let Some(comment) = comment {
        let pad = column.saturating_sub(code.chars().count()).max(1);
        out.extend(std::iter::repeat_n(' ', pad));
        out.push_str(comment);
    }
}

/// Join printed blocks with blank lines and end the file with a newline.
pub(crate) fn join_blocks(blocks: Vec<String>) -> String {
    if blocks.is_empty() {
        return String::new();
    }
    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

/// Collapse insignificant whitespace so two renderings of the same records
/// compare equal.
pub fn normalize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .replace(" ,", ",")
        .replace(", ", ",")
        .replace(" ;", ";")
        .replace("; ", ";")
}

/// Value text must not contain grammar delimiters.
pub fn is_storable(text: &str) -> bool {
    !text.contains([',', ';', '!', '\n', '\r'])
}

/// Trimmed value, or `None` when empty.
pub(crate) fn clean_value(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(lexed: &Lexed) -> Vec<&RawRecord> {
        lexed
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Record(r) => Some(r),
                Item::Comment { .. } => None,
            })
            .collect()
    }

    #[test]
    fn one_field_per_line_with_comments() {
        let text = "Zone,           !- type\n  Z1,  !- Name\n  ,\n  0;    !- North\n";
        let lexed = lex(text).unwrap();
        let recs = records(&lexed);
        assert_eq!(recs.len(), 1);
        let zone = recs[0];
        assert_eq!(zone.type_name, "Zone");
        assert_eq!(
            zone.values,
            vec![Some("Z1".to_string()), None, Some("0".to_string())]
        );
        assert_eq!(zone.type_comment.as_deref(), Some("!- type"));
        assert_eq!(zone.field_comments[&0], "!- Name");
        assert_eq!(zone.field_comments[&2], "!- North");
        assert!(!zone.field_comments.contains_key(&1));
    }

    #[test]
    fn several_objects_share_a_line() {
        let lexed = lex("Version,1.2; Zone,Z1,0; !trailing\n").unwrap();
        let recs = records(&lexed);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].values, vec![Some("1.2".to_string())]);
        assert_eq!(recs[1].type_name, "Zone");
        assert_eq!(recs[1].field_comments[&1], "!trailing");
    }

    #[test]
    fn header_record_comment_and_comment_blocks() {
        let text = "!IDF_Version 1.2.0\n!generated\n\n! about zone\nZone,Z1;\n\n! loose note\n\nZone,Z2;\n";
        let lexed = lex(text).unwrap();
        assert_eq!(
            lexed.header.as_deref(),
            Some("!IDF_Version 1.2.0\n!generated")
        );
        assert_eq!(lexed.items.len(), 3);
        match &lexed.items[0] {
            Item::Record(r) => assert_eq!(r.record_comment.as_deref(), Some("! about zone")),
            other => panic!("expected record, got {other:?}"),
        }
        match &lexed.items[1] {
            Item::Comment { text, line } => {
                assert_eq!(text, "! loose note");
                assert_eq!(*line, 7);
            }
            other => panic!("expected comment, got {other:?}"),
        }
    }

    #[test]
    fn object_without_fields() {
        let lexed = lex("Lead Input;\n").unwrap();
        let recs = records(&lexed);
        assert_eq!(recs[0].type_name, "Lead Input");
        assert!(recs[0].values.is_empty());
    }

    #[test]
    fn unterminated_object_reports_its_line() {
        let err = lex("Version,1.2;\n\nZone,\n  Z1,\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::Unterminated {
                line: 3,
                type_name: "Zone".to_string()
            }
        );
    }

    #[test]
    fn missing_type_name() {
        assert!(matches!(
            lex(",Z1;\n"),
            Err(ParseError::MissingTypeName { line: 1 })
        ));
    }

    #[test]
    fn comment_line_inside_object_extends_previous_comment() {
        let lexed = lex("Zone,\n  Z1,  !- Name\n  ! more\n  0;\n").unwrap();
        let zone = records(&lexed)[0];
        assert_eq!(zone.field_comments[&0], "!- Name\n! more");
    }

    #[test]
    fn comment_before_terminator_belongs_to_that_field() {
        let lexed = lex("Zone,\n  Z1  ! note\n  ;\n").unwrap();
        let zone = records(&lexed)[0];
        assert_eq!(zone.values, vec![Some("Z1".to_string())]);
        assert_eq!(zone.type_comment, None);
        assert_eq!(zone.field_comments[&0], "! note");

        let again = lex(&zone.print(38)).unwrap();
        let reprinted = records(&again)[0];
        assert_eq!(reprinted.values, zone.values);
        assert_eq!(reprinted.type_comment, None);
        assert_eq!(reprinted.field_comments, zone.field_comments);
    }

    #[test]
    fn held_comment_lines_join_the_terminated_field() {
        let lexed = lex("Zone,\n  Thermal  ! first\n  ! second\n  Zone, ! after\n  0;\n").unwrap();
        let zone = records(&lexed)[0];
        assert_eq!(zone.values[0].as_deref(), Some("Thermal Zone"));
        assert_eq!(zone.field_comments[&0], "! first\n! second\n! after");
        assert_eq!(zone.type_comment, None);
    }

    #[test]
    fn printed_record_aligns_comments() {
        let lexed = lex("Zone,\n  Z1,  !- Name\n  0;\n").unwrap();
        let printed = records(&lexed)[0].print(38);
        let first_field = printed.lines().nth(1).unwrap();
        assert_eq!(first_field.find('!'), Some(38));
        assert_eq!(normalize(&printed), normalize("Zone,\n  Z1, !- Name\n  0;"));
    }

    #[test]
    fn long_values_keep_one_space_before_comment() {
        let value = "x".repeat(50);
        let lexed = lex(&format!("Zone,\n  {value}; !c\n")).unwrap();
        let printed = records(&lexed)[0].print(38);
        assert!(printed.contains(&format!("{value}; !c")));
    }

    #[test]
    fn normalize_ignores_layout() {
        assert_eq!(
            normalize("Zone,\n   Z1 ,\n\n  0 ;"),
            normalize("Zone,Z1,0;")
        );
        assert_ne!(normalize("Zone,Z1;"), normalize("Zone,Z2;"));
    }

    #[test]
    fn storable_values() {
        assert!(is_storable("Thermal Zone 1"));
        assert!(!is_storable("a,b"));
        assert!(!is_storable("a;"));
        assert!(!is_storable("a!"));
        assert!(!is_storable("a\nb"));
    }
}
