//! JSON rendering of validity reports.

use idfstore_core::store::Store;
use idfstore_core::validity::{ErrorKind, Scope, Strictness, ValidityReport};
use serde::Serialize;

/// One [`DataError`](idfstore_core::validity::DataError) with handles and ids
/// replaced by the names a reader recognizes.
#[derive(Debug, Serialize)]
pub struct ReportEntry {
    pub scope: Scope,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportDocument {
    pub strictness: Strictness,
    pub valid: bool,
    pub errors: Vec<ReportEntry>,
}

/// Name every error in `report` against `store`.
pub fn report_document(report: &ValidityReport, store: &Store) -> ReportDocument {
    let catalog = store.catalog();
    let errors = report
        .errors
        .iter()
        .map(|error| {
            let schema = error.type_id.and_then(|id| catalog.object_schema(id).ok());
            let object_name = error
                .object
                .and_then(|h| store.get(h))
                .and_then(|o| o.name())
                .map(str::to_string);
            let field_name = error
                .field
                .and_then(|f| schema.and_then(|s| s.field_spec(f)))
                .and_then(|spec| spec.name.clone());
            ReportEntry {
                scope: error.scope,
                kind: error.kind,
                object_type: schema.map(|s| s.name.clone()),
                object_name,
                field: error.field,
                field_name,
            }
        })
        .collect();
    ReportDocument {
        strictness: report.strictness,
        valid: report.is_valid(),
        errors,
    }
}

/// Pretty-printed JSON form of [`report_document`].
pub fn report_json(report: &ValidityReport, store: &Store) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&report_document(report, store))
}
