//! Splitting feed documents into record fragments.

use std::sync::LazyLock;

use regex::Regex;
use tenderwatch_shared::{IdSource, RecordFragment, UniqueId};
use tracing::{debug, info, warn};

use crate::archive::RawDocument;
use crate::fields;

static ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry.*?</entry>").expect("entry regex"));

/// Split one document into `<entry>` spans, each with its identifier.
///
/// A document without any entry boundary yields an empty list.
pub fn extract(doc: &RawDocument) -> Vec<RecordFragment> {
    let fragments: Vec<RecordFragment> = ENTRY
        .find_iter(&doc.text)
        .map(|m| fragment(m.as_str()))
        .collect();

    if fragments.is_empty() {
        warn!(document = %doc.name, "document holds no entries, skipping");
    } else {
        debug!(document = %doc.name, entries = fragments.len(), "entries extracted");
    }
    fragments
}

/// Extract fragments from every document, preserving order, and report how
/// many identifiers had to be generated.
pub fn extract_all(docs: &[RawDocument]) -> Vec<RecordFragment> {
    let fragments: Vec<RecordFragment> = docs.iter().flat_map(extract).collect();

    let generated = fragments
        .iter()
        .filter(|f| f.id_source == IdSource::Generated)
        .count();
    if generated > 0 {
        warn!(generated, "entries without case number or id; using generated identifiers");
    }

    info!(documents = docs.len(), entries = fragments.len(), "extraction complete");
    fragments
}

/// Resolve the identifier of one entry span.
///
/// Tries the `Expediente` case number in the title, then the tail of the
/// `<id>` element, then generates a placeholder.
pub fn extract_unique_id(span: &str) -> (UniqueId, IdSource) {
    if let Some(id) = fields::case_number(span).and_then(UniqueId::new) {
        return (id, IdSource::CaseNumber);
    }
    if let Some(id) = fields::id_tail(span).and_then(UniqueId::new) {
        return (id, IdSource::IdTail);
    }

    let id = UniqueId::generated();
    debug!(%id, "entry has no identifier, generated one");
    (id, IdSource::Generated)
}

fn fragment(span: &str) -> RecordFragment {
    let (id, id_source) = extract_unique_id(span);
    RecordFragment {
        id,
        id_source,
        text: span.to_string(),
    }
}
