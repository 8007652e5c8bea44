//! Decides whether a freshly fetched document should replace the active one.
use crate::ConfigurationDocument;

/// Returns `true` if `candidate` should replace `previous`.
///
/// The first document (no `previous`) always counts as a change. Otherwise the documents are
/// compared structurally by content: object key order and fetch timestamps are ignored.
pub fn has_changed(
    previous: Option<&ConfigurationDocument>,
    candidate: &ConfigurationDocument,
) -> bool {
    match previous {
        None => true,
        Some(previous) => previous != candidate,
    }
}
