//! Source linking: resolving `[Source N]` markers against the assembled
//! context's source map.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::SourceMap;
use crate::core::SourceReference;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Source (\d+)\]").expect("static regex"));

/// Outcome of scanning a response for citations.
#[derive(Debug, Clone, Default)]
pub struct LinkedSources {
    /// Resolved references, deduplicated in first-occurrence order.
    pub references: Vec<SourceReference>,
    /// Marker numbers with no entry in the source map. Reported as
    /// validation issues, never fatal.
    pub unknown_markers: Vec<usize>,
}

/// Scans `response` for `[Source N]` markers and binds them to chunks.
#[must_use]
pub fn link_sources(response: &str, source_map: &SourceMap) -> LinkedSources {
    let mut seen: HashSet<usize> = HashSet::new();
    let mut linked = LinkedSources::default();

    for captures in MARKER.captures_iter(response) {
        let Ok(marker) = captures[1].parse::<usize>() else {
            continue;
        };
        if !seen.insert(marker) {
            continue;
        }
        match source_map.get(&marker) {
            Some(slot) => linked.references.push(SourceReference {
                marker,
                chunk_id: slot.chunk_id,
                document_id: slot.document_id,
            }),
            None => linked.unknown_markers.push(marker),
        }
    }

    linked
}
