//! Page references and overlap expansion of retrieval hits.
//!
//! Retrieval returns single pages, but tables and multi-page instructions
//! often continue on the neighbouring pages. [`expand_with_overlap`] widens
//! each hit into a window of adjacent pages of the same document, merges the
//! windows and returns them in reading order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// A single page of the indexed corpus.
///
/// Ordering is by document first, then page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRef {
    pub doc_id: u32,
    /// 1-indexed page number.
    pub page_num: u32,
}

impl PageRef {
    pub fn new(doc_id: u32, page_num: u32) -> Self {
        Self { doc_id, page_num }
    }
}

impl From<(u32, u32)> for PageRef {
    fn from((doc_id, page_num): (u32, u32)) -> Self {
        Self { doc_id, page_num }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc {} p.{}", self.doc_id, self.page_num)
    }
}

/// A page returned by the retriever. Rank is the position in the result list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    #[serde(flatten)]
    pub page: PageRef,
    /// Relevance score, higher is better.
    pub score: f32,
}

impl RetrievalHit {
    pub fn new(doc_id: u32, page_num: u32, score: f32) -> Self {
        Self {
            page: PageRef::new(doc_id, page_num),
            score,
        }
    }
}

/// Knows how many pages each indexed document has.
pub trait PageInventory {
    /// Total pages of a document, or `None` if the document is unknown.
    fn page_count(&self, doc_id: u32) -> Option<u32>;
}

impl PageInventory for HashMap<u32, u32> {
    fn page_count(&self, doc_id: u32) -> Option<u32> {
        self.get(&doc_id).copied()
    }
}

impl PageInventory for BTreeMap<u32, u32> {
    fn page_count(&self, doc_id: u32) -> Option<u32> {
        self.get(&doc_id).copied()
    }
}

/// Expand retrieval hits with up to `pages_before` / `pages_after` neighbours.
///
/// Windows are clamped to `[1, page_count]` of the hit's own document and
/// merged without duplicates; the result is sorted by `(doc_id, page_num)`.
/// Hits on documents the inventory does not know are dropped.
///
/// With both window sizes at zero the hit pages are returned as-is, keeping
/// rank order.
pub fn expand_with_overlap<I>(
    hits: &[RetrievalHit],
    pages_before: u32,
    pages_after: u32,
    inventory: &I,
) -> Vec<PageRef>
where
    I: PageInventory + ?Sized,
{
    if pages_before == 0 && pages_after == 0 {
        return hits.iter().map(|hit| hit.page).collect();
    }

    let mut expanded = BTreeSet::new();

    for hit in hits {
        let Some(total_pages) = inventory.page_count(hit.page.doc_id) else {
            tracing::debug!(doc_id = hit.page.doc_id, "skipping hit on unknown document");
            continue;
        };

        let start = hit.page.page_num.saturating_sub(pages_before).max(1);
        let end = hit.page.page_num.saturating_add(pages_after).min(total_pages);

        for page_num in start..=end {
            expanded.insert(PageRef::new(hit.page.doc_id, page_num));
        }
    }

    expanded.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory(counts: &[(u32, u32)]) -> HashMap<u32, u32> {
        counts.iter().copied().collect()
    }

    fn pages(refs: &[(u32, u32)]) -> Vec<PageRef> {
        refs.iter().copied().map(PageRef::from).collect()
    }

    #[test]
    fn test_duplicate_hits_expand_once() {
        let hits = vec![RetrievalHit::new(0, 5, 0.9), RetrievalHit::new(0, 5, 0.8)];
        let expanded = expand_with_overlap(&hits, 1, 1, &inventory(&[(0, 10)]));
        assert_eq!(expanded, pages(&[(0, 4), (0, 5), (0, 6)]));
    }

    #[test]
    fn test_zero_window_keeps_rank_order() {
        let hits = vec![
            RetrievalHit::new(3, 7, 0.9),
            RetrievalHit::new(1, 2, 0.8),
            RetrievalHit::new(3, 7, 0.7),
            RetrievalHit::new(9, 1, 0.1),
        ];
        // Unknown documents and duplicates are left alone on the fast path.
        let expanded = expand_with_overlap(&hits, 0, 0, &inventory(&[(1, 5)]));
        assert_eq!(expanded, pages(&[(3, 7), (1, 2), (3, 7), (9, 1)]));
    }

    #[test]
    fn test_window_clamped_to_document_bounds() {
        let hits = vec![RetrievalHit::new(0, 1, 1.0), RetrievalHit::new(1, 3, 1.0)];
        let expanded = expand_with_overlap(&hits, 2, 2, &inventory(&[(0, 2), (1, 3)]));
        assert_eq!(expanded, pages(&[(0, 1), (0, 2), (1, 1), (1, 2), (1, 3)]));
    }

    #[test]
    fn test_window_never_crosses_into_other_document() {
        // Document 0 ends at page 3; its window must not spill into document 1.
        let hits = vec![RetrievalHit::new(0, 3, 1.0)];
        let expanded = expand_with_overlap(&hits, 0, 5, &inventory(&[(0, 3), (1, 10)]));
        assert_eq!(expanded, pages(&[(0, 3)]));
    }

    #[test]
    fn test_overlapping_windows_merge_and_sort() {
        let hits = vec![
            RetrievalHit::new(2, 8, 0.9),
            RetrievalHit::new(0, 4, 0.8),
            RetrievalHit::new(2, 6, 0.7),
        ];
        let expanded = expand_with_overlap(&hits, 1, 1, &inventory(&[(0, 10), (2, 10)]));
        assert_eq!(
            expanded,
            pages(&[(0, 3), (0, 4), (0, 5), (2, 5), (2, 6), (2, 7), (2, 8), (2, 9)])
        );
    }

    #[test]
    fn test_unknown_document_is_skipped() {
        let hits = vec![RetrievalHit::new(7, 2, 1.0), RetrievalHit::new(0, 1, 0.5)];
        let expanded = expand_with_overlap(&hits, 1, 1, &inventory(&[(0, 4)]));
        assert_eq!(expanded, pages(&[(0, 1), (0, 2)]));
    }

    #[test]
    fn test_stale_page_beyond_document_end_yields_nothing() {
        let hits = vec![RetrievalHit::new(0, 20, 1.0)];
        let expanded = expand_with_overlap(&hits, 1, 1, &inventory(&[(0, 5)]));
        assert!(expanded.is_empty());
    }

    #[test]
    fn test_asymmetric_window() {
        let hits = vec![RetrievalHit::new(0, 5, 1.0)];
        let expanded = expand_with_overlap(&hits, 0, 2, &inventory(&[(0, 10)]));
        assert_eq!(expanded, pages(&[(0, 5), (0, 6), (0, 7)]));
    }

    #[test]
    fn test_invariants_hold_over_many_windows() {
        let inv = inventory(&[(0, 1), (1, 4), (2, 12)]);
        for before in 0..4 {
            for after in 0..4 {
                if before == 0 && after == 0 {
                    continue;
                }
                let hits: Vec<_> = [(0, 1), (1, 1), (1, 4), (2, 6), (2, 7), (2, 12)]
                    .iter()
                    .map(|&(d, p)| RetrievalHit::new(d, p, 0.5))
                    .collect();
                let expanded = expand_with_overlap(&hits, before, after, &inv);

                for pair in expanded.windows(2) {
                    assert!(pair[0] < pair[1], "not strictly increasing: {:?}", pair);
                }
                for page in &expanded {
                    let total = inv[&page.doc_id];
                    assert!(page.page_num >= 1 && page.page_num <= total);
                }
            }
        }
    }

    #[test]
    fn test_page_ref_serializes_as_object() {
        let json = serde_json::to_string(&PageRef::new(2, 3)).unwrap();
        assert_eq!(json, r#"{"doc_id":2,"page_num":3}"#);
    }
}
