//! Pagination – the running logical page counter and the chapter page map.
//!
//! Chapters render as independent documents, so the position of any chapter
//! in the final output is known only after every preceding chapter has been
//! rendered and counted. The tracker carries that cumulative count; the map
//! records where each chapter landed so the TOC can print page references.

use std::collections::BTreeMap;

use log::debug;

/// Chapter path → first logical page number (1-based, position in the final
/// concatenated document). Populated incrementally, in spine order.
#[derive(Debug, Clone, Default)]
pub struct PageMap {
    entries: BTreeMap<String, usize>,
}

impl PageMap {
    pub fn insert(&mut self, chapter_path: &str, first_page: usize) {
        self.entries.insert(chapter_path.to_string(), first_page);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a chapter's first page by href (fragment already stripped).
    ///
    /// Exact path match first; if the href uses a different directory prefix
    /// than the manifest path, fall back to matching the final path segment.
    pub fn lookup(&self, href: &str) -> Option<usize> {
        if let Some(&page) = self.entries.get(href) {
            return Some(page);
        }
        let name = href.rsplit('/').next()?;
        if name.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(path, _)| path.rsplit('/').next() == Some(name))
            .map(|(_, &page)| page)
    }
}

/// The single monotonically increasing logical page counter for one
/// conversion job. Strictly sequential: each chapter's starting page depends
/// on the rendered length of every chapter before it.
#[derive(Debug, Default)]
pub struct PaginationTracker {
    current: usize,
}

impl PaginationTracker {
    /// Reset the counter to its baseline: the number of logical pages that
    /// precede the first chapter (estimated TOC length + start page − 1, or
    /// start page − 1 with the TOC disabled).
    pub fn seed(baseline: usize) -> Self {
        Self { current: baseline }
    }

    /// Pages counted so far — the value a chapter's page counter must be
    /// reset to at the moment it starts rendering.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Record the chapter that is about to render: its first page is the
    /// page after everything counted so far.
    pub fn begin_chapter(&mut self, map: &mut PageMap, chapter_path: &str) {
        let first_page = self.current + 1;
        debug!("chapter '{chapter_path}' starts at page {first_page}");
        map.insert(chapter_path, first_page);
    }

    /// Advance by a rendered document's page count.
    pub fn advance(&mut self, pages: usize) {
        self.current += pages;
    }
}
