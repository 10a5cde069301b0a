//! Table-of-contents generation.
//!
//! The TOC's own length shifts every chapter's starting page, and the
//! chapters' starting pages are what the TOC prints. The estimator breaks
//! the cycle with two sequential passes:
//!
//! 1. **Estimate** – render the TOC with structure only (no page numbers
//!    filled in) to measure how many pages it occupies. The page-numbering
//!    CSS is active during this pass so the measurement happens under the
//!    real numbering regime.
//! 2. **Finalize** – after all chapters have been rendered against the
//!    baseline derived from the estimate, render the TOC again with the
//!    real page numbers from the page map.
//!
//! If the final render's length differs from the estimate, the shipped page
//! references may be off by the delta; we log a warning and proceed rather
//! than re-running the pipeline (a single fixed-point iteration, never a
//! loop).

use std::path::Path;

use log::{info, warn};

use crate::book::TocNode;
use crate::compose::{chapter_document, escape_html, page_number_css};
use crate::error::ConvertError;
use crate::pagination::PageMap;
use crate::render::{PageRenderer, RenderedDocument};
use crate::settings::ConversionSettings;

/// Build the TOC HTML document. With `page_map = None` the entries carry no
/// page references (the estimation pass); otherwise each entry whose target
/// is found in the map gets its starting page printed.
pub fn toc_document(
    nodes: &[TocNode],
    page_map: Option<&PageMap>,
    settings: &ConversionSettings,
) -> String {
    let mut body = String::from("<h1 class=\"toc-heading\">Contents</h1>\n");
    body.push_str(&toc_list(nodes, page_map, settings.toc_numbers));

    let styles = "ol.toc { list-style: none; }\n\
                  ol.toc li { margin: 0.2em 0; }\n\
                  .toc-page { float: right; }\n";
    let page_css = settings
        .page_numbers
        .then(|| page_number_css(settings.toc_start_page.saturating_sub(1)));
    chapter_document(&body, styles, page_css.as_deref())
}

fn toc_list(nodes: &[TocNode], page_map: Option<&PageMap>, toc_numbers: bool) -> String {
    if nodes.is_empty() {
        return String::new();
    }
    let mut out = String::from("<ol class=\"toc\">\n");
    for node in nodes {
        out.push_str("<li><span class=\"toc-title\">");
        out.push_str(&escape_html(&node.title));
        out.push_str("</span>");
        if toc_numbers {
            if let Some(page) = page_map.and_then(|map| map.lookup(node.page_key())) {
                out.push_str(&format!(" <span class=\"toc-page\">{page}</span>"));
            }
        }
        out.push_str(&toc_list(&node.children, page_map, toc_numbers));
        out.push_str("</li>\n");
    }
    out.push_str("</ol>\n");
    out
}

/// Two-pass TOC renderer. Holds the outline for the duration of one job;
/// the nodes are consumed twice (dry render, then final render).
pub struct TocEstimator<'a> {
    nodes: &'a [TocNode],
    settings: &'a ConversionSettings,
}

impl<'a> TocEstimator<'a> {
    pub fn new(nodes: &'a [TocNode], settings: &'a ConversionSettings) -> Self {
        Self { nodes, settings }
    }

    /// Dry render: measure how many pages the TOC occupies with no page
    /// numbers filled in.
    pub fn estimate<R: PageRenderer>(
        &self,
        renderer: &R,
        base_dir: &Path,
    ) -> Result<usize, ConvertError> {
        let html = toc_document(self.nodes, None, self.settings);
        let doc = renderer
            .render(&html, base_dir)
            .map_err(|e| ConvertError::render("table of contents (estimate)", e))?;
        let pages = doc.page_count();
        info!("estimated table of contents length: {pages} page(s)");
        Ok(pages)
    }

    /// Final render with real page numbers. Compares the result against the
    /// earlier estimate and warns on drift; the document is shipped either
    /// way.
    pub fn finalize<R: PageRenderer>(
        &self,
        renderer: &R,
        base_dir: &Path,
        page_map: &PageMap,
        estimated_pages: usize,
    ) -> Result<R::Doc, ConvertError> {
        let html = toc_document(self.nodes, Some(page_map), self.settings);
        let doc = renderer
            .render(&html, base_dir)
            .map_err(|e| ConvertError::render("table of contents", e))?;
        let actual = doc.page_count();
        if actual != estimated_pages {
            warn!(
                "table of contents length drifted: estimated {estimated_pages} page(s), \
                 rendered {actual}; page references may be off by the difference"
            );
        }
        Ok(doc)
    }
}
