//! Document assembly – wraps chapter markup and the shared stylesheet into
//! self-contained HTML documents for the renderer.
//!
//! Each chapter is rendered as an independent document, so page-number
//! continuity across chapters is achieved purely in CSS: the page footer
//! prints `counter(page)` and each chapter body resets the counter to the
//! number of logical pages that precede it.

/// CSS that prints the running page counter in the page footer and seeds it
/// so this document's first page shows `start + 1`.
pub fn page_number_css(start: usize) -> String {
    format!(
        "@page {{ @bottom-center {{ content: counter(page); }} }}\n\
         body {{ counter-reset: page {start}; }}\n"
    )
}

/// Wrap inlined chapter markup into a standalone document.
///
/// The head carries a single `<style>` block: the shared stylesheet followed
/// by the page-number directive (when enabled). The body is the chapter
/// markup verbatim.
pub fn chapter_document(markup: &str, styles: &str, page_css: Option<&str>) -> String {
    let page_css = page_css.unwrap_or("");
    format!("<html><head><style>{styles}\n{page_css}</style></head><body>{markup}</body></html>")
}

/// Escape text for embedding into HTML content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap plain text into a minimal preformatted document (the `.txt` input
/// path).
pub fn text_document(text: &str, page_css: Option<&str>) -> String {
    let body = format!("<pre>{}</pre>", escape_html(text));
    chapter_document(&body, "", page_css)
}
