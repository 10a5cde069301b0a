//! Pipeline – ties together book loading, asset inlining, chapter rendering,
//! TOC estimation, pagination tracking, and final assembly into a single
//! conversion call.
//!
//! The pipeline is strictly sequential: each chapter's starting page depends
//! on the rendered length of every chapter before it, and the TOC baseline
//! depends on the TOC's own estimated length.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::assets::{inline_css, inline_markup, ImageIndex};
use crate::book::{file_stem, Book};
use crate::compose::{chapter_document, page_number_css, text_document};
use crate::error::ConvertError;
use crate::pagination::{PageMap, PaginationTracker};
use crate::render::{PageRenderer, RenderedDocument};
use crate::settings::ConversionSettings;
use crate::toc::TocEstimator;

/// Receives the job's progress notifications: integer percentages, 0–100.
pub trait ProgressSink {
    fn percent(&mut self, value: u8);
}

/// Sink that discards all notifications.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn percent(&mut self, _value: u8) {}
}

/// Wraps a sink and enforces the reporting contract: values are clamped to
/// 0–100 and never decrease.
pub struct Progress<'a> {
    sink: &'a mut dyn ProgressSink,
    last: u8,
}

impl<'a> Progress<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        sink.percent(0);
        Self { sink, last: 0 }
    }

    pub fn set(&mut self, value: u8) {
        let value = value.min(100);
        if value > self.last {
            self.last = value;
            self.sink.percent(value);
        }
    }
}

/// Destination for a converted file: same path, `.pdf` extension.
pub fn output_path_for(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}

/// Convert one input file (`.epub` or `.txt`) to a PDF next to it.
///
/// Returns the output path on success. All fatal errors abort the job; the
/// output file is only ever created whole.
pub fn convert<R: PageRenderer>(
    input: &Path,
    settings: &ConversionSettings,
    renderer: &R,
    sink: &mut dyn ProgressSink,
) -> Result<PathBuf, ConvertError> {
    let mut progress = Progress::new(sink);
    let output = output_path_for(input);

    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("epub") => convert_epub(input, &output, settings, renderer, &mut progress)?,
        Some("txt") => convert_txt(input, &output, settings, renderer, &mut progress)?,
        _ => return Err(ConvertError::UnsupportedInput(input.to_path_buf())),
    }

    progress.set(100);
    info!("successfully converted to {}", output.display());
    Ok(output)
}

fn convert_epub<R: PageRenderer>(
    input: &Path,
    output: &Path,
    settings: &ConversionSettings,
    renderer: &R,
    progress: &mut Progress<'_>,
) -> Result<(), ConvertError> {
    info!("reading EPUB file: {}", input.display());
    let book = Book::load(input)?;
    progress.set(5);

    let (docs, _page_map) = render_book(&book, settings, renderer, progress)?;

    info!("all chapters rendered; merging into a single PDF");
    renderer.write_pdf(&docs, &book.title, output)?;
    Ok(())
}

fn convert_txt<R: PageRenderer>(
    input: &Path,
    output: &Path,
    settings: &ConversionSettings,
    renderer: &R,
    progress: &mut Progress<'_>,
) -> Result<(), ConvertError> {
    info!("reading TXT file: {}", input.display());
    let text = fs::read_to_string(input).map_err(|source| ConvertError::InputRead {
        path: input.to_path_buf(),
        source,
    })?;
    progress.set(10);

    let page_css = settings
        .page_numbers
        .then(|| page_number_css(settings.toc_start_page.saturating_sub(1)));
    let html = text_document(&text, page_css.as_deref());

    let base_dir = input.parent().unwrap_or_else(|| Path::new("."));
    let doc = renderer
        .render(&html, base_dir)
        .map_err(|e| ConvertError::render(input.display().to_string(), e))?;
    progress.set(80);

    renderer.write_pdf(&[doc], &file_stem(input), output)?;
    Ok(())
}

/// Render every document of a book, in order, and compute the chapter page
/// map. Returns the rendered documents ready for concatenation: the final
/// TOC first (when enabled), then the chapters in spine order.
pub fn render_book<R: PageRenderer>(
    book: &Book,
    settings: &ConversionSettings,
    renderer: &R,
    progress: &mut Progress<'_>,
) -> Result<(Vec<R::Doc>, PageMap), ConvertError> {
    if book.chapters.is_empty() {
        return Err(ConvertError::EmptyBook(book.source.clone()));
    }

    // The image index is built once per job and is immutable afterwards.
    let index = ImageIndex::build(book.images.clone());
    info!("inlining CSS styles ({} indexed images)", index.len());
    let styles = inline_css(&book.stylesheet, &index);

    let toc_enabled = settings.toc && !book.toc.is_empty();
    let estimator = toc_enabled.then(|| TocEstimator::new(&book.toc, settings));

    // Dry-render the TOC to size it; its length shifts every chapter.
    let toc_pages = match &estimator {
        Some(estimator) => estimator.estimate(renderer, &book.base_dir)?,
        None => 0,
    };
    progress.set(10);

    let baseline = toc_pages + settings.toc_start_page.saturating_sub(1);
    let mut tracker = PaginationTracker::seed(baseline);
    let mut page_map = PageMap::default();

    let total = book.chapters.len();
    info!("processing {total} documents chapter by chapter");
    let mut docs = Vec::with_capacity(total + 1);
    for (i, chapter) in book.chapters.iter().enumerate() {
        info!("rendering document: {}", chapter.path);
        let markup = inline_markup(&chapter.markup, &index);
        let page_css = settings
            .page_numbers
            .then(|| page_number_css(tracker.current()));
        let html = chapter_document(&markup, &styles, page_css.as_deref());

        tracker.begin_chapter(&mut page_map, &chapter.path);
        let doc = renderer
            .render(&html, &book.base_dir)
            .map_err(|e| ConvertError::render(chapter.path.clone(), e))?;
        tracker.advance(doc.page_count());
        docs.push(doc);

        progress.set(10 + ((i + 1) * 80 / total) as u8);
    }

    if let Some(estimator) = &estimator {
        let toc_doc = estimator.finalize(renderer, &book.base_dir, &page_map, toc_pages)?;
        docs.insert(0, toc_doc);
        progress.set(95);
    }

    Ok((docs, page_map))
}
