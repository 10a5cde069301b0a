//! Integration tests for the inkbind pipeline.
//!
//! These tests validate:
//! - Chapter starting pages and the page map under different TOC settings
//! - The counter-reset CSS injected per chapter
//! - TOC estimation, drift handling, and final page references
//! - Image inlining as seen by the renderer
//! - End-to-end conversion of a minimal EPUB container

use std::cell::RefCell;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use inkbind::assets::ImageAsset;
use inkbind::book::{Book, Chapter, TocNode};
use inkbind::pipeline::{convert, render_book, NullProgress, Progress};
use inkbind::render::{FlowRenderer, PageRenderer, RenderedDocument};
use inkbind::settings::ConversionSettings;
use inkbind::ConvertError;

// =====================================================================
// Scripted renderer
// =====================================================================

/// A rendered document is just a page count plus the HTML it came from.
#[derive(Debug)]
struct FakeDoc {
    pages: usize,
    html: String,
}

impl RenderedDocument for FakeDoc {
    fn page_count(&self) -> usize {
        self.pages
    }
}

/// Renderer double with scripted page counts.
///
/// Chapter bodies embed a `[pages=N]` marker that dictates the document
/// length. The generated TOC carries no marker; it is recognized by its
/// heading and sized by `toc_estimate_pages` / `toc_final_pages` (split so
/// drift between the two passes can be simulated). Every rendered HTML
/// string is recorded for inspection.
struct FakeRenderer {
    toc_estimate_pages: usize,
    toc_final_pages: usize,
    rendered: RefCell<Vec<String>>,
}

impl FakeRenderer {
    fn new() -> Self {
        Self {
            toc_estimate_pages: 1,
            toc_final_pages: 1,
            rendered: RefCell::new(Vec::new()),
        }
    }

    fn with_toc_pages(estimate: usize, fina: usize) -> Self {
        Self {
            toc_estimate_pages: estimate,
            toc_final_pages: fina,
            ..Self::new()
        }
    }

    fn rendered_html(&self) -> Vec<String> {
        self.rendered.borrow().clone()
    }
}

fn marker_pages(html: &str) -> Option<usize> {
    let start = html.find("[pages=")? + "[pages=".len();
    let rest = &html[start..];
    let end = rest.find(']')?;
    rest[..end].parse().ok()
}

/// The page number the injected CSS resets the counter to, if any.
fn counter_reset(html: &str) -> Option<usize> {
    let start = html.find("counter-reset: page ")? + "counter-reset: page ".len();
    let rest = &html[start..];
    let end = rest.find(|c: char| !c.is_ascii_digit())?;
    rest[..end].parse().ok()
}

impl PageRenderer for FakeRenderer {
    type Doc = FakeDoc;

    fn render(&self, html: &str, _base_dir: &Path) -> Result<Self::Doc, String> {
        self.rendered.borrow_mut().push(html.to_string());
        let pages = match marker_pages(html) {
            Some(pages) => pages,
            None if html.contains("toc-heading") => {
                if html.contains("toc-page\">") {
                    self.toc_final_pages
                } else {
                    self.toc_estimate_pages
                }
            }
            None => 1,
        };
        Ok(FakeDoc {
            pages,
            html: html.to_string(),
        })
    }

    fn write_pdf(
        &self,
        _docs: &[Self::Doc],
        _title: &str,
        _output: &Path,
    ) -> Result<(), ConvertError> {
        Ok(())
    }
}

// =====================================================================
// Book fixtures
// =====================================================================

fn chapter(path: &str, pages: usize) -> Chapter {
    Chapter {
        path: path.to_string(),
        markup: format!("<p>[pages={pages}]</p>"),
    }
}

fn toc_leaf(title: &str, href: &str) -> TocNode {
    TocNode {
        title: title.to_string(),
        href: href.to_string(),
        children: Vec::new(),
    }
}

fn book(chapters: Vec<Chapter>, toc: Vec<TocNode>) -> Book {
    Book {
        source: PathBuf::from("fixture.epub"),
        title: "Fixture".to_string(),
        base_dir: PathBuf::from("."),
        chapters,
        toc,
        ..Book::default()
    }
}

fn run(
    book: &Book,
    settings: &ConversionSettings,
    renderer: &FakeRenderer,
) -> (Vec<FakeDoc>, inkbind::pagination::PageMap) {
    let mut sink = NullProgress;
    let mut progress = Progress::new(&mut sink);
    render_book(book, settings, renderer, &mut progress).unwrap()
}

// =====================================================================
// Page numbering and the page map
// =====================================================================

#[test]
fn chapter_pages_accumulate_without_toc() {
    let book = book(
        vec![
            chapter("ch1.xhtml", 2),
            chapter("ch2.xhtml", 3),
            chapter("ch3.xhtml", 1),
        ],
        Vec::new(),
    );
    let renderer = FakeRenderer::new();
    let (docs, map) = run(&book, &ConversionSettings::default(), &renderer);

    assert_eq!(docs.len(), 3);
    assert_eq!(map.lookup("ch1.xhtml"), Some(1));
    assert_eq!(map.lookup("ch2.xhtml"), Some(3));
    assert_eq!(map.lookup("ch3.xhtml"), Some(6));
}

#[test]
fn toc_start_page_shifts_every_chapter() {
    let book = book(vec![chapter("ch1.xhtml", 3)], Vec::new());
    let settings = ConversionSettings {
        toc_start_page: 5,
        ..ConversionSettings::default()
    };
    let renderer = FakeRenderer::new();
    let (docs, map) = run(&book, &settings, &renderer);

    assert_eq!(docs.len(), 1);
    assert_eq!(map.lookup("ch1.xhtml"), Some(5));
    // The chapter's first page prints 5, so its CSS resets the counter to 4.
    let html = renderer.rendered_html();
    assert_eq!(counter_reset(&html[0]), Some(4));
}

#[test]
fn page_numbers_can_be_disabled() {
    let book = book(vec![chapter("ch1.xhtml", 2)], Vec::new());
    let settings = ConversionSettings {
        page_numbers: false,
        ..ConversionSettings::default()
    };
    let renderer = FakeRenderer::new();
    let (_docs, map) = run(&book, &settings, &renderer);

    // The map is still tracked, but no counter CSS reaches the renderer.
    assert_eq!(map.lookup("ch1.xhtml"), Some(1));
    for html in renderer.rendered_html() {
        assert_eq!(counter_reset(&html), None);
    }
}

#[test]
fn empty_book_is_rejected() {
    let book = book(Vec::new(), Vec::new());
    let renderer = FakeRenderer::new();
    let mut sink = NullProgress;
    let mut progress = Progress::new(&mut sink);
    let err = render_book(
        &book,
        &ConversionSettings::default(),
        &renderer,
        &mut progress,
    )
    .unwrap_err();
    assert!(matches!(err, ConvertError::EmptyBook(_)));
}

#[test]
fn conversion_is_deterministic() {
    let book = book(
        vec![chapter("ch1.xhtml", 2), chapter("ch2.xhtml", 3)],
        vec![toc_leaf("One", "ch1.xhtml"), toc_leaf("Two", "ch2.xhtml")],
    );
    let settings = ConversionSettings {
        toc: true,
        toc_numbers: true,
        ..ConversionSettings::default()
    };

    let first = FakeRenderer::new();
    let (_docs, map_a) = run(&book, &settings, &first);
    let second = FakeRenderer::new();
    let (_docs, map_b) = run(&book, &settings, &second);

    assert_eq!(map_a.lookup("ch1.xhtml"), map_b.lookup("ch1.xhtml"));
    assert_eq!(map_a.lookup("ch2.xhtml"), map_b.lookup("ch2.xhtml"));
    assert_eq!(first.rendered_html(), second.rendered_html());
}

// =====================================================================
// Table of contents
// =====================================================================

#[test]
fn toc_pages_shift_chapter_numbering() {
    // One TOC page in front: chapter 1 starts on page 2, chapter 2 on
    // page 4, and the merged document runs 7 pages in total.
    let book = book(
        vec![chapter("ch1.xhtml", 2), chapter("ch2.xhtml", 4)],
        vec![toc_leaf("One", "ch1.xhtml"), toc_leaf("Two", "ch2.xhtml")],
    );
    let settings = ConversionSettings {
        toc: true,
        toc_numbers: true,
        ..ConversionSettings::default()
    };
    let renderer = FakeRenderer::new();
    let (docs, map) = run(&book, &settings, &renderer);

    assert_eq!(map.lookup("ch1.xhtml"), Some(2));
    assert_eq!(map.lookup("ch2.xhtml"), Some(4));
    assert_eq!(docs.iter().map(|d| d.pages).sum::<usize>(), 7);

    // The TOC document comes first and prints the final page numbers.
    assert!(docs[0].html.contains("toc-heading"));
    assert!(docs[0].html.contains("<span class=\"toc-page\">2</span>"));
    assert!(docs[0].html.contains("<span class=\"toc-page\">4</span>"));
}

#[test]
fn toc_drift_warns_but_completes() {
    // The final TOC render comes out one page longer than the estimate.
    // The job must still finish and ship the final render.
    let book = book(
        vec![chapter("ch1.xhtml", 2)],
        vec![toc_leaf("One", "ch1.xhtml")],
    );
    let settings = ConversionSettings {
        toc: true,
        toc_numbers: true,
        ..ConversionSettings::default()
    };
    let renderer = FakeRenderer::with_toc_pages(1, 2);
    let (docs, map) = run(&book, &settings, &renderer);

    // Chapter numbering was fixed against the estimate of 1 TOC page.
    assert_eq!(map.lookup("ch1.xhtml"), Some(2));
    assert_eq!(docs[0].pages, 2);
}

#[test]
fn toc_skipped_when_outline_is_empty() {
    let book = book(vec![chapter("ch1.xhtml", 2)], Vec::new());
    let settings = ConversionSettings {
        toc: true,
        ..ConversionSettings::default()
    };
    let renderer = FakeRenderer::new();
    let (docs, map) = run(&book, &settings, &renderer);

    assert_eq!(docs.len(), 1);
    assert_eq!(map.lookup("ch1.xhtml"), Some(1));
}

// =====================================================================
// Image inlining
// =====================================================================

#[test]
fn referenced_images_reach_the_renderer_as_data_uris() {
    let mut fixture = book(Vec::new(), Vec::new());
    fixture.chapters = vec![Chapter {
        path: "ch1.xhtml".to_string(),
        markup: "<p>[pages=1]</p><img src=\"../images/pic.png\"/>".to_string(),
    }];
    fixture.images = vec![ImageAsset {
        path: "images/pic.png".to_string(),
        mime: "image/png".to_string(),
        data: vec![1, 2, 3],
    }];
    let renderer = FakeRenderer::new();
    run(&fixture, &ConversionSettings::default(), &renderer);

    let html = renderer.rendered_html();
    assert!(html[0].contains("src=\"data:image/png;base64,AQID\""));
    assert!(!html[0].contains("../images/pic.png"));
}

#[test]
fn unresolved_image_reference_is_left_verbatim() {
    let mut fixture = book(Vec::new(), Vec::new());
    fixture.chapters = vec![Chapter {
        path: "ch1.xhtml".to_string(),
        markup: "<p>[pages=1]</p><img src=\"missing.png\"/>".to_string(),
    }];
    let renderer = FakeRenderer::new();
    run(&fixture, &ConversionSettings::default(), &renderer);

    let html = renderer.rendered_html();
    assert!(html[0].contains("src=\"missing.png\""));
}

// =====================================================================
// End-to-end over a real container
// =====================================================================

fn start_stored(
    zip: &mut zip::ZipWriter<std::fs::File>,
    name: &str,
    contents: &[u8],
) -> std::io::Result<()> {
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip.start_file(name, options)?;
    zip.write_all(contents)?;
    Ok(())
}

fn write_minimal_epub(path: &Path) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);

    start_stored(&mut zip, "mimetype", b"application/epub+zip").unwrap();
    start_stored(
        &mut zip,
        "META-INF/container.xml",
        br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#,
    )
    .unwrap();
    start_stored(
        &mut zip,
        "OEBPS/content.opf",
        br#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="bookid" version="2.0">
    <metadata>
        <dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Tiny Book</dc:title>
        <dc:identifier xmlns:dc="http://purl.org/dc/elements/1.1/" id="bookid">tiny-1</dc:identifier>
        <dc:language xmlns:dc="http://purl.org/dc/elements/1.1/">en</dc:language>
    </metadata>
    <manifest>
        <item id="chapter1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
        <item id="chapter2" href="chapter2.xhtml" media-type="application/xhtml+xml"/>
        <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    </manifest>
    <spine toc="ncx">
        <itemref idref="chapter1"/>
        <itemref idref="chapter2"/>
    </spine>
</package>"#,
    )
    .unwrap();
    start_stored(
        &mut zip,
        "OEBPS/toc.ncx",
        br#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
    <head>
        <meta name="dtb:uid" content="tiny-1"/>
        <meta name="dtb:depth" content="1"/>
        <meta name="dtb:totalPageCount" content="0"/>
        <meta name="dtb:maxPageNumber" content="0"/>
    </head>
    <docTitle><text>Tiny Book</text></docTitle>
    <navMap>
        <navPoint id="chapter1" playOrder="1">
            <navLabel><text>First</text></navLabel>
            <content src="chapter1.xhtml"/>
        </navPoint>
        <navPoint id="chapter2" playOrder="2">
            <navLabel><text>Second</text></navLabel>
            <content src="chapter2.xhtml"/>
        </navPoint>
    </navMap>
</ncx>"#,
    )
    .unwrap();
    for (name, heading) in [("chapter1.xhtml", "First"), ("chapter2.xhtml", "Second")] {
        let body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{heading}</title></head>
<body><h1>{heading}</h1><p>Some chapter text.</p></body>
</html>"#
        );
        start_stored(&mut zip, &format!("OEBPS/{name}"), body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn epub_converts_to_valid_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tiny.epub");
    write_minimal_epub(&input);

    let settings = ConversionSettings {
        toc: true,
        toc_numbers: true,
        ..ConversionSettings::default()
    };
    let renderer = FlowRenderer::default();
    let output = convert(&input, &settings, &renderer, &mut NullProgress).unwrap();

    assert_eq!(output, dir.path().join("tiny.pdf"));
    let bytes = std::fs::read(&output).unwrap();
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-");
}

#[test]
fn epub_rendering_records_every_chapter() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tiny.epub");
    write_minimal_epub(&input);

    let book = Book::load(&input).unwrap();
    assert_eq!(book.title, "Tiny Book");
    assert_eq!(book.chapters.len(), 2);
    assert_eq!(book.toc.len(), 2);

    let renderer = FakeRenderer::new();
    let (_docs, map) = run(&book, &ConversionSettings::default(), &renderer);
    assert_eq!(map.lookup("chapter1.xhtml"), Some(1));
    assert_eq!(map.lookup("chapter2.xhtml"), Some(2));
}
