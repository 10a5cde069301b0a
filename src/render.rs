//! The rendering collaborator.
//!
//! The pipeline treats HTML → pages as a black box behind [`PageRenderer`]:
//! give it a self-contained HTML string and a base path, get back a document
//! whose pages can be counted and later concatenated with other documents
//! into one PDF.
//!
//! [`FlowRenderer`] is the built-in implementation: a deliberately naive
//! text-flow layout (block text and data-URI images over fixed A4 pages)
//! that emits PDF bytes via `printpdf`. It understands just enough of the
//! pipeline's injected counter CSS to print continuous footer page numbers.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use log::warn;
use printpdf::*;
use regex::Regex;

use crate::error::ConvertError;

/// An ordered sequence of rendered pages.
pub trait RenderedDocument {
    fn page_count(&self) -> usize;
}

/// The external rendering engine, as seen by the pipeline.
///
/// Render failures are reported as plain messages; the pipeline attaches
/// the failing chapter as context.
pub trait PageRenderer {
    type Doc: RenderedDocument;

    /// Render one self-contained HTML document. `base_dir` is the directory
    /// of the source file, for any references the pipeline did not inline.
    fn render(&self, html: &str, base_dir: &Path) -> Result<Self::Doc, String>;

    /// Concatenate the pages of `docs`, in order, into a single PDF at
    /// `output`.
    fn write_pdf(&self, docs: &[Self::Doc], title: &str, output: &Path)
        -> Result<(), ConvertError>;
}

// ---------------------------------------------------------------------------
// Built-in flow renderer
// ---------------------------------------------------------------------------

/// Vertical space reserved for an inline image, in text lines.
const IMAGE_LINES: usize = 14;

/// A4 text-flow renderer over the builtin Helvetica font.
#[derive(Debug, Clone)]
pub struct FlowRenderer {
    /// Page width in points (default: A4 = 595.28).
    pub page_width_pt: f32,
    /// Page height in points (default: A4 = 841.89).
    pub page_height_pt: f32,
    /// Page margin in points (default: 40).
    pub margin_pt: f32,
    /// Body font size in points.
    pub font_size: f32,
    /// Line height in points.
    pub line_height: f32,
}

impl Default for FlowRenderer {
    fn default() -> Self {
        Self {
            page_width_pt: 595.28,
            page_height_pt: 841.89,
            margin_pt: 40.0,
            font_size: 11.0,
            line_height: 14.0,
        }
    }
}

/// One laid-out page: text lines and images in flow order, plus the logical
/// page number to print in the footer.
#[derive(Debug, Clone)]
struct FlowPage {
    blocks: Vec<FlowBlock>,
    footer: Option<usize>,
}

#[derive(Debug, Clone)]
enum FlowBlock {
    Line(String),
    /// A data-URI image source.
    Image(String),
}

/// A rendered multi-page document produced by [`FlowRenderer`].
#[derive(Debug, Clone)]
pub struct FlowDocument {
    pages: Vec<FlowPage>,
}

impl RenderedDocument for FlowDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }
}

static COUNTER_RESET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"counter-reset:\s*page\s+(\d+)").expect("counter regex"));
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*)</body>").expect("body regex"));
static HEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<head.*?</head>").expect("head regex"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(style|script)[^>]*>.*?</(style|script)>").expect("style regex"));
static IMG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img[^>]*\bsrc\s*=\s*['"]([^'"]+)['"][^>]*>"#).expect("img regex")
});
static BLOCK_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|h[1-6]|div|li|tr|blockquote|section|table|ol|ul)>|<br\s*/?>")
        .expect("block regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));

impl FlowRenderer {
    fn content_width(&self) -> f32 {
        self.page_width_pt - 2.0 * self.margin_pt
    }

    /// Helvetica averages roughly half the em width per glyph; good enough
    /// for a flow layout that never promises typographic fidelity.
    fn columns(&self) -> usize {
        ((self.content_width() / (self.font_size * 0.5)) as usize).max(8)
    }

    fn lines_per_page(&self) -> usize {
        let content_height = self.page_height_pt - 2.0 * self.margin_pt;
        ((content_height / self.line_height) as usize).max(1)
    }

    /// Extract flow content (wrapped text lines and image markers) from the
    /// document body.
    fn flow_blocks(&self, html: &str) -> Vec<FlowBlock> {
        let body = match BODY_RE.captures(html) {
            Some(caps) => caps[1].to_string(),
            None => HEAD_RE.replace(html, "").into_owned(),
        };
        let body = STYLE_RE.replace_all(&body, "");

        // Keep images in flow order by replacing each <img> with a marker
        // line before stripping tags.
        let mut image_srcs = Vec::new();
        let body = IMG_RE.replace_all(&body, |caps: &regex::Captures| {
            image_srcs.push(caps[1].to_string());
            format!("\n\u{0}IMG{}\u{0}\n", image_srcs.len() - 1)
        });

        let body = BLOCK_END_RE.replace_all(&body, "\n");
        let text = TAG_RE.replace_all(&body, "");
        let text = decode_entities(&text);

        let columns = self.columns();
        let mut blocks = Vec::new();
        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(idx) = parse_image_marker(line) {
                if let Some(src) = image_srcs.get(idx) {
                    blocks.push(FlowBlock::Image(src.clone()));
                }
                continue;
            }
            for wrapped in wrap_line(line, columns) {
                blocks.push(FlowBlock::Line(wrapped));
            }
        }
        blocks
    }

    /// Split flow blocks into pages and assign footer numbers.
    fn paginate(&self, blocks: Vec<FlowBlock>, counter_start: Option<usize>) -> Vec<FlowPage> {
        let lines_per_page = self.lines_per_page();
        let mut pages: Vec<Vec<FlowBlock>> = vec![Vec::new()];
        let mut used = 0usize;

        for block in blocks {
            let cost = match &block {
                FlowBlock::Line(_) => 1,
                FlowBlock::Image(_) => IMAGE_LINES,
            };
            if used + cost > lines_per_page && used > 0 {
                pages.push(Vec::new());
                used = 0;
            }
            used += cost.min(lines_per_page);
            pages.last_mut().expect("page").push(block);
        }

        pages
            .into_iter()
            .enumerate()
            .map(|(i, blocks)| FlowPage {
                blocks,
                footer: counter_start.map(|start| start + 1 + i),
            })
            .collect()
    }
}

impl PageRenderer for FlowRenderer {
    type Doc = FlowDocument;

    fn render(&self, html: &str, _base_dir: &Path) -> Result<FlowDocument, String> {
        // Footer numbering is driven entirely by the injected CSS: a page
        // counter in the footer plus a body-level counter reset.
        let counter_start = if html.contains("counter(page)") {
            Some(
                COUNTER_RESET_RE
                    .captures(html)
                    .and_then(|caps| caps[1].parse::<usize>().ok())
                    .unwrap_or(0),
            )
        } else {
            None
        };

        let blocks = self.flow_blocks(html);
        let pages = self.paginate(blocks, counter_start);
        Ok(FlowDocument { pages })
    }

    fn write_pdf(
        &self,
        docs: &[FlowDocument],
        title: &str,
        output: &Path,
    ) -> Result<(), ConvertError> {
        let bytes = self.pdf_bytes(docs, title);

        // Stage the bytes next to the destination and rename into place so a
        // failed write never leaves a truncated PDF behind.
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let write_err = |source: std::io::Error| ConvertError::OutputWrite {
            path: output.to_path_buf(),
            source,
        };
        let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        staged.write_all(&bytes).map_err(write_err)?;
        staged.persist(output).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl FlowRenderer {
    fn pdf_bytes(&self, docs: &[FlowDocument], title: &str) -> Vec<u8> {
        let page_w = Mm(self.page_width_pt * 0.352778); // pt → mm
        let page_h = Mm(self.page_height_pt * 0.352778);

        let mut doc = PdfDocument::new(title);

        // Register every referenced data-URI image once.
        let mut resources: HashMap<&str, ImageResource> = HashMap::new();
        let mut img_warnings: Vec<PdfWarnMsg> = Vec::new();
        for page in docs.iter().flat_map(|d| &d.pages) {
            for block in &page.blocks {
                let FlowBlock::Image(src) = block else { continue };
                if resources.contains_key(src.as_str()) {
                    continue;
                }
                match load_image_resource(src, &mut doc, &mut img_warnings) {
                    Some(res) => {
                        resources.insert(src.as_str(), res);
                    }
                    None => warn!("skipping unrenderable image reference"),
                }
            }
        }

        let mut pages = Vec::new();
        for flow_page in docs.iter().flat_map(|d| &d.pages) {
            pages.push(PdfPage::new(
                page_w,
                page_h,
                self.page_ops(flow_page, &resources),
            ));
        }
        if pages.is_empty() {
            pages.push(PdfPage::new(page_w, page_h, Vec::new()));
        }

        doc.with_pages(pages);
        doc.save(&PdfSaveOptions::default(), &mut Vec::new())
    }

    fn page_ops(&self, page: &FlowPage, resources: &HashMap<&str, ImageResource>) -> Vec<Op> {
        let mut ops = Vec::new();
        // PDF origin is bottom-left; flow layout tracks y from the top.
        let mut y_top = self.margin_pt;

        for block in &page.blocks {
            match block {
                FlowBlock::Line(text) => {
                    let baseline = self.page_height_pt - y_top - self.font_size * 0.75;
                    push_text_ops(&mut ops, text, self.margin_pt, baseline, self.font_size);
                    y_top += self.line_height;
                }
                FlowBlock::Image(src) => {
                    let block_height = IMAGE_LINES as f32 * self.line_height;
                    if let Some(res) = resources.get(src.as_str()) {
                        let scale = (self.content_width() / res.px_width.max(1) as f32)
                            .min(block_height / res.px_height.max(1) as f32)
                            .min(1.0);
                        let img_h = res.px_height as f32 * scale;
                        let bottom = self.page_height_pt - y_top - img_h;
                        ops.push(Op::UseXobject {
                            id: res.xobj_id.clone(),
                            transform: XObjectTransform {
                                translate_x: Some(Pt(self.margin_pt)),
                                translate_y: Some(Pt(bottom)),
                                dpi: Some(72.0),
                                scale_x: Some(scale),
                                scale_y: Some(scale),
                                rotate: None,
                            },
                        });
                    }
                    y_top += block_height;
                }
            }
        }

        if let Some(number) = page.footer {
            let text = number.to_string();
            let x = self.page_width_pt / 2.0 - text.len() as f32 * self.font_size * 0.25;
            push_text_ops(&mut ops, &text, x, self.margin_pt * 0.5, self.font_size);
        }

        ops
    }
}

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

fn load_image_resource(
    src: &str,
    doc: &mut PdfDocument,
    img_warnings: &mut Vec<PdfWarnMsg>,
) -> Option<ImageResource> {
    let bytes = match parse_data_uri(src) {
        Ok(b) => b,
        Err(e) => {
            warn!("skipping image — {e}");
            return None;
        }
    };

    // Decode with the `image` crate to obtain pixel dimensions.
    let dyn_img = match ::image::load_from_memory(&bytes) {
        Ok(img) => img,
        Err(e) => {
            warn!("skipping image — decode error: {e}");
            return None;
        }
    };

    let raw = match RawImage::decode_from_bytes(&bytes, img_warnings) {
        Ok(r) => r,
        Err(e) => {
            warn!("skipping image — PDF encode error: {e}");
            return None;
        }
    };

    Some(ImageResource {
        xobj_id: doc.add_image(&raw),
        px_width: dyn_img.width(),
        px_height: dyn_img.height(),
    })
}

fn push_text_ops(ops: &mut Vec<Op>, text: &str, x: f32, y: f32, font_size: f32) {
    let font = BuiltinFont::Helvetica;
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(font_size),
        font,
    });
    ops.push(Op::SetFillColor {
        col: Color::Rgb(Rgb {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            icc_profile: None,
        }),
    });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(to_winlatin(text))],
        font,
    });
    ops.push(Op::EndTextSection);
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| "image src is not a data URI".to_string())?;
    let comma = rest
        .find(',')
        .ok_or_else(|| "invalid data URI: missing `,` separator".to_string())?;
    if !rest[..comma].contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(rest[comma + 1..].trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

/// Map UTF-8 text to raw Windows-1252 bytes wrapped in a String, so printpdf
/// writes them unchanged into the PDF stream (builtin fonts use
/// WinAnsiEncoding: one byte per glyph, 0x00–0xFF).
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80, // euro
            '\u{2026}' => 0x85, // ellipsis
            '\u{2018}' => 0x91, // left single quote
            '\u{2019}' => 0x92, // right single quote
            '\u{201C}' => 0x93, // left double quote
            '\u{201D}' => 0x94, // right double quote
            '\u{2022}' => 0x95, // bullet
            '\u{2013}' => 0x96, // en-dash
            '\u{2014}' => 0x97, // em-dash
            '\u{00A0}' => 0x20, // non-breaking space -> space
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: intentionally non-UTF-8 for the 0x80-0x9F range; printpdf
    // passes these bytes straight through, decoded by WinAnsiEncoding.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

fn parse_image_marker(line: &str) -> Option<usize> {
    line.strip_prefix("\u{0}IMG")?
        .strip_suffix('\u{0}')?
        .parse()
        .ok()
}

fn wrap_line(line: &str, columns: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > columns {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        // A single over-long word is hard-broken at the column limit.
        if current.is_empty() && word.chars().count() > columns {
            let mut rest: Vec<char> = word.chars().collect();
            while rest.len() > columns {
                out.push(rest.drain(..columns).collect());
            }
            current = rest.into_iter().collect();
            continue;
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{00A0}")
}
