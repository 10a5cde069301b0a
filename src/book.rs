//! Book loading – wraps the `epub` crate and extracts everything the
//! pipeline needs into plain data.
//!
//! The zip reader is touched exactly once, here. Downstream stages (and the
//! tests) only ever see [`Book`]: chapters in render order, image assets,
//! the concatenated stylesheet, and the navigation tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use epub::doc::{EpubDoc, NavPoint};
use log::{info, warn};

use crate::assets::ImageAsset;
use crate::error::ConvertError;

/// Classification of a manifest item, derived from its declared media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Image,
    Stylesheet,
    Document,
    Other,
}

impl ItemKind {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim();
        if mime.starts_with("image/") {
            ItemKind::Image
        } else if mime.eq_ignore_ascii_case("text/css") {
            ItemKind::Stylesheet
        } else if mime.eq_ignore_ascii_case("application/xhtml+xml")
            || mime.eq_ignore_ascii_case("text/html")
        {
            ItemKind::Document
        } else {
            ItemKind::Other
        }
    }
}

/// One content document, identified by its manifest path.
#[derive(Debug, Clone)]
pub struct Chapter {
    /// Forward-slash-normalized path inside the container.
    pub path: String,
    pub markup: String,
}

/// One node of the book's navigation outline. A leaf is simply a node with
/// no children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocNode {
    pub title: String,
    /// Target path, possibly carrying a `#fragment` suffix.
    pub href: String,
    pub children: Vec<TocNode>,
}

impl TocNode {
    /// The href with any fragment suffix stripped — the key used for page
    /// lookups.
    pub fn page_key(&self) -> &str {
        match self.href.find('#') {
            Some(pos) => &self.href[..pos],
            None => &self.href,
        }
    }
}

/// Everything extracted from one e-book, in memory.
#[derive(Debug, Clone, Default)]
pub struct Book {
    /// The file this book was loaded from.
    pub source: PathBuf,
    /// Document title (EPUB metadata title, or the file stem).
    pub title: String,
    /// Directory of the source file, used as the renderer base path.
    pub base_dir: PathBuf,
    /// Documents in render order: spine order first, then any document-type
    /// manifest items missing from the spine (sorted by path — the manifest
    /// map is unordered, and render order must be stable across runs).
    pub chapters: Vec<Chapter>,
    /// Every manifest item classified as an image.
    pub images: Vec<ImageAsset>,
    /// All stylesheet items, concatenated in path order.
    pub stylesheet: String,
    /// Navigation outline.
    pub toc: Vec<TocNode>,
}

impl Book {
    /// Open an EPUB file and extract its contents.
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let mut doc = EpubDoc::new(path).map_err(|e| ConvertError::MalformedBook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let title = doc
            .mdata("title")
            .map(|item| item.value.clone())
            .unwrap_or_else(|| file_stem(path))
            .trim()
            .to_string();
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        // Classify the whole manifest up front.
        let mut image_ids = Vec::new();
        let mut style_ids = Vec::new();
        let mut document_ids = Vec::new();
        for (id, res) in &doc.resources {
            let item_path = normalize_path(&res.path);
            match ItemKind::from_mime(&res.mime) {
                ItemKind::Image => image_ids.push((id.clone(), item_path)),
                ItemKind::Stylesheet => style_ids.push((id.clone(), item_path)),
                ItemKind::Document => document_ids.push((id.clone(), item_path)),
                ItemKind::Other => {}
            }
        }
        image_ids.sort_by(|a, b| a.1.cmp(&b.1));
        style_ids.sort_by(|a, b| a.1.cmp(&b.1));
        document_ids.sort_by(|a, b| a.1.cmp(&b.1));

        let mut images = Vec::with_capacity(image_ids.len());
        for (id, item_path) in image_ids {
            match doc.get_resource(&id) {
                Some((data, mime)) => images.push(ImageAsset {
                    path: item_path,
                    mime,
                    data,
                }),
                None => warn!("could not read image resource '{item_path}'"),
            }
        }
        info!("found {} images in the manifest", images.len());

        let mut stylesheet = String::new();
        for (id, item_path) in style_ids {
            match doc.get_resource_str(&id) {
                Some((css, _mime)) => {
                    stylesheet.push_str(&css);
                    stylesheet.push('\n');
                }
                None => warn!("could not read stylesheet '{item_path}'"),
            }
        }

        // Spine order, then leftover documents.
        let spine_ids: Vec<String> = doc.spine.iter().map(|item| item.idref.clone()).collect();
        let in_spine: HashSet<&str> = spine_ids.iter().map(String::as_str).collect();

        let mut chapters = Vec::new();
        for id in &spine_ids {
            if let Some(chapter) = read_document(&mut doc, id) {
                chapters.push(chapter);
            } else {
                warn!("spine item '{id}' has no readable document; skipping");
            }
        }
        for (id, item_path) in &document_ids {
            if in_spine.contains(id.as_str()) {
                continue;
            }
            if let Some(chapter) = read_document(&mut doc, id) {
                info!("appending non-spine document '{item_path}'");
                chapters.push(chapter);
            }
        }

        let toc = doc.toc.iter().map(toc_node).collect();

        Ok(Book {
            source: path.to_path_buf(),
            title,
            base_dir,
            chapters,
            images,
            stylesheet,
            toc,
        })
    }
}

fn read_document<R: std::io::Read + std::io::Seek>(
    doc: &mut EpubDoc<R>,
    id: &str,
) -> Option<Chapter> {
    let path = normalize_path(&doc.resources.get(id)?.path);
    let (markup, _mime) = doc.get_resource_str(id)?;
    Some(Chapter { path, markup })
}

fn toc_node(nav: &NavPoint) -> TocNode {
    TocNode {
        title: nav.label.trim().to_string(),
        href: normalize_path(&nav.content),
        children: nav.children.iter().map(toc_node).collect(),
    }
}

/// Container paths always use forward slashes, whatever the host OS thinks.
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("book")
        .to_string()
}
