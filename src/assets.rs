//! Image resolution and inlining.
//!
//! Chapter markup and stylesheets reference images by relative (often
//! percent-encoded) paths that mean nothing once a chapter is rendered as a
//! standalone document. This module builds an index of every embedded image
//! and rewrites each resolvable reference into a `data:` URI; anything it
//! cannot resolve is left exactly as it was.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use log::info;
use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};

/// One embedded image: normalized container path, declared media type, raw
/// bytes.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub path: String,
    pub mime: String,
    pub data: Vec<u8>,
}

/// Immutable lookup table from normalized asset path to image content.
///
/// Built once per conversion job. At most one entry per normalized path;
/// the last asset seen for a path wins.
#[derive(Debug, Default)]
pub struct ImageIndex {
    by_path: BTreeMap<String, ImageAsset>,
}

impl ImageIndex {
    pub fn build(assets: Vec<ImageAsset>) -> Self {
        let mut by_path = BTreeMap::new();
        for mut asset in assets {
            asset.path = asset.path.replace('\\', "/");
            by_path.insert(asset.path.clone(), asset);
        }
        Self { by_path }
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Resolve a reference from an `src`/`href`/`xlink:href` attribute or a
    /// CSS `url(...)` value into a data URI.
    ///
    /// Returns `None` for empty references, references that already are data
    /// URIs, and references with no matching index entry — callers must then
    /// leave the original reference untouched.
    ///
    /// Lookup order: exact match on the normalized path, then filename-only
    /// fallback. When several index entries share the target filename, the
    /// first one in lexicographic path order wins.
    pub fn resolve(&self, reference: &str) -> Option<String> {
        if reference.is_empty() || reference.starts_with("data:") {
            return None;
        }

        let decoded = percent_decode_str(reference).decode_utf8_lossy();
        let mut target = decoded.replace('\\', "/");
        if let Some(rest) = target.strip_prefix("file:///") {
            target = rest.to_string();
        }
        // A CSS url() or href may carry a query / fragment suffix.
        if let Some(pos) = target.find(['?', '#']) {
            target.truncate(pos);
        }
        // Peel relative-path prefixes so e.g. "../Images/a.jpg" can match
        // the manifest entry "Images/a.jpg" exactly.
        let mut exact = target.as_str();
        while let Some(rest) = exact.strip_prefix("../").or_else(|| exact.strip_prefix("./")) {
            exact = rest;
        }

        if let Some(asset) = self.by_path.get(exact) {
            return Some(data_uri(asset));
        }

        let filename = final_segment(&target)?;
        self.by_path
            .values()
            .find(|asset| final_segment(&asset.path) == Some(filename))
            .map(data_uri)
    }
}

fn data_uri(asset: &ImageAsset) -> String {
    format!(
        "data:{};base64,{}",
        asset.mime,
        BASE64_STD.encode(&asset.data)
    )
}

fn final_segment(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    if segment.is_empty() {
        None
    } else {
        Some(segment)
    }
}

// `src=...`, `href=...`, `xlink:href=...` with either quote style.
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(src|href|xlink:href)\s*=\s*(['"])([^'"]*)(['"])"#).expect("attr regex")
});

// CSS url(...) values, optionally quoted.
static CSS_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)url\(([^)]+)\)").expect("css url regex"));

/// Rewrite every resolvable `src`/`href`/`xlink:href` attribute value and
/// CSS `url(...)` value in chapter markup into a data URI. Everything else
/// is returned byte-for-byte.
pub fn inline_markup(markup: &str, index: &ImageIndex) -> String {
    let rewritten = ATTR_RE.replace_all(markup, |caps: &Captures| {
        let (attr, quote, value) = (&caps[1], &caps[2], &caps[3]);
        match index.resolve(value) {
            Some(uri) => {
                info!("embedding image for '{value}'");
                format!("{attr}={quote}{uri}{quote}")
            }
            None => caps[0].to_string(),
        }
    });
    inline_css(&rewritten, index)
}

/// Rewrite resolvable CSS `url(...)` values into data URIs. Used for the
/// shared stylesheet (attributes do not apply there) and for `<style>`
/// blocks inside chapter markup.
pub fn inline_css(css: &str, index: &ImageIndex) -> String {
    CSS_URL_RE
        .replace_all(css, |caps: &Captures| {
            let value = caps[1].trim().trim_matches(['"', '\'']).trim();
            match index.resolve(value) {
                Some(uri) => {
                    info!("embedding CSS image for '{value}'");
                    format!("url(\"{uri}\")")
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> ImageIndex {
        ImageIndex::build(vec![
            ImageAsset {
                path: "images/cover.jpg".to_string(),
                mime: "image/jpeg".to_string(),
                data: b"JPEGDATA".to_vec(),
            },
            ImageAsset {
                path: "images/fig 1.png".to_string(),
                mime: "image/png".to_string(),
                data: b"PNGDATA".to_vec(),
            },
        ])
    }

    fn expected_uri(mime: &str, data: &[u8]) -> String {
        format!("data:{mime};base64,{}", BASE64_STD.encode(data))
    }

    #[test]
    fn exact_match() {
        let uri = index().resolve("images/cover.jpg").unwrap();
        assert_eq!(uri, expected_uri("image/jpeg", b"JPEGDATA"));
    }

    #[test]
    fn percent_encoded_reference() {
        let uri = index().resolve("images/fig%201.png").unwrap();
        assert_eq!(uri, expected_uri("image/png", b"PNGDATA"));
    }

    #[test]
    fn file_prefix_and_backslashes() {
        let idx = index();
        assert!(idx.resolve(r"file:///images/cover.jpg").is_some());
        assert!(idx.resolve(r"images\cover.jpg").is_some());
    }

    #[test]
    fn relative_prefix_matches_exactly() {
        assert!(index().resolve("../images/cover.jpg").is_some());
        assert!(index().resolve("./images/cover.jpg").is_some());
    }

    #[test]
    fn case_mismatch_falls_back_to_filename() {
        // "Images/cover.jpg" has no exact entry (paths are case-sensitive)
        // but the filename matches.
        let uri = index().resolve("Images/cover.jpg").unwrap();
        assert_eq!(uri, expected_uri("image/jpeg", b"JPEGDATA"));
    }

    #[test]
    fn unresolvable_references() {
        let idx = index();
        assert!(idx.resolve("").is_none());
        assert!(idx.resolve("data:image/png;base64,AAAA").is_none());
        assert!(idx.resolve("images/missing.gif").is_none());
    }

    #[test]
    fn duplicate_paths_last_seen_wins() {
        let idx = ImageIndex::build(vec![
            ImageAsset {
                path: "a.png".to_string(),
                mime: "image/png".to_string(),
                data: b"OLD".to_vec(),
            },
            ImageAsset {
                path: "a.png".to_string(),
                mime: "image/png".to_string(),
                data: b"NEW".to_vec(),
            },
        ]);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.resolve("a.png").unwrap(), expected_uri("image/png", b"NEW"));
    }

    #[test]
    fn inline_rewrites_attributes_case_insensitively() {
        let idx = index();
        let markup = r#"<img SRC="images/cover.jpg"/> <image xlink:href='images/cover.jpg'/>"#;
        let out = inline_markup(markup, &idx);
        assert!(!out.contains("images/cover.jpg"));
        assert_eq!(out.matches("data:image/jpeg;base64,").count(), 2);
    }

    #[test]
    fn inline_leaves_unresolved_references_verbatim() {
        let idx = index();
        let markup = r#"<a href="chapter2.xhtml">next</a> <img src="gone.png"/>"#;
        let out = inline_markup(markup, &idx);
        assert_eq!(out, markup);
    }

    #[test]
    fn inline_css_urls() {
        let idx = index();
        let css = r#"body { background: url('images/cover.jpg'); } p { color: red; }"#;
        let out = inline_css(css, &idx);
        assert!(out.contains("url(\"data:image/jpeg;base64,"));
        assert!(out.contains("color: red"));
        // Unresolvable url stays put.
        let css2 = "h1 { background: url(missing.png); }";
        assert_eq!(inline_css(css2, &idx), css2);
    }

    #[test]
    fn inline_does_not_touch_other_markup() {
        let idx = index();
        let markup = "<p class=\"intro\">Hello &amp; welcome</p>";
        assert_eq!(inline_markup(markup, &idx), markup);
    }
}
