//! # inkbind – EPUB / plain-text → paginated PDF converter
//!
//! This crate converts e-books into self-contained PDF files with continuous
//! page numbering and an optional generated table of contents. The pipeline
//! stages are:
//!
//! 1. **Load** – open the container and extract chapters, images, styles,
//!    and the navigation outline ([`book`])
//! 2. **Inline** – embed every referenced image as a `data:` URI so each
//!    chapter is a self-contained document ([`assets`])
//! 3. **Compose** – wrap chapter markup with the book styles and the
//!    page-numbering CSS ([`compose`])
//! 4. **Paginate** – render chapters one by one, tracking cumulative page
//!    counts and each chapter's starting page ([`pagination`], [`render`])
//! 5. **Assemble** – estimate, then finalize, the table of contents and
//!    merge everything into one PDF ([`toc`], [`pipeline`])
//!
//! Long-running conversions can be pushed onto a background thread via
//! [`job`].

pub mod assets;
pub mod book;
pub mod compose;
pub mod error;
pub mod job;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod settings;
pub mod toc;

// Re-exports for convenience
pub use error::ConvertError;
pub use job::JobEvent;
pub use pipeline::{convert, NullProgress, ProgressSink};
pub use render::{FlowRenderer, PageRenderer, RenderedDocument};
pub use settings::ConversionSettings;
