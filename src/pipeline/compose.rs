//! Composition of the single HTML document for one build.
//!
//! ```text
//! <html><body>
//!   header  ─ running header lines (#header)
//!   cover   ─ full-height, page-break-terminated cover block
//!   toc     ─ heading links (h1–h3), or a bare page break when none exist
//!   body    ─ every document in order, each followed by a page break
//!   footer  ─ running footer lines (#footer), `{page}` left for the renderer
//! </body></html>
//! ```
//!
//! The fragment order is fixed. Where the header and footer land on the
//! printed page is decided by the stylesheet, not by their position here.

use crate::config::{BandBlock, CoverBlock, RenderConfig, StyledLine};
use crate::error::BriefingError;
use crate::pipeline::discover::OrderedSet;
use crate::pipeline::images::ImageResolver;
use crate::pipeline::markdown::{self, escape_html, AnchorRegistry};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Inserted after every document and used as the empty-TOC placeholder.
pub const DOCUMENT_BREAK_HTML: &str = r#"<div style="page-break-before: always;"></div>"#;

/// Footer placeholder for the live page number.
pub const PAGE_TOKEN: &str = "{page}";

/// What [`PAGE_TOKEN`] becomes; the stylesheet fills it with `counter(page)`.
pub const PAGE_NUMBER_HTML: &str = r#"<span class="pageNumber"></span>"#;

static RE_TOC_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<h([1-3])\b[^>]*?\bid="([^"]*)"[^>]*>(.*?)</h[1-3]>"#).unwrap()
});

/// A single heading listed in the table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub level: u8,
    pub id: String,
    /// Inner HTML of the heading, already escaped by the converter.
    pub html: String,
}

/// The assembled HTML for one build. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedDocument {
    pub header: String,
    pub cover: String,
    pub toc: String,
    pub body: String,
    pub footer: String,
    pub toc_entries: Vec<TocEntry>,
    pub document_count: usize,
}

impl ComposedDocument {
    /// `header + cover + toc + body + footer`, without a wrapper.
    pub fn fragments(&self) -> String {
        let mut out = String::with_capacity(
            self.header.len()
                + self.cover.len()
                + self.toc.len()
                + self.body.len()
                + self.footer.len(),
        );
        out.push_str(&self.header);
        out.push_str(&self.cover);
        out.push_str(&self.toc);
        out.push_str(&self.body);
        out.push_str(&self.footer);
        out
    }

    /// The composed document in its minimal wrapper.
    pub fn to_html(&self) -> String {
        format!("<html><body>{}</body></html>", self.fragments())
    }

    /// A self-contained UTF-8 page with `css` embedded, for export and for
    /// renderers that read a single HTML stream.
    pub fn to_standalone_html(&self, css: &str, title: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{}\n</style>\n</head>\n<body>{}</body>\n</html>\n",
            escape_html(title),
            css,
            self.fragments()
        )
    }
}

fn line_style(line: &StyledLine) -> String {
    let mut style = format!(
        "font-family: &quot;{}&quot;; font-size: {}pt; text-align: {};",
        escape_html(&line.font_family),
        line.size_pt,
        line.align.as_css()
    );
    if line.bold {
        style.push_str(" font-weight: bold;");
    }
    if line.italic {
        style.push_str(" font-style: italic;");
    }
    style
}

/// The full-height cover block.
pub fn render_cover(cover: &CoverBlock) -> String {
    let lines: String = cover
        .lines
        .iter()
        .map(|line| {
            format!(
                r#"<p class="cover-line" style="{}">{}</p>"#,
                line_style(line),
                escape_html(&line.text)
            )
        })
        .collect();

    format!(
        r#"<div class="cover-container" style="background: {}; padding-top: {}pt; color: white; text-align: center; height: 100vh; page-break-after: always;">{}</div>"#,
        escape_html(&cover.bg_color),
        cover.padding_top,
        lines
    )
}

fn render_band(id: &str, band: &BandBlock, page_token: bool) -> String {
    let mut out = format!(r#"<div id="{id}">"#);
    for line in &band.lines {
        let mut text = escape_html(&line.text);
        if page_token {
            text = text.replace(PAGE_TOKEN, PAGE_NUMBER_HTML);
        }
        out.push_str(&format!(
            r#"<p style="{} color: {};">{}</p>"#,
            line_style(line),
            escape_html(&band.color),
            text
        ));
    }
    out.push_str("</div>");
    out
}

/// Running header and footer. `{page}` is only substituted in the footer.
pub fn render_header_footer(config: &RenderConfig) -> (String, String) {
    (
        render_band("header", &config.header, false),
        render_band("footer", &config.footer, true),
    )
}

/// Headings h1–h3 carrying an id, in document order.
pub fn scan_headings(body_html: &str) -> Vec<TocEntry> {
    RE_TOC_HEADING
        .captures_iter(body_html)
        .map(|caps| TocEntry {
            level: caps[1].parse().unwrap_or(1),
            id: caps[2].to_string(),
            html: caps[3].to_string(),
        })
        .collect()
}

/// Table of contents for `entries`; a bare page break when there are none.
pub fn render_toc(entries: &[TocEntry]) -> String {
    if entries.is_empty() {
        return DOCUMENT_BREAK_HTML.to_string();
    }

    let mut toc = String::from(
        r#"<div id="toc" style="page-break-before: always;"><h1>Table of Contents</h1><ul>"#,
    );
    for entry in entries {
        toc.push_str(&format!(
            r##"<li class="toc-level-{level}" style="margin-left: {indent}em;"><a href="#{id}">{html}</a></li>"##,
            level = entry.level,
            indent = entry.level.saturating_sub(1),
            id = entry.id,
            html = entry.html
        ));
    }
    toc.push_str("</ul></div>");
    toc
}

/// Convert every document in order, each followed by a page break.
pub fn render_body(
    documents: &OrderedSet,
    resolver: &dyn ImageResolver,
    mut on_converted: impl FnMut(usize, &str) -> Result<(), BriefingError>,
) -> Result<String, BriefingError> {
    let mut anchors = AnchorRegistry::new();
    let mut body = String::new();
    for (index, doc) in documents.iter().enumerate() {
        let html = markdown::convert_document(&doc.raw_text, doc.file_name(), resolver, &mut anchors)?;
        debug!("Converted {} ({} bytes HTML)", doc.file_name(), html.len());
        body.push_str(&html);
        body.push_str(DOCUMENT_BREAK_HTML);
        on_converted(index, doc.file_name())?;
    }
    Ok(body)
}

/// Compose the full document from already-converted body HTML.
pub fn compose_body(body: String, document_count: usize, config: &RenderConfig) -> ComposedDocument {
    let cover = render_cover(&config.cover);
    let toc_entries = scan_headings(&body);
    let toc = render_toc(&toc_entries);
    let (header, footer) = render_header_footer(config);
    ComposedDocument {
        header,
        cover,
        toc,
        body,
        footer,
        toc_entries,
        document_count,
    }
}

/// Compose `documents` under `config`.
///
/// # Errors
/// Propagates conversion failures such as
/// [`BriefingError::UnresolvedPlaceholder`].
pub fn compose(
    documents: &OrderedSet,
    config: &RenderConfig,
    resolver: &dyn ImageResolver,
) -> Result<ComposedDocument, BriefingError> {
    let body = render_body(documents, resolver, |_, _| Ok(()))?;
    Ok(compose_body(body, documents.len(), config))
}
