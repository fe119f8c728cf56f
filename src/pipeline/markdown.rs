//! Markdown → HTML fragment conversion.
//!
//! The text goes through `pulldown-cmark` with GFM tables, strikethrough
//! and footnotes enabled. Two directives are expanded in the event stream:
//!
//! * `<!-- PAGEBREAK -->` becomes a page-break `<div>`.
//! * `[[image:<name>]]` is resolved through the injected
//!   [`ImageResolver`] and replaced by an embedded `<img>`.
//!
//! Code blocks and inline code are left verbatim, so a document can show
//! either directive as an example. Every heading gets an `id`: an
//! explicit `{#id}` attribute if present, otherwise a slug of its text.
//! Ids are claimed from an [`AnchorRegistry`] so they stay unique across
//! all documents of one build, which is what the table of contents links
//! against.

use crate::error::BriefingError;
use crate::pipeline::images::ImageResolver;
use once_cell::sync::Lazy;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::collections::HashMap;

/// Manual page-break directive.
pub const PAGE_BREAK_MARKER: &str = "<!-- PAGEBREAK -->";

/// Element substituted for [`PAGE_BREAK_MARKER`].
pub const PAGE_BREAK_HTML: &str =
    r#"<div class="page-break" style="page-break-before: always;"></div>"#;

static RE_IMAGE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[image:([^\]\n]+)\]\]").unwrap());

/// Hands out unique heading ids.
#[derive(Debug, Default, Clone)]
pub struct AnchorRegistry {
    used: HashMap<String, usize>,
}

impl AnchorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `base`, or `base-1`, `base-2`, … if already taken.
    pub fn claim(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "section" } else { base };
        let mut candidate = base.to_string();
        let mut n = self.used.get(base).copied().unwrap_or(0);
        while self.used.contains_key(&candidate) {
            n += 1;
            candidate = format!("{base}-{n}");
        }
        self.used.insert(base.to_string(), n);
        self.used.entry(candidate.clone()).or_insert(0);
        candidate
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

/// Derive an anchor slug from heading text.
///
/// Lowercases, keeps alphanumerics, turns runs of whitespace, `-` and `_`
/// into a single `-`, drops everything else.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options
}

/// Convert one standalone Markdown text with fresh heading ids.
pub fn convert(raw_text: &str, resolver: &dyn ImageResolver) -> Result<String, BriefingError> {
    let mut anchors = AnchorRegistry::new();
    convert_document(raw_text, "<inline>", resolver, &mut anchors)
}

/// Convert one document of a build.
///
/// `source` names the document in error messages. Heading ids are claimed
/// from `anchors`, shared by every document of the build.
///
/// # Errors
/// * [`BriefingError::UnresolvedPlaceholder`] — the resolver returned `None`
/// * any error the resolver itself returns
pub fn convert_document(
    raw_text: &str,
    source: &str,
    resolver: &dyn ImageResolver,
    anchors: &mut AnchorRegistry,
) -> Result<String, BriefingError> {
    let events: Vec<Event<'_>> = Parser::new_ext(raw_text, markdown_options()).collect();
    let mut events = expand_directives(events, source, resolver)?;
    assign_heading_ids(&mut events, anchors);

    let mut out = String::with_capacity(raw_text.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    Ok(out)
}

/// Replace page-break markers in raw HTML and image placeholders in text.
///
/// The parser may split one run of text into several `Text` events (at
/// `[` for instance), so consecutive runs are joined before matching.
fn expand_directives<'a>(
    events: Vec<Event<'a>>,
    source: &str,
    resolver: &dyn ImageResolver,
) -> Result<Vec<Event<'a>>, BriefingError> {
    let mut out = Vec::with_capacity(events.len());
    let mut pending = String::new();
    let mut in_code_block = false;

    for event in events {
        if let (Event::Text(text), false) = (&event, in_code_block) {
            pending.push_str(text);
            continue;
        }
        flush_text(&mut pending, &mut out, source, resolver)?;

        match event {
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
                out.push(event);
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                out.push(event);
            }
            Event::Html(raw) if raw.contains(PAGE_BREAK_MARKER) => {
                out.push(Event::Html(raw.replace(PAGE_BREAK_MARKER, PAGE_BREAK_HTML).into()));
            }
            Event::InlineHtml(raw) if raw.contains(PAGE_BREAK_MARKER) => {
                out.push(Event::InlineHtml(
                    raw.replace(PAGE_BREAK_MARKER, PAGE_BREAK_HTML).into(),
                ));
            }
            other => out.push(other),
        }
    }
    flush_text(&mut pending, &mut out, source, resolver)?;
    Ok(out)
}

fn flush_text<'a>(
    pending: &mut String,
    out: &mut Vec<Event<'a>>,
    source: &str,
    resolver: &dyn ImageResolver,
) -> Result<(), BriefingError> {
    if pending.is_empty() {
        return Ok(());
    }
    let text = std::mem::take(pending);

    let mut last = 0;
    for caps in RE_IMAGE_PLACEHOLDER.captures_iter(&text) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let name = caps[1].trim();
        let image = resolver
            .resolve(name)?
            .ok_or_else(|| BriefingError::UnresolvedPlaceholder {
                name: name.to_string(),
                document: source.to_string(),
            })?;

        if whole.start > last {
            out.push(Event::Text(text[last..whole.start].to_string().into()));
        }
        out.push(Event::InlineHtml(
            format!(
                r#"<img class="embedded-image" alt="{}" src="{}">"#,
                escape_html(name),
                image.to_data_uri()
            )
            .into(),
        ));
        last = whole.end;
    }

    if last == 0 {
        out.push(Event::Text(text.into()));
    } else if last < text.len() {
        out.push(Event::Text(text[last..].to_string().into()));
    }
    Ok(())
}

fn assign_heading_ids(events: &mut [Event<'_>], anchors: &mut AnchorRegistry) {
    let mut i = 0;
    while i < events.len() {
        let explicit = match &events[i] {
            Event::Start(Tag::Heading { id, .. }) => Some(id.as_ref().map(|s| s.to_string())),
            _ => None,
        };

        if let Some(explicit) = explicit {
            let mut heading_text = String::new();
            let mut j = i + 1;
            while j < events.len() && !matches!(events[j], Event::End(TagEnd::Heading(_))) {
                if let Event::Text(t) | Event::Code(t) = &events[j] {
                    heading_text.push_str(t);
                }
                j += 1;
            }

            let claimed = match explicit {
                Some(id) => anchors.claim(&id),
                None => anchors.claim(&slugify(&heading_text)),
            };
            if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
                *id = Some(CowStr::from(claimed));
            }
            i = j;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::images::{MapResolver, RejectResolver};

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Executive Summary"), "executive-summary");
        assert_eq!(slugify("  1. Budget & Costs!  "), "1-budget-costs");
        assert_eq!(slugify("snake_case--title"), "snake-case-title");
        assert_eq!(slugify("Überblick"), "überblick");
        assert_eq!(slugify("!!!"), "section");
    }

    #[test]
    fn anchor_registry_dedupes() {
        let mut anchors = AnchorRegistry::new();
        assert_eq!(anchors.claim("intro"), "intro");
        assert_eq!(anchors.claim("intro"), "intro-1");
        assert_eq!(anchors.claim("intro"), "intro-2");
        assert_eq!(anchors.claim("intro-1"), "intro-1-1");
        assert_eq!(anchors.claim(""), "section");
    }

    #[test]
    fn headings_get_ids() {
        let html = convert("# Executive Summary\n\n## Scope\n", &RejectResolver).unwrap();
        assert!(html.contains(r#"<h1 id="executive-summary">Executive Summary</h1>"#), "{html}");
        assert!(html.contains(r#"<h2 id="scope">Scope</h2>"#), "{html}");
    }

    #[test]
    fn explicit_heading_id_wins() {
        let html = convert("# Annex {#annex-a}\n", &RejectResolver).unwrap();
        assert!(html.contains(r#"id="annex-a""#), "{html}");
    }

    #[test]
    fn ids_unique_across_documents() {
        let mut anchors = AnchorRegistry::new();
        let a = convert_document("# Summary", "a.md", &RejectResolver, &mut anchors).unwrap();
        let b = convert_document("# Summary", "b.md", &RejectResolver, &mut anchors).unwrap();
        assert!(a.contains(r#"id="summary""#));
        assert!(b.contains(r#"id="summary-1""#));
    }

    #[test]
    fn page_break_marker_becomes_block() {
        let html = convert("one\n<!-- PAGEBREAK -->\ntwo", &RejectResolver).unwrap();
        assert!(html.contains(PAGE_BREAK_HTML), "{html}");
        assert!(!html.contains("PAGEBREAK"));
        assert!(html.contains("<p>one</p>"));
        assert!(html.contains("<p>two</p>"));
    }

    #[test]
    fn tables_and_emphasis() {
        let md = "| A | B |\n|---|---|\n| 1 | 2 |\n\n*em* **strong** [link](https://x.test)";
        let html = convert(md, &RejectResolver).unwrap();
        assert!(html.contains("<table>"));
        assert!(html.contains("<em>em</em>"));
        assert!(html.contains("<strong>strong</strong>"));
        assert!(html.contains(r#"<a href="https://x.test">link</a>"#));
    }

    #[test]
    fn image_placeholder_is_embedded() {
        let resolver = MapResolver::new().with_bytes("seal", "image/png", b"abc".to_vec());
        let html = convert("Before [[image:seal]] after", &resolver).unwrap();
        assert!(
            html.contains(r#"<img class="embedded-image" alt="seal" src="data:image/png;base64,YWJj">"#),
            "{html}"
        );
        assert!(!html.contains("[[image:"));
    }

    #[test]
    fn unresolved_placeholder_fails_explicitly() {
        let mut anchors = AnchorRegistry::new();
        let err =
            convert_document("[[image:missing]]", "03-annex.md", &RejectResolver, &mut anchors)
                .unwrap_err();
        match err {
            BriefingError::UnresolvedPlaceholder { name, document } => {
                assert_eq!(name, "missing");
                assert_eq!(document, "03-annex.md");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn directives_in_code_are_left_verbatim() {
        let md = "Use `[[image:seal]]` inline.\n\n```markdown\n[[image:seal]]\n<!-- PAGEBREAK -->\n```\n";
        let html = convert(md, &RejectResolver).unwrap();
        assert!(html.contains("<code>[[image:seal]]</code>"), "{html}");
        assert!(html.contains("[[image:seal]]\n&lt;!-- PAGEBREAK --&gt;"), "{html}");
        assert!(!html.contains(PAGE_BREAK_HTML), "{html}");
        assert!(!html.contains("<img"), "{html}");
    }

    #[test]
    fn placeholder_outside_code_still_resolves() {
        let resolver = MapResolver::new().with_bytes("seal", "image/png", b"abc".to_vec());
        let md = "```\n[[image:seal]]\n```\n\n*Seal:* [[image:seal]]";
        let html = convert(md, &resolver).unwrap();
        assert_eq!(html.matches("<img").count(), 1, "{html}");
        assert!(html.contains("<pre><code>[[image:seal]]\n</code></pre>"), "{html}");
    }

    #[test]
    fn conversion_is_deterministic() {
        let md = "# A\n\ntext\n\n## A\n\n<!-- PAGEBREAK -->\n\n### B";
        assert_eq!(
            convert(md, &RejectResolver).unwrap(),
            convert(md, &RejectResolver).unwrap()
        );
    }
}
