//! Stylesheet resolution: merge configuration values into the base template.
//!
//! The template carries literal tokens that are replaced verbatim, every
//! occurrence:
//!
//! | Token | Replaced with |
//! |-------|---------------|
//! | `margin-top: 20pt;` | header height + 20 |
//! | `margin-bottom: 20pt;` | footer height + 20 |
//! | `background: #0b2545;` | cover background colour |
//! | `padding-top: 180pt;` | cover top padding |
//! | `content: "";` | classification marking (only when non-empty) |
//!
//! With an empty classification the whole banner block between
//! [`BANNER_BEGIN`] and [`BANNER_END`] is cut out, so neither the banner nor
//! the page space reserved for it survives. If either sentinel is missing
//! the template is left as it is.

use crate::config::RenderConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// The bundled print stylesheet template.
pub const BASE_STYLESHEET: &str = include_str!("../../assets/styles.css");

pub const BANNER_BEGIN: &str = "/* BEGIN classification-banner */";
pub const BANNER_END: &str = "/* END classification-banner */";

pub const HEADER_MARGIN_TOKEN: &str = "margin-top: 20pt;";
pub const FOOTER_MARGIN_TOKEN: &str = "margin-bottom: 20pt;";
pub const COVER_BG_TOKEN: &str = "background: #0b2545;";
pub const COVER_PADDING_TOKEN: &str = "padding-top: 180pt;";
pub const BANNER_CONTENT_TOKEN: &str = "content: \"\";";

/// Added to the configured header/footer height to get the page margin.
pub const BAND_MARGIN_OFFSET_PT: f32 = 20.0;

static RE_BANNER_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?s){}.*?{}[ \t]*\n?",
        regex::escape(BANNER_BEGIN),
        regex::escape(BANNER_END)
    ))
    .unwrap()
});

/// Resolve `template` against `config`.
pub fn resolve_styles(template: &str, config: &RenderConfig) -> String {
    let header_margin = config.header.height + BAND_MARGIN_OFFSET_PT;
    let footer_margin = config.footer.height + BAND_MARGIN_OFFSET_PT;

    let css = template
        .replace(HEADER_MARGIN_TOKEN, &format!("margin-top: {header_margin}pt;"))
        .replace(FOOTER_MARGIN_TOKEN, &format!("margin-bottom: {footer_margin}pt;"))
        .replace(COVER_BG_TOKEN, &format!("background: {};", config.cover.bg_color))
        .replace(
            COVER_PADDING_TOKEN,
            &format!("padding-top: {}pt;", config.cover.padding_top),
        );

    if config.classification.is_empty() {
        excise_banner(&css)
    } else {
        css.replace(
            BANNER_CONTENT_TOKEN,
            &format!("content: \"{}\";", escape_css_string(&config.classification)),
        )
    }
}

/// Resolve the bundled [`BASE_STYLESHEET`].
pub fn resolve_default_styles(config: &RenderConfig) -> String {
    resolve_styles(BASE_STYLESHEET, config)
}

/// Remove the classification banner block, sentinels included.
pub fn excise_banner(css: &str) -> String {
    if !RE_BANNER_BLOCK.is_match(css) {
        debug!("Classification banner sentinels not found; stylesheet left intact");
        return css.to_string();
    }
    RE_BANNER_BLOCK.replace_all(css, "").into_owned()
}

/// Escape text for a double-quoted CSS string.
///
/// Quotes and backslashes are escaped so the string cannot terminate early,
/// and `<`, `>`, `&` become hex escapes so the stylesheet stays inert when
/// embedded in a `<style>` element. The rendered characters are unchanged.
pub fn escape_css_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\22 "),
            '\\' => out.push_str("\\5C "),
            '<' => out.push_str("\\3C "),
            '>' => out.push_str("\\3E "),
            '&' => out.push_str("\\26 "),
            '\n' => out.push_str("\\A "),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
