//! Pipeline stages for Markdown-to-PDF assembly.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested alone and the rendering backend can change without touching the
//! rest.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ markdown ──▶ compose ──▶ style ──▶ render
//! (folder)     (HTML)       (one doc)   (CSS)     (PDF + hash)
//!                 ▲
//!              images
//! ```
//!
//! 1. [`discover`] — scan the input folder and fix the build order
//! 2. [`markdown`] — convert each document, resolving `[[image:…]]` through
//!    [`images`] and expanding page-break markers
//! 3. [`compose`]  — wrap header, cover, table of contents, body and footer
//!    into one HTML document
//! 4. [`style`]    — merge configuration values into the print stylesheet
//! 5. [`render`]   — drive the primary engine with one fallback attempt;
//!    runs in `spawn_blocking` because both engines are external processes

pub mod compose;
pub mod discover;
pub mod images;
pub mod markdown;
pub mod render;
pub mod style;
