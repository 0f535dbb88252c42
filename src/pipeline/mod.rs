//! Pipeline stages for ingesting images and composing specialty documents.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! add:    input ──▶ strategy (one JPEG) ─┐
//!               └─▶ rasterize (N JPEGs) ─┤
//!                                        ▼
//! regen:                     collect ──▶ layout ──▶ render
//!                           (ordered)   (fit)      (PDF)
//! ```
//!
//! 1. [`input`]     — classify a source path by extension
//! 2. [`strategy`]  — ordered fallback chain producing one JPEG
//! 3. [`tools`]     — locate and run external converters
//! 4. [`rasterize`] — one JPEG per PDF page
//! 5. [`collect`]   — list a specialty's JPEGs in chronological order
//! 6. [`layout`]    — fit one image inside the page margins
//! 7. [`render`]    — assemble pages and write the document atomically

pub mod collect;
pub mod input;
pub mod layout;
pub mod rasterize;
pub mod render;
pub mod strategy;
pub mod tools;
