//! Progress-callback trait for per-page layout events.
//!
//! Inject an [`Arc<dyn LayoutProgressCallback>`] via
//! [`crate::config::PdfMedConfigBuilder::progress_callback`] to receive events
//! while a specialty's document is being assembled. The binary drives an
//! `indicatif` bar from it; library users can forward the events anywhere.
//!
//! # Example
//!
//! ```rust
//! use pdfmed::{LayoutProgressCallback, PdfMedConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     placed: Arc<AtomicUsize>,
//! }
//!
//! impl LayoutProgressCallback for CountingCallback {
//!     fn on_page_placed(&self, index: usize, total: usize, name: &str) {
//!         self.placed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {}", index, total, name);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     placed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = PdfMedConfig::builder()
//!     .progress_callback(counter as Arc<dyn LayoutProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the layout engine as it places each artifact.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Generation is single-threaded, but the trait is
/// `Send + Sync` so a callback can be shared with other threads of the host.
pub trait LayoutProgressCallback: Send + Sync {
    /// Called once before the first artifact is examined.
    ///
    /// # Arguments
    /// * `specialty` — slug of the specialty being generated
    /// * `total`     — number of collected artifacts
    fn on_layout_start(&self, specialty: &str, total: usize) {
        let _ = (specialty, total);
    }

    /// Called after an artifact has been placed on its own page.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position in collector order
    /// * `total` — number of collected artifacts
    /// * `name`  — artifact file name
    fn on_page_placed(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when an artifact is skipped with a warning.
    fn on_item_skipped(&self, index: usize, total: usize, warning: &str) {
        let _ = (index, total, warning);
    }

    /// Called once after the document has been written.
    ///
    /// # Arguments
    /// * `total` — number of collected artifacts
    /// * `pages` — pages actually written
    fn on_layout_complete(&self, total: usize, pages: usize) {
        let _ = (total, pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl LayoutProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PdfMedConfig`].
pub type ProgressCallback = Arc<dyn LayoutProgressCallback>;
