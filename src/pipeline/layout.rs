//! Page geometry: fit one image inside the page margins, centred.
//!
//! The scale is `min(usable_w / px_w, usable_h / px_h)`, so the image keeps
//! its aspect ratio, touches the margin on its limiting axis and is centred
//! on the full page (not merely inside the margins; with uniform margins the
//! two coincide).

use crate::config::PageGeometry;
use crate::output::PageLayout;

/// Placement of a `pixel_width × pixel_height` image on `page`.
///
/// Returns `None` for a zero-sized image.
pub fn fit_within(pixel_width: u32, pixel_height: u32, page: &PageGeometry) -> Option<PageLayout> {
    if pixel_width == 0 || pixel_height == 0 {
        return None;
    }
    let (pw, ph) = (f64::from(pixel_width), f64::from(pixel_height));
    let scale = (page.usable_width() / pw).min(page.usable_height() / ph);
    let width = pw * scale;
    let height = ph * scale;
    Some(PageLayout {
        x: (page.width_mm - width) / 2.0,
        y: (page.height_mm - height) / 2.0,
        width,
        height,
        scale,
    })
}
