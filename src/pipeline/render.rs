//! Document assembly: one page per artifact, written atomically.
//!
//! ## Why pass JPEG bytes through?
//!
//! Every artifact is already a JPEG. Embedding the file as a `DCTDecode`
//! image XObject keeps the document byte-for-byte faithful to what was
//! ingested and avoids a lossy decode/encode round trip per page. Only the
//! frame header is parsed, for the pixel size and component count the
//! XObject dictionary needs. A file that carries a `.jpg` name but is not a
//! JPEG is decoded and re-encoded at the configured quality instead.
//!
//! ## Why temp file + rename?
//!
//! Regeneration overwrites `pdf/<slug>/<slug>.pdf`. Writing in place would
//! leave a truncated document behind if anything fails halfway; persisting a
//! sibling temp file replaces the old document only once the new one is
//! complete.

use crate::config::{PageGeometry, PdfMedConfig};
use crate::error::{ItemWarning, PdfMedError};
use crate::output::{GeneratedPdf, ImageArtifact, PageLayout};
use crate::pipeline::layout::fit_within;
use crate::pipeline::strategy::encode_jpeg;
use image::ImageReader;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info, warn};

/// PostScript points per millimetre.
const PT_PER_MM: f64 = 72.0 / 25.4;

/// Read an image's pixel size from its header without decoding pixels.
pub fn probe_dimensions(path: &Path) -> Result<(u32, u32), PdfMedError> {
    ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| PdfMedError::io(path, e))?
        .into_dimensions()
        .map_err(|e| PdfMedError::ImageDecode {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}

// ── JPEG embedding ───────────────────────────────────────────────────────

/// Frame header facts needed by a `DCTDecode` image XObject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JpegFrame {
    width: u32,
    height: u32,
    components: u8,
    /// An Adobe APP14 segment was present (CMYK data is stored inverted).
    adobe: bool,
}

/// Walk the marker segments up to the first start-of-frame.
fn jpeg_frame(bytes: &[u8]) -> Option<JpegFrame> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut adobe = false;
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        // Fill bytes and standalone markers carry no length.
        if marker == 0xFF {
            i += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            i += 2;
            continue;
        }
        let len = usize::from(u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]));
        if len < 2 {
            return None;
        }
        let segment = bytes.get(i + 4..i + 2 + len)?;
        match marker {
            0xEE if segment.starts_with(b"Adobe") => adobe = true,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                if segment.len() < 6 {
                    return None;
                }
                return Some(JpegFrame {
                    height: u32::from(u16::from_be_bytes([segment[1], segment[2]])),
                    width: u32::from(u16::from_be_bytes([segment[3], segment[4]])),
                    components: segment[5],
                    adobe,
                });
            }
            0xDA | 0xD9 => return None,
            _ => {}
        }
        i += 2 + len;
    }
    None
}

/// JPEG bytes ready to be placed as an image XObject.
#[derive(Debug, Clone)]
pub struct EmbeddedJpeg {
    bytes: Vec<u8>,
    frame: JpegFrame,
}

impl EmbeddedJpeg {
    /// Load `path` for embedding, re-encoding at `quality` when the file is
    /// not a JPEG the PDF reader can decode directly.
    pub fn load(path: &Path, quality: u8) -> Result<Self, PdfMedError> {
        let bytes = fs::read(path).map_err(|e| PdfMedError::io(path, e))?;
        if let Some(frame) = jpeg_frame(&bytes).filter(|f| {
            f.width > 0 && f.height > 0 && matches!(f.components, 1 | 3 | 4)
        }) {
            return Ok(Self { bytes, frame });
        }

        debug!("{} is not a plain JPEG; re-encoding", path.display());
        let img = image::load_from_memory(&bytes).map_err(|e| PdfMedError::ImageDecode {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let bytes = encode_jpeg(&img, quality, path)?;
        let frame = jpeg_frame(&bytes).ok_or_else(|| PdfMedError::ImageEncode {
            path: path.to_path_buf(),
            detail: "encoder produced no frame header".into(),
        })?;
        Ok(Self { bytes, frame })
    }

    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    fn into_xobject(self) -> Stream {
        let color_space = match self.frame.components {
            1 => "DeviceGray",
            4 => "DeviceCMYK",
            _ => "DeviceRGB",
        };
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(i64::from(self.frame.width)));
        dict.set("Height", Object::Integer(i64::from(self.frame.height)));
        dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        if self.frame.components == 4 && self.frame.adobe {
            let decode = [1, 0, 1, 0, 1, 0, 1, 0].map(Object::Integer).to_vec();
            dict.set("Decode", Object::Array(decode));
        }
        Stream::new(dict, self.bytes).with_compression(false)
    }
}

// ── Document composer ────────────────────────────────────────────────────

/// Builds a document page by page.
pub struct PdfComposer {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    page: PageGeometry,
}

impl PdfComposer {
    pub fn new(page: PageGeometry) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            page,
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append a page showing `image` at `layout` (millimetres, top-left origin).
    pub fn add_image_page(
        &mut self,
        image: EmbeddedJpeg,
        layout: &PageLayout,
    ) -> Result<(), PdfMedError> {
        let image_id = self.doc.add_object(image.into_xobject());

        // PDF user space has its origin at the bottom-left corner.
        let x = layout.x * PT_PER_MM;
        let y = (self.page.height_mm - layout.y - layout.height) * PT_PER_MM;
        let w = layout.width * PT_PER_MM;
        let h = layout.height * PT_PER_MM;

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    [w, 0.0, 0.0, h, x, y]
                        .iter()
                        .map(|v| Object::Real(*v as f32))
                        .collect(),
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| PdfMedError::PdfAssembly(e.to_string()))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), encoded));

        let mut xobjects = Dictionary::new();
        xobjects.set("Im0", Object::Reference(image_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            ("MediaBox", self.media_box()),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
        ]);
        let page_id = self.doc.add_object(page);
        self.kids.push(Object::Reference(page_id));
        Ok(())
    }

    fn media_box(&self) -> Object {
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real((self.page.width_mm * PT_PER_MM) as f32),
            Object::Real((self.page.height_mm * PT_PER_MM) as f32),
        ])
    }

    /// Finish the page tree, set the title, and replace `path` atomically.
    pub fn write_atomic(mut self, title: &str, compress: bool, path: &Path) -> Result<(), PdfMedError> {
        let count = self.kids.len() as i64;
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(std::mem::take(&mut self.kids))),
            ("Count", Object::Integer(count)),
            ("MediaBox", self.media_box()),
        ]);
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]));
        let info_id = self.doc.add_object(Dictionary::from_iter(vec![
            ("Title", text_string(title)),
            ("Producer", text_string(concat!("pdfmed ", env!("CARGO_PKG_VERSION")))),
        ]));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.doc.trailer.set("Info", Object::Reference(info_id));

        if compress {
            self.doc.compress();
        }

        let doc = &mut self.doc;
        persist_atomically(path, |file| {
            doc.save_to(file)
                .map_err(|e| PdfMedError::PdfAssembly(format!("Save failed: {e}")))
        })
    }
}

/// Write `path` through a temp file in the same directory, renamed into
/// place only after `write` succeeded and the data was synced. On any error
/// the previous content of `path` is untouched and the temp file is removed.
fn persist_atomically<F>(path: &Path, write: F) -> Result<(), PdfMedError>
where
    F: FnOnce(&mut File) -> Result<(), PdfMedError>,
{
    let write_err = |source: std::io::Error| PdfMedError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".pdfmed-")
        .suffix(".pdf.tmp")
        .tempfile_in(parent)
        .map_err(write_err)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all().map_err(write_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(write_err)?;
    }

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

// ── Generation ───────────────────────────────────────────────────────────

/// Lay out `items` one per page, in the given order, and write the document
/// to `output`.
///
/// Items whose header or bytes cannot be read are skipped with an
/// [`ItemWarning`]; zero surviving items still produce a (page-less)
/// document.
pub fn compose_document(
    specialty: &str,
    items: &[ImageArtifact],
    output: &Path,
    config: &PdfMedConfig,
) -> Result<GeneratedPdf, PdfMedError> {
    let total = items.len();
    let cb = config.progress_callback.as_deref();
    if let Some(cb) = cb {
        cb.on_layout_start(specialty, total);
    }

    let mut composer = PdfComposer::new(config.page);
    let mut warnings = Vec::new();

    for (i, item) in items.iter().enumerate() {
        match place(item, config) {
            Ok((jpeg, layout)) => {
                debug!(
                    "Page {}: {} at ({:.1}, {:.1}) {:.1}×{:.1} mm",
                    composer.page_count() + 1,
                    item.name,
                    layout.x,
                    layout.y,
                    layout.width,
                    layout.height
                );
                composer.add_image_page(jpeg, &layout)?;
                if let Some(cb) = cb {
                    cb.on_page_placed(i + 1, total, &item.name);
                }
            }
            Err(warning) => {
                warn!("{}", warning);
                if let Some(cb) = cb {
                    cb.on_item_skipped(i + 1, total, &warning.to_string());
                }
                warnings.push(warning);
            }
        }
    }

    let pages = composer.page_count();
    composer.write_atomic(specialty, config.compress, output)?;
    info!("PDF written: {} ({} pages)", output.display(), pages);

    if let Some(cb) = cb {
        cb.on_layout_complete(total, pages);
    }

    Ok(GeneratedPdf {
        specialty: specialty.to_string(),
        path: output.to_path_buf(),
        collected: total,
        pages,
        warnings,
    })
}

fn place(
    item: &ImageArtifact,
    config: &PdfMedConfig,
) -> Result<(EmbeddedJpeg, PageLayout), ItemWarning> {
    let (w, h) = probe_dimensions(&item.path).map_err(|e| ItemWarning::UnreadableDimensions {
        name: item.name.clone(),
        detail: e.to_string(),
    })?;
    let layout = fit_within(w, h, &config.page).ok_or_else(|| ItemWarning::UnreadableDimensions {
        name: item.name.clone(),
        detail: format!("zero-sized image {w}×{h}"),
    })?;
    let jpeg = EmbeddedJpeg::load(&item.path, config.jpeg_quality).map_err(|e| {
        ItemWarning::UnreadableImage {
            name: item.name.clone(),
            detail: e.to_string(),
        }
    })?;
    Ok((jpeg, layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DateSource;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn jpeg_file(dir: &Path, name: &str, w: u32, h: u32) -> ImageArtifact {
        let path = dir.join(name);
        RgbImage::from_pixel(w, h, Rgb([200, 10, 10]))
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .unwrap();
        ImageArtifact {
            path,
            name: name.to_string(),
            effective_date: chrono::NaiveDateTime::MIN,
            date_source: DateSource::FileName,
        }
    }

    fn image_widths(doc: &Document) -> Vec<i64> {
        doc.get_pages()
            .values()
            .map(|page_id| {
                let page = doc.get_dictionary(*page_id).unwrap();
                let res = page.get(b"Resources").unwrap().as_dict().unwrap();
                let xobjs = res.get(b"XObject").unwrap().as_dict().unwrap();
                let id = xobjs.get(b"Im0").unwrap().as_reference().unwrap();
                let stream = doc.get_object(id).unwrap().as_stream().unwrap();
                stream.dict.get(b"Width").unwrap().as_i64().unwrap()
            })
            .collect()
    }

    #[test]
    fn frame_header_of_encoded_jpeg() {
        let img = image::DynamicImage::ImageRgb8(RgbImage::new(33, 17));
        let bytes = encode_jpeg(&img, 85, Path::new("x")).unwrap();
        let frame = jpeg_frame(&bytes).unwrap();
        assert_eq!((frame.width, frame.height, frame.components), (33, 17, 3));
        assert!(!frame.adobe);
    }

    #[test]
    fn frame_header_rejects_non_jpeg() {
        assert!(jpeg_frame(b"\x89PNG\r\n\x1a\n").is_none());
        assert!(jpeg_frame(&[0xFF, 0xD8]).is_none());
    }

    #[test]
    fn grayscale_jpeg_has_one_component() {
        let img = image::DynamicImage::ImageLuma8(image::GrayImage::new(5, 4));
        let bytes = encode_jpeg(&img, 85, Path::new("x")).unwrap();
        assert_eq!(jpeg_frame(&bytes).unwrap().components, 1);
    }

    #[test]
    fn png_named_jpg_is_reencoded() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("liar.jpg");
        RgbImage::new(12, 9)
            .save_with_format(&p, image::ImageFormat::Png)
            .unwrap();
        let jpeg = EmbeddedJpeg::load(&p, 85).unwrap();
        assert_eq!((jpeg.width(), jpeg.height()), (12, 9));
        assert!(jpeg_frame(&jpeg.bytes).is_some());
    }

    #[test]
    fn text_string_encodings() {
        assert_eq!(
            text_string("Cardio"),
            Object::String(b"Cardio".to_vec(), StringFormat::Literal)
        );
        match text_string("Эндо") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
                assert_eq!(bytes.len(), 2 + 4 * 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn one_page_per_item_in_order() {
        let dir = TempDir::new().unwrap();
        let items = vec![
            jpeg_file(dir.path(), "a.jpg", 30, 20),
            jpeg_file(dir.path(), "b.jpg", 40, 20),
            jpeg_file(dir.path(), "c.jpg", 50, 20),
        ];
        let out = dir.path().join("pdf/Cardio/Cardio.pdf");
        let result = compose_document("Cardio", &items, &out, &PdfMedConfig::default()).unwrap();

        assert_eq!(result.pages, 3);
        assert_eq!(result.collected, 3);
        assert!(result.warnings.is_empty());

        let doc = Document::load(&out).unwrap();
        assert_eq!(image_widths(&doc), vec![30, 40, 50]);
    }

    #[test]
    fn unreadable_item_is_skipped_with_warning() {
        let dir = TempDir::new().unwrap();
        let good = jpeg_file(dir.path(), "good.jpg", 10, 10);
        let bad_path = dir.path().join("bad.jpg");
        fs::write(&bad_path, b"not an image at all").unwrap();
        let bad = ImageArtifact {
            path: bad_path,
            name: "bad.jpg".into(),
            ..good.clone()
        };

        let out = dir.path().join("out.pdf");
        let result =
            compose_document("Cardio", &[bad, good], &out, &PdfMedConfig::default()).unwrap();
        assert_eq!(result.pages, 1);
        assert_eq!(result.collected, 2);
        assert!(matches!(
            result.warnings[0],
            ItemWarning::UnreadableDimensions { .. }
        ));
    }

    #[test]
    fn empty_item_list_writes_pageless_document() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("empty.pdf");
        let result = compose_document("Empty", &[], &out, &PdfMedConfig::default()).unwrap();
        assert_eq!(result.pages, 0);
        assert!(out.is_file());
        let doc = Document::load(&out).unwrap();
        assert!(doc.get_pages().is_empty());
    }

    #[test]
    fn title_metadata_is_the_slug() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("t.pdf");
        compose_document("Neuro", &[], &out, &PdfMedConfig::default()).unwrap();
        let doc = Document::load(&out).unwrap();
        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_dictionary(info_id).unwrap();
        assert_eq!(info.get(b"Title").unwrap().as_str().unwrap(), b"Neuro");
    }

    #[test]
    fn placement_is_centred_in_points() {
        let dir = TempDir::new().unwrap();
        let item = jpeg_file(dir.path(), "wide.jpg", 400, 300);
        let out = dir.path().join("c.pdf");
        let config = PdfMedConfig::builder().compress(false).build().unwrap();
        compose_document("C", &[item], &out, &config).unwrap();

        let doc = Document::load(&out).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let cm = content
            .operations
            .iter()
            .find(|op| op.operator == "cm")
            .unwrap();
        let nums: Vec<f32> = cm.operands.iter().map(|o| o.as_float().unwrap()).collect();
        // 190 × 142.5 mm at x = 10 mm, y = 77.25 mm from the bottom.
        assert!((nums[0] - 538.58).abs() < 0.05, "w {}", nums[0]);
        assert!((nums[3] - 403.94).abs() < 0.05, "h {}", nums[3]);
        assert!((nums[4] - 28.35).abs() < 0.05, "x {}", nums[4]);
        assert!((nums[5] - 218.98).abs() < 0.05, "y {}", nums[5]);
    }

    fn temp_leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(".pdfmed-"))
            .collect()
    }

    #[test]
    fn failed_write_keeps_previous_document() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("keep.pdf");
        fs::write(&out, b"%PDF-previous").unwrap();

        let err = persist_atomically(&out, |file| {
            use std::io::Write;
            file.write_all(b"%PDF-half").unwrap();
            Err(PdfMedError::PdfAssembly("disk full".into()))
        })
        .unwrap_err();

        assert!(matches!(err, PdfMedError::PdfAssembly(_)));
        assert_eq!(fs::read(&out).unwrap(), b"%PDF-previous");
        assert!(temp_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn failed_rename_leaves_target_and_no_temp_file() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory at the target makes the final rename fail.
        let out = dir.path().join("keep.pdf");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("inside"), b"previous").unwrap();

        let err = compose_document("K", &[], &out, &PdfMedConfig::default()).unwrap_err();

        assert!(matches!(err, PdfMedError::OutputWriteFailed { .. }), "got {err:?}");
        assert_eq!(fs::read(out.join("inside")).unwrap(), b"previous");
        assert!(temp_leftovers(dir.path()).is_empty());
    }
}
