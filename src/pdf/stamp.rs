//! Visual signature stamp.
//!
//! Draws a signature block in the lower right corner of every page: an
//! optional logo, the signer's identity lines, an optional drawn signature
//! image and the signing time. The block is a single Form XObject shared by
//! all pages; each page gets an extra content stream that places it.
//!
//! Original page content is wrapped in `q ... Q` so that a graphics state it
//! leaves behind cannot move or recolour the stamp.
//!
//! ## Example
//!
//! ```ignore
//! use pdf_seal::pdf::{PageStamper, SignatureStamp, Stamper};
//!
//! let stamp = SignatureStamp::new(vec!["Name: Jane Doe".into()], chrono::Local::now().naive_local());
//! let stamped = PageStamper::new().stamp(&pdf_bytes, &stamp)?;
//! ```

use super::serializer::escape_literal;
use crate::error::{Error, Result};
use base64::Engine as _;
use chrono::NaiveDateTime;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use std::path::Path;

/// Points per centimetre.
const CM: f64 = 28.3465;
/// A4 portrait, used when a page has no readable MediaBox.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 595.28, 841.89];
const SIGNATURE_HEIGHT: f64 = 1.2 * CM;
const LOGO_WIDTH: f64 = SIGNATURE_HEIGHT * 1.5;
const SIGNATURE_WIDTH: f64 = 2.5 * CM;
const BLOCK_WIDTH: f64 = 10.0 * CM;
const BLOCK_BOTTOM: f64 = -0.7 * CM;

/// Applies a visual stamp to a document.
pub trait Stamper: Send + Sync {
    /// Return a new document with the stamp drawn on every page.
    fn stamp(&self, pdf: &[u8], stamp: &SignatureStamp) -> Result<Vec<u8>>;
}

/// Image drawn inside the stamp (logo or hand-drawn signature).
#[derive(Clone, PartialEq, Eq)]
pub struct StampImage {
    data: Vec<u8>,
}

impl std::fmt::Debug for StampImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampImage")
            .field("len", &self.data.len())
            .finish()
    }
}

impl StampImage {
    /// Wrap encoded PNG or JPEG bytes.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Read an image file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    /// Decode a `data:image/...;base64,` URL, as produced by a drawing canvas.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let payload = match url.split_once(',') {
            Some((header, payload)) if header.starts_with("data:") => {
                if !header.ends_with(";base64") {
                    return Err(Error::Image("data URL is not base64 encoded".to_string()));
                }
                payload
            },
            _ => url,
        };
        let data = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
        Ok(Self::from_bytes(data))
    }

    /// Encoded image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Placement of the stamp block, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampPosition {
    /// Distance of the block's left edge from the right page edge
    pub right_offset: f64,
    /// Distance of the block's baseline from the bottom page edge
    pub bottom_offset: f64,
}

impl Default for StampPosition {
    fn default() -> Self {
        Self {
            right_offset: 10.0 * CM,
            bottom_offset: 2.0 * CM,
        }
    }
}

/// Content of the visual signature block.
#[derive(Debug, Clone)]
pub struct SignatureStamp {
    /// Identity lines, e.g. `Name: ...`, drawn top to bottom
    pub signer_lines: Vec<String>,
    /// Local signing time shown under the block
    pub signed_at: NaiveDateTime,
    /// Optional logo on the left
    pub logo: Option<StampImage>,
    /// Optional drawn signature on the right
    pub signature_image: Option<StampImage>,
    /// Block placement
    pub position: StampPosition,
}

impl SignatureStamp {
    /// Create a stamp with text only.
    pub fn new(signer_lines: Vec<String>, signed_at: NaiveDateTime) -> Self {
        Self {
            signer_lines,
            signed_at,
            logo: None,
            signature_image: None,
            position: StampPosition::default(),
        }
    }

    /// Add a logo.
    pub fn with_logo(mut self, logo: StampImage) -> Self {
        self.logo = Some(logo);
        self
    }

    /// Add a drawn signature.
    pub fn with_signature_image(mut self, image: StampImage) -> Self {
        self.signature_image = Some(image);
        self
    }

    /// Move the block.
    pub fn with_position(mut self, position: StampPosition) -> Self {
        self.position = position;
        self
    }

    /// The timestamp line as drawn.
    pub fn timestamp_line(&self) -> String {
        format!("Signed at: {}", self.signed_at.format("%d/%m/%Y %H:%M:%S"))
    }
}

/// Built-in stamper that rewrites the document with `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageStamper;

impl PageStamper {
    /// Create a page stamper.
    pub fn new() -> Self {
        Self
    }
}

impl Stamper for PageStamper {
    fn stamp(&self, pdf: &[u8], stamp: &SignatureStamp) -> Result<Vec<u8>> {
        let mut doc = Document::load_mem(pdf)?;
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(Error::InvalidPdf("document has no pages".to_string()));
        }

        let form_id = build_form(&mut doc, stamp)?;
        let form_name = format!("PdfSeal{}", form_id.0);
        let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));

        for (page_number, page_id) in pages {
            let media_box = media_box(&doc, page_id);
            let x = media_box[2] - stamp.position.right_offset;
            let y = media_box[1] + stamp.position.bottom_offset;
            let overlay = format!("Q\nq 1 0 0 1 {:.2} {:.2} cm /{} Do Q\n", x, y, form_name);
            let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay.into_bytes()));

            let mut contents = vec![Object::Reference(open_id)];
            contents.extend(page_contents(&doc, page_id)?);
            contents.push(Object::Reference(overlay_id));

            let mut resources = inherited_dict(&doc, page_id, b"Resources").unwrap_or_default();
            let mut xobjects = match resources.get(b"XObject") {
                Ok(obj) => resolve_dict(&doc, obj).unwrap_or_default(),
                Err(_) => Dictionary::new(),
            };
            xobjects.set(form_name.as_bytes().to_vec(), Object::Reference(form_id));
            resources.set("XObject", Object::Dictionary(xobjects));

            let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
            page.set("Contents", Object::Array(contents));
            page.set("Resources", Object::Dictionary(resources));
            log::trace!("Stamped page {}", page_number);
        }

        let mut out = Vec::with_capacity(pdf.len() + 4096);
        doc.save_to(&mut out)
            .map_err(|e| Error::InvalidPdf(format!("cannot write stamped PDF: {}", e)))?;
        log::debug!("Stamped {} page(s)", doc.get_pages().len());
        Ok(out)
    }
}

/// Build the shared Form XObject holding the whole block.
fn build_form(doc: &mut Document, stamp: &SignatureStamp) -> Result<ObjectId> {
    let mut content = Vec::new();
    let mut xobjects = Dictionary::new();

    if let Some(logo) = &stamp.logo {
        let id = add_image(doc, logo)?;
        xobjects.set("Logo", Object::Reference(id));
        writeln!(content, "q {:.2} 0 0 {:.2} 0 0 cm /Logo Do Q", LOGO_WIDTH, SIGNATURE_HEIGHT)?;
    }

    if !stamp.signer_lines.is_empty() {
        let x = LOGO_WIDTH + 0.5 * CM;
        let mut y = 0.8 * CM;
        writeln!(content, "BT /F2 8 Tf 0 0 0.545 rg")?;
        for line in &stamp.signer_lines {
            write!(content, "1 0 0 1 {:.2} {:.2} Tm (", x, y)?;
            content.extend_from_slice(&escape_literal(&win_ansi(line)));
            writeln!(content, ") Tj")?;
            y -= 0.3 * CM;
        }
        writeln!(content, "ET")?;
    }

    if let Some(signature) = &stamp.signature_image {
        let id = add_image(doc, signature)?;
        xobjects.set("Signature", Object::Reference(id));
        writeln!(
            content,
            "q {:.2} 0 0 {:.2} {:.2} 0 cm /Signature Do Q",
            SIGNATURE_WIDTH,
            SIGNATURE_HEIGHT,
            LOGO_WIDTH + 3.0 * CM
        )?;
    }

    write!(content, "BT /F1 6 Tf 0.5 0.5 0.5 rg 1 0 0 1 0 {:.2} Tm (", -0.5 * CM)?;
    content.extend_from_slice(&escape_literal(&win_ansi(&stamp.timestamp_line())));
    writeln!(content, ") Tj ET")?;

    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Dictionary(font("Helvetica")));
    fonts.set("F2", Object::Dictionary(font("Helvetica-Bold")));

    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    if !xobjects.is_empty() {
        resources.set("XObject", Object::Dictionary(xobjects));
    }

    let mut form = Dictionary::new();
    form.set("Type", Object::Name(b"XObject".to_vec()));
    form.set("Subtype", Object::Name(b"Form".to_vec()));
    form.set(
        "BBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Real(BLOCK_BOTTOM as f32),
            Object::Real(BLOCK_WIDTH as f32),
            Object::Real((2.0 * CM) as f32),
        ]),
    );
    form.set("Resources", Object::Dictionary(resources));

    Ok(doc.add_object(Stream::new(form, content)))
}

fn font(base_font: &str) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Font".to_vec()));
    dict.set("Subtype", Object::Name(b"Type1".to_vec()));
    dict.set("BaseFont", Object::Name(base_font.as_bytes().to_vec()));
    dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    dict
}

fn buffer_len(width: u32, height: u32, channels: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or_else(|| Error::Image(format!("image too large: {}x{}", width, height)))
}

/// Decode an image and add it as a Flate-compressed RGB XObject.
///
/// An alpha channel becomes a soft mask.
fn add_image(doc: &mut Document, image: &StampImage) -> Result<ObjectId> {
    let decoded = image::load_from_memory(image.data())?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity(buffer_len(width, height, 3)?);
    let mut alpha = Vec::with_capacity(buffer_len(width, height, 1)?);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }

    let mut dict = image_dict(width, height, b"DeviceRGB");
    if alpha.iter().any(|&a| a != u8::MAX) {
        let mask = Stream::new(image_dict(width, height, b"DeviceGray"), compress(&alpha)?);
        let mask_id = doc.add_object(mask);
        dict.set("SMask", Object::Reference(mask_id));
    }

    Ok(doc.add_object(Stream::new(dict, compress(&rgb)?)))
}

fn image_dict(width: u32, height: u32, color_space: &[u8]) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(color_space.to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    dict
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Encode text for a WinAnsi Type1 font; characters outside Latin-1 become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

/// Page MediaBox, following the Parent chain.
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let values = match inherited(doc, page_id, b"MediaBox") {
        Some(Object::Array(values)) => values,
        _ => return DEFAULT_MEDIA_BOX,
    };
    let numbers: Vec<f64> = values.iter().filter_map(|v| number(doc, v)).collect();
    match numbers.as_slice() {
        [x1, y1, x2, y2] => [x1.min(*x2), y1.min(*y2), x1.max(*x2), y1.max(*y2)],
        _ => DEFAULT_MEDIA_BOX,
    }
}

fn number(doc: &Document, obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        Object::Reference(id) => number(doc, doc.get_object(*id).ok()?),
        _ => None,
    }
}

/// Look up a page attribute, walking up the page tree.
///
/// References are resolved, so the result is never a `Reference`.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    // Bounded walk in case of a Parent cycle
    for _ in 0..64 {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return match value {
                Object::Reference(id) => doc.get_object(*id).ok().cloned(),
                other => Some(other.clone()),
            };
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

fn inherited_dict(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Dictionary> {
    match inherited(doc, page_id, key)? {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok().cloned(),
        _ => None,
    }
}

/// Existing content streams of a page as a list of references.
fn page_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page = doc.get_object(page_id)?.as_dict()?;
    let contents = match page.get(b"Contents") {
        Ok(contents) => contents,
        Err(_) => return Ok(Vec::new()),
    };
    match contents {
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Array(items) => Ok(items.clone()),
            _ => Ok(vec![Object::Reference(*id)]),
        },
        Object::Array(items) => Ok(items.clone()),
        _ => Err(Error::InvalidPdf("page /Contents is neither a stream nor an array".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::{multi_page_pdf, simple_pdf};
    use chrono::NaiveDate;

    // 2x1 PNG, one opaque red pixel and one transparent pixel
    fn tiny_png() -> Vec<u8> {
        let mut img = image::RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 0, 0, 0]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn stamp() -> SignatureStamp {
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap();
        SignatureStamp::new(vec!["Name: Jane Doe".to_string(), "ID: 123".to_string()], at)
    }

    fn form_content(doc: &Document) -> String {
        let form = doc
            .objects
            .values()
            .find_map(|obj| match obj {
                Object::Stream(s) if matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Form") => {
                    Some(s.content.clone())
                },
                _ => None,
            })
            .unwrap();
        String::from_utf8_lossy(&form).to_string()
    }

    #[test]
    fn test_timestamp_line() {
        assert_eq!(stamp().timestamp_line(), "Signed at: 01/03/2024 09:05:07");
    }

    #[test]
    fn test_stamp_every_page() {
        let pdf = multi_page_pdf(3);
        let stamped = PageStamper::new().stamp(&pdf, &stamp()).unwrap();
        let doc = Document::load_mem(&stamped).unwrap();

        assert_eq!(doc.get_pages().len(), 3);
        for page_id in doc.get_pages().values() {
            let page = doc.get_object(*page_id).unwrap().as_dict().unwrap();
            let contents = page.get(b"Contents").unwrap().as_array().unwrap();
            // q + original + overlay
            assert_eq!(contents.len(), 3);
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            assert!(xobjects.iter().any(|(k, _)| k.starts_with(b"PdfSeal")));
        }

        let content = form_content(&doc);
        assert!(content.contains("(Name: Jane Doe) Tj"));
        assert!(content.contains("(Signed at: 01/03/2024 09:05:07) Tj"));
        assert!(content.contains("0 0 0.545 rg"));
    }

    #[test]
    fn test_stamp_with_images() {
        let pdf = simple_pdf("Images");
        let stamp = stamp()
            .with_logo(StampImage::from_bytes(tiny_png()))
            .with_signature_image(StampImage::from_bytes(tiny_png()));
        let stamped = PageStamper::new().stamp(&pdf, &stamp).unwrap();
        let doc = Document::load_mem(&stamped).unwrap();

        let content = form_content(&doc);
        assert!(content.contains("/Logo Do"));
        assert!(content.contains("/Signature Do"));

        let masks = doc
            .objects
            .values()
            .filter(|obj| match obj {
                Object::Stream(s) => s.dict.get(b"SMask").is_ok(),
                _ => false,
            })
            .count();
        assert_eq!(masks, 2);
    }

    #[test]
    fn test_stamp_rejects_bad_image() {
        let pdf = simple_pdf("Broken");
        let stamp = stamp().with_logo(StampImage::from_bytes(b"not an image".to_vec()));
        assert!(matches!(PageStamper::new().stamp(&pdf, &stamp), Err(Error::Image(_))));
    }

    #[test]
    fn test_data_url() {
        let png = tiny_png();
        let url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        assert_eq!(StampImage::from_data_url(&url).unwrap().data(), png.as_slice());
        assert!(StampImage::from_data_url("data:image/png,raw").is_err());
        assert!(StampImage::from_data_url("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn test_win_ansi() {
        assert_eq!(win_ansi("Goiás"), b"Goi\xe1s".to_vec());
        assert_eq!(win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn test_media_box_default() {
        let pdf = simple_pdf("Box");
        let doc = Document::load_mem(&pdf).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        assert_eq!(media_box(&doc, page_id), [0.0, 0.0, 595.0, 842.0]);
    }

    #[test]
    fn test_buffer_len_beyond_u32() {
        assert_eq!(buffer_len(4, 3, 3).unwrap(), 36);
        // 70000 x 70000 x 3 does not fit in a u32
        #[cfg(target_pointer_width = "64")]
        assert_eq!(buffer_len(70_000, 70_000, 3).unwrap(), 14_700_000_000);
        assert!(matches!(buffer_len(u32::MAX, u32::MAX, usize::MAX), Err(Error::Image(_))));
    }
}
