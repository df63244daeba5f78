//! Certificate rasterization.
//!
//! A certificate is drawn in three passes onto one pixmap: the canvas (the
//! template background, or white), the text fields from the layout map, and
//! finally the QR code. Text goes through `usvg` so custom fonts and the
//! baseline-at-`y` convention come for free.

mod color;
mod date_format;
mod fonts;
mod layout;
mod qr;

pub use color::{resolve_text_color, Rgb};
pub use date_format::{format_date, format_datetime, DEFAULT_DATE_FORMAT};
pub use fonts::FontLibrary;
pub use layout::{FieldLayout, Layout, QrLayout, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH};

use std::fmt::Write as _;

use resvg::tiny_skia::{self, IntSize, Pixmap};
use resvg::usvg;
use thiserror::Error;
use time::{Date, OffsetDateTime};

use crate::db::{CertificateContext, CertificateTemplate};

pub const PNG_MIME_TYPE: &str = "image/png";

const DEFAULT_FONT_SIZE: i64 = 16;
const MAX_CANVAS_DIMENSION: i64 = 10_000;
/// Font sizes are given in points and drawn at 96 DPI.
const POINTS_TO_PIXELS: f32 = 96.0 / 72.0;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid canvas size {width}x{height}")]
    InvalidCanvas { width: i64, height: i64 },

    #[error("Unable to read certificate background image: {0}")]
    UnreadableBackground(#[source] image::ImageError),

    #[error("Unable to lay out certificate text: {0}")]
    Text(#[from] usvg::Error),

    #[error("Unable to encode QR code: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("Unable to encode certificate image: {0}")]
    Encode(String),

    #[error("Rendering task failed: {0}")]
    Interrupted(String),
}

/// A value that can be drawn into a layout field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Date(Date),
    DateTime(OffsetDateTime),
}

impl FieldValue {
    fn display(&self, format: Option<&str>) -> String {
        let format = format.unwrap_or(DEFAULT_DATE_FORMAT);
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Date(date) => format_date(*date, format),
            FieldValue::DateTime(datetime) => format_datetime(*datetime, format),
        }
    }
}

/// Everything a layout can reference, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct CertificateData {
    pub name: Option<String>,
    pub program: Option<String>,
    pub session: Option<String>,
    pub course: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub issued_at: Option<OffsetDateTime>,
    pub issued_by: Option<String>,
    pub certificate_code: Option<String>,
    pub verify_url: Option<String>,
}

impl CertificateData {
    pub fn from_context(context: &CertificateContext, public_url: &str) -> Self {
        let certificate = &context.certificate;
        let relations = &context.relations;
        let session_title = relations.session.as_ref().map(|s| s.title.clone());
        let program_name = relations.program.as_ref().map(|p| p.name.clone());

        Self {
            name: relations.recipient_name.clone(),
            course: session_title.clone().or_else(|| program_name.clone()),
            program: program_name,
            session: session_title,
            start_date: relations.session.as_ref().and_then(|s| s.start_date),
            end_date: relations.session.as_ref().and_then(|s| s.end_date),
            issued_at: Some(certificate.issued_at),
            issued_by: relations.issuer_name.clone(),
            certificate_code: Some(certificate.certificate_code.clone()),
            verify_url: Some(verification_url(public_url, &certificate.certificate_code)),
        }
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let text = |value: &Option<String>| value.clone().map(FieldValue::Text);
        match name {
            "name" => text(&self.name),
            "program" => text(&self.program),
            "session" => text(&self.session),
            "course" => text(&self.course),
            "start_date" => self.start_date.map(FieldValue::Date),
            "end_date" => self.end_date.map(FieldValue::Date),
            "issued_at" => self.issued_at.map(FieldValue::DateTime),
            "issued_by" => text(&self.issued_by),
            "certificate_code" => text(&self.certificate_code),
            "verify_url" => text(&self.verify_url),
            _ => None,
        }
    }

    /// What the QR code encodes: the verification URL, else the code.
    pub fn qr_payload(&self) -> Option<&str> {
        self.verify_url
            .as_deref()
            .or(self.certificate_code.as_deref())
            .filter(|payload| !payload.is_empty())
    }
}

pub fn verification_url(public_url: &str, certificate_code: &str) -> String {
    format!("{}/verify/{}", public_url.trim_end_matches('/'), certificate_code)
}

#[derive(Debug, Clone)]
pub struct RenderedCertificate {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

struct TextItem {
    x: i64,
    y: i64,
    size_px: f32,
    color: Rgb,
    font: Option<String>,
    text: String,
}

pub struct CertificateRenderer {
    fonts: FontLibrary,
}

impl CertificateRenderer {
    pub fn new(fonts: FontLibrary) -> Self {
        Self { fonts }
    }

    pub fn render(
        &self,
        data: &CertificateData,
        template: &CertificateTemplate,
    ) -> Result<RenderedCertificate, RenderError> {
        let layout = Layout::from_config(template.layout_config.as_ref());
        let mut canvas = create_canvas(template, &layout)?;

        let items = self.text_items(data, template, &layout);
        if !items.is_empty() {
            self.draw_text(&mut canvas, &items, template)?;
        }

        if let (Some(qr_layout), Some(payload)) = (layout.qr.as_ref(), data.qr_payload()) {
            qr::composite_qr(&mut canvas, payload, qr_layout)?;
        }

        let bytes = canvas
            .encode_png()
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        Ok(RenderedCertificate {
            bytes,
            mime_type: PNG_MIME_TYPE,
        })
    }

    fn text_items(&self, data: &CertificateData, template: &CertificateTemplate, layout: &Layout) -> Vec<TextItem> {
        let template_size = template.font_size.map(i64::from);
        let template_color = template.text_color.as_deref();

        layout
            .fields
            .iter()
            .filter_map(|(name, field)| {
                let value = data.field(name)?;
                let size = field.size.or(template_size).unwrap_or(DEFAULT_FONT_SIZE).max(1);

                Some(TextItem {
                    x: field.x,
                    y: field.y,
                    size_px: size as f32 * POINTS_TO_PIXELS,
                    color: resolve_text_color(field.color.as_deref(), template_color),
                    font: field.font.clone().or_else(|| template.font_family.clone()),
                    text: value.display(field.format.as_deref()),
                })
            })
            .collect()
    }

    fn draw_text(&self, canvas: &mut Pixmap, items: &[TextItem], template: &CertificateTemplate) -> Result<(), RenderError> {
        let fonts = self.fonts.prepare(items.iter().filter_map(|item| item.font.as_deref()));

        let mut svg = String::new();
        let (width, height) = (canvas.width(), canvas.height());
        let _ = write!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">"
        );
        for item in items {
            let _ = write!(
                svg,
                "<text x=\"{}\" y=\"{}\" font-family=\"{}\" font-size=\"{:.2}\" fill=\"{}\" xml:space=\"preserve\">{}</text>",
                item.x,
                item.y,
                escape_xml(&fonts.family_attribute(item.font.as_deref())),
                item.size_px,
                item.color.to_hex(),
                escape_xml(&item.text),
            );
        }
        svg.push_str("</svg>");

        let mut options = usvg::Options::default();
        options.fontdb = fonts.database.clone();
        options.font_family = fonts.default_family.clone();

        let tree = usvg::Tree::from_str(&svg, &options)?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut canvas.as_mut());

        tracing::debug!(
            template_id = %template.id,
            fields = items.len(),
            "Certificate text drawn"
        );
        Ok(())
    }
}

fn create_canvas(template: &CertificateTemplate, layout: &Layout) -> Result<Pixmap, RenderError> {
    if let Some(background) = template.background_image.as_deref().filter(|b| !b.is_empty()) {
        return background_canvas(background);
    }

    let (width, height) = layout.canvas_size();
    let invalid = RenderError::InvalidCanvas { width, height };
    if !(1..=MAX_CANVAS_DIMENSION).contains(&width) || !(1..=MAX_CANVAS_DIMENSION).contains(&height) {
        return Err(invalid);
    }

    let mut canvas = Pixmap::new(width as u32, height as u32).ok_or(invalid)?;
    canvas.fill(tiny_skia::Color::WHITE);
    Ok(canvas)
}

fn background_canvas(bytes: &[u8]) -> Result<Pixmap, RenderError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(RenderError::UnreadableBackground)?
        .to_rgba8();
    let (width, height) = decoded.dimensions();

    let mut data = decoded.into_raw();
    for pixel in data.chunks_exact_mut(4) {
        let alpha = pixel[3] as u32;
        for channel in &mut pixel[..3] {
            *channel = ((*channel as u32 * alpha + 127) / 255) as u8;
        }
    }

    let invalid = RenderError::InvalidCanvas {
        width: width as i64,
        height: height as i64,
    };
    let size = IntSize::from_wh(width, height).ok_or_else(|| invalid)?;
    Pixmap::from_vec(data, size).ok_or(RenderError::InvalidCanvas {
        width: width as i64,
        height: height as i64,
    })
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TemplateScope;
    use serde_json::json;
    use std::io::Cursor;
    use time::macros::{date, datetime};
    use uuid::Uuid;

    fn template(layout: serde_json::Value) -> CertificateTemplate {
        CertificateTemplate {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            scope: TemplateScope::Global,
            program_id: None,
            session_id: None,
            background_image: None,
            background_mime_type: None,
            layout_config: Some(layout),
            font_family: None,
            font_size: Some(20),
            text_color: Some("#1f2937".to_string()),
            is_active: true,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn data() -> CertificateData {
        CertificateData {
            name: Some("Ada Lovelace".to_string()),
            program: Some("Safety 101".to_string()),
            session: Some("Spring cohort".to_string()),
            course: Some("Spring cohort".to_string()),
            start_date: Some(date!(2025 - 03 - 01)),
            end_date: Some(date!(2025 - 03 - 05)),
            issued_at: Some(datetime!(2025-03-06 09:00 UTC)),
            issued_by: Some("Grace Hopper".to_string()),
            certificate_code: Some("CERT-ABCDEFGHIJ".to_string()),
            verify_url: Some("https://certs.example.test/verify/CERT-ABCDEFGHIJ".to_string()),
        }
    }

    fn renderer() -> CertificateRenderer {
        CertificateRenderer::new(FontLibrary::bundled("/nonexistent", "sans-serif"))
    }

    fn decode(bytes: &[u8]) -> image::RgbaImage {
        image::load_from_memory(bytes).unwrap().to_rgba8()
    }

    #[test]
    fn blank_canvas_uses_layout_size() {
        let rendered = renderer()
            .render(&data(), &template(json!({"canvas": {"width": 320, "height": 200}})))
            .unwrap();

        assert_eq!(rendered.mime_type, "image/png");
        let image = decode(&rendered.bytes);
        assert_eq!(image.dimensions(), (320, 200));
        assert_eq!(image.get_pixel(10, 10).0, [255, 255, 255, 255]);
    }

    #[test]
    fn default_canvas_is_1600_by_1200() {
        let rendered = renderer().render(&data(), &template(json!({}))).unwrap();
        assert_eq!(decode(&rendered.bytes).dimensions(), (1600, 1200));
    }

    #[test]
    fn background_image_defines_the_canvas() {
        let mut background = image::RgbaImage::new(64, 48);
        for pixel in background.pixels_mut() {
            *pixel = image::Rgba([10, 120, 200, 255]);
        }
        let mut bytes = Vec::new();
        background
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let mut template = template(json!({"canvas": {"width": 999, "height": 999}}));
        template.background_image = Some(bytes);
        template.background_mime_type = Some("image/png".to_string());

        let image = decode(&renderer().render(&data(), &template).unwrap().bytes);
        assert_eq!(image.dimensions(), (64, 48));
        assert_eq!(image.get_pixel(1, 1).0, [10, 120, 200, 255]);
    }

    #[test]
    fn unreadable_background_fails_the_render() {
        let mut template = template(json!({}));
        template.background_image = Some(b"definitely not an image".to_vec());

        let err = renderer().render(&data(), &template).unwrap_err();
        assert!(matches!(err, RenderError::UnreadableBackground(_)));
    }

    #[test]
    fn invalid_canvas_fails_the_render() {
        let err = renderer()
            .render(&data(), &template(json!({"canvas": {"width": 0, "height": 100}})))
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidCanvas { width: 0, height: 100 }));
    }

    #[test]
    fn qr_code_is_composited_into_its_box() {
        let layout = json!({
            "canvas": {"width": 400, "height": 300},
            "qr": {"x": 200, "y": 100, "size": 100, "width": 100, "height": 100}
        });
        let image = decode(&renderer().render(&data(), &template(layout)).unwrap().bytes);

        // The top-left finder pattern starts dark; outside the box stays white.
        let corner = image.get_pixel(202, 102).0;
        assert!(corner[0] < 64, "expected dark finder pattern, got {:?}", corner);
        assert_eq!(image.get_pixel(150, 50).0, [255, 255, 255, 255]);
    }

    #[test]
    fn text_fields_are_drawn_in_their_box() {
        let with_name = json!({
            "canvas": {"width": 400, "height": 100},
            "name": {"x": 10, "y": 60, "size": 24, "color": "#f00"},
            "unknown_field": {"x": 10, "y": 90}
        });
        let rendered = renderer().render(&data(), &template(with_name)).unwrap();
        let image = decode(&rendered.bytes);

        let red = (10..390)
            .flat_map(|x| (20..70).map(move |y| (x, y)))
            .filter(|&(x, y)| {
                let [r, g, b, _] = image.get_pixel(x, y).0;
                r > 200 && g < 100 && b < 100
            })
            .count();
        assert!(red > 50, "expected glyph pixels in the name box, found {}", red);

        let without_name = renderer()
            .render(&data(), &template(json!({"canvas": {"width": 400, "height": 100}})))
            .unwrap();
        assert_ne!(rendered.bytes, without_name.bytes);
    }

    #[test]
    fn oversized_qr_fails_the_render() {
        let layout = json!({
            "canvas": {"width": 200, "height": 200},
            "qr": {"x": 0, "y": 0, "size": 40000}
        });
        let err = renderer().render(&data(), &template(layout)).unwrap_err();
        assert!(matches!(err, RenderError::InvalidCanvas { .. }));
    }

    #[test]
    fn field_values_cover_every_layout_key() {
        let data = data();
        assert_eq!(data.field("name"), Some(FieldValue::Text("Ada Lovelace".to_string())));
        assert_eq!(data.field("start_date"), Some(FieldValue::Date(date!(2025 - 03 - 01))));
        assert!(matches!(data.field("issued_at"), Some(FieldValue::DateTime(_))));
        assert_eq!(data.field("canvas"), None);
        assert_eq!(
            data.field("issued_at").unwrap().display(Some("j M Y")),
            "6 Mar 2025"
        );
    }

    #[test]
    fn qr_payload_prefers_the_verification_url() {
        let mut data = data();
        assert_eq!(data.qr_payload(), Some("https://certs.example.test/verify/CERT-ABCDEFGHIJ"));
        data.verify_url = None;
        assert_eq!(data.qr_payload(), Some("CERT-ABCDEFGHIJ"));
        data.certificate_code = None;
        assert_eq!(data.qr_payload(), None);
    }

    #[test]
    fn verification_url_ignores_trailing_slashes() {
        assert_eq!(
            verification_url("https://example.test/", "CERT-1"),
            "https://example.test/verify/CERT-1"
        );
    }

    #[test]
    fn escapes_markup_in_text() {
        assert_eq!(escape_xml("A & <B> \"C\""), "A &amp; &lt;B&gt; &quot;C&quot;");
    }
}
