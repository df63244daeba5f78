use qrcode::{Color, QrCode};
use resvg::tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

use super::layout::QrLayout;
use super::{RenderError, MAX_CANVAS_DIMENSION};

const DARK: [u8; 4] = [0, 0, 0, 255];
const LIGHT: [u8; 4] = [255, 255, 255, 255];

/// Rasterizes `payload` as a QR code roughly `size` pixels wide with no quiet
/// zone. Modules are whole pixels, so the result may be slightly smaller
/// than `size`; it is resampled to its final box when composited.
pub fn qr_pixmap(payload: &str, size: u32) -> Result<Pixmap, RenderError> {
    let code = QrCode::new(payload.as_bytes())?;
    let modules = code.width() as u32;
    let module_px = (size / modules).max(1);
    let edge = modules * module_px;

    let mut pixmap = Pixmap::new(edge, edge).ok_or(RenderError::InvalidCanvas {
        width: edge as i64,
        height: edge as i64,
    })?;

    let colors = code.to_colors();
    let data = pixmap.data_mut();
    for py in 0..edge {
        for px in 0..edge {
            let module = (py / module_px) * modules + (px / module_px);
            let rgba = match colors[module as usize] {
                Color::Dark => DARK,
                Color::Light => LIGHT,
            };
            let offset = ((py * edge + px) * 4) as usize;
            data[offset..offset + 4].copy_from_slice(&rgba);
        }
    }

    Ok(pixmap)
}

/// Draws the QR code for `payload` onto `canvas`, scaled into the layout box.
pub fn composite_qr(canvas: &mut Pixmap, payload: &str, layout: &QrLayout) -> Result<(), RenderError> {
    if layout.size <= 0 || layout.width <= 0 || layout.height <= 0 {
        return Ok(());
    }
    if [layout.size, layout.width, layout.height]
        .iter()
        .any(|edge| *edge > MAX_CANVAS_DIMENSION)
    {
        return Err(RenderError::InvalidCanvas {
            width: layout.width.max(layout.size),
            height: layout.height.max(layout.size),
        });
    }

    let qr = qr_pixmap(payload, layout.size as u32)?;
    let scale_x = layout.width as f32 / qr.width() as f32;
    let scale_y = layout.height as f32 / qr.height() as f32;

    let paint = PixmapPaint {
        quality: FilterQuality::Bicubic,
        ..PixmapPaint::default()
    };
    let transform = Transform::from_row(scale_x, 0.0, 0.0, scale_y, layout.x as f32, layout.y as f32);
    canvas.draw_pixmap(0, 0, qr.as_ref(), &paint, transform, None);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qr_fits_within_requested_size() {
        let pixmap = qr_pixmap("https://example.test/verify/CERT-ABC", 160).unwrap();
        assert!(pixmap.width() <= 160);
        assert_eq!(pixmap.width(), pixmap.height());
        // Finder pattern corner is always dark.
        assert_eq!(pixmap.pixel(0, 0).unwrap().alpha(), 255);
        assert_eq!(pixmap.pixel(0, 0).unwrap().red(), 0);
    }

    #[test]
    fn tiny_sizes_still_use_one_pixel_per_module() {
        let pixmap = qr_pixmap("CERT-ABC", 4).unwrap();
        assert!(pixmap.width() >= 21);
    }

    #[test]
    fn oversized_boxes_are_rejected_before_allocating() {
        let mut canvas = Pixmap::new(50, 50).unwrap();
        for layout in [
            QrLayout { x: 0, y: 0, size: 40_000, width: 160, height: 160 },
            QrLayout { x: 0, y: 0, size: 160, width: 160, height: i64::from(u32::MAX) + 10 },
        ] {
            let err = composite_qr(&mut canvas, "CERT-ABC", &layout).unwrap_err();
            assert!(matches!(err, RenderError::InvalidCanvas { .. }));
        }
        assert!(canvas.data().iter().all(|b| *b == 0));
    }

    #[test]
    fn zero_sized_box_is_skipped() {
        let mut canvas = Pixmap::new(50, 50).unwrap();
        let layout = QrLayout { x: 0, y: 0, size: 160, width: 0, height: 160 };
        composite_qr(&mut canvas, "CERT-ABC", &layout).unwrap();
        assert!(canvas.data().iter().all(|b| *b == 0));
    }
}
