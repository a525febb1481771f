//! Наложение логотипа на QR код: белая круглая подложка по центру и логотип поверх неё.

use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};

use crate::color::HexColor;
use crate::datauri::{self, DataUriError};

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("failed to read QR raster: {0}")]
    DataUri(#[from] DataUriError),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    /// Половина стороны логотипа и радиус подложки без отступа
    radius: u32,
    padding: u32,
}

impl Compositor {
    pub fn new(radius: u32, padding: u32) -> Self {
        Self { radius, padding }
    }

    pub fn backdrop_radius(&self) -> f64 {
        f64::from(self.radius + self.padding)
    }

    /// Загрузить закодированный QR растр в поверхность для рисования
    pub fn load_surface(uri: &str) -> Result<RgbaImage, ComposeError> {
        let bytes = datauri::decode(uri)?;
        Ok(image::load_from_memory(&bytes)?.to_rgba8())
    }

    pub fn decode_logo(bytes: &[u8]) -> Result<DynamicImage, ComposeError> {
        Ok(image::load_from_memory(bytes)?)
    }

    /// Непрозрачный белый круг в центре поверхности, края сглажены по покрытию пикселя
    pub fn paint_backdrop(&self, surface: &mut RgbaImage) {
        let (cx, cy) = center(surface);
        let r = self.backdrop_radius();
        let white = HexColor::WHITE.to_pixel();

        let x0 = (cx - r - 1.0).floor().max(0.0) as u32;
        let y0 = (cy - r - 1.0).floor().max(0.0) as u32;
        let x1 = ((cx + r + 1.0).ceil() as u32).min(surface.width());
        let y1 = ((cy + r + 1.0).ceil() as u32).min(surface.height());

        for y in y0..y1 {
            for x in x0..x1 {
                let dx = f64::from(x) + 0.5 - cx;
                let dy = f64::from(y) + 0.5 - cy;
                let distance = (dx * dx + dy * dy).sqrt();
                let coverage = (r + 0.5 - distance).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    let pixel = surface.get_pixel_mut(x, y);
                    *pixel = source_over(*pixel, white, coverage as f32);
                }
            }
        }
    }

    /// Логотип вписывается в квадрат 2r x 2r с тем же центром, что и подложка
    pub fn draw_logo(&self, surface: &mut RgbaImage, logo: &DynamicImage) {
        let side = self.radius * 2;
        let scaled = logo.resize_exact(side, side, FilterType::Triangle).to_rgba8();
        let (cx, cy) = center(surface);
        let x = (cx - f64::from(self.radius)).floor() as i64;
        let y = (cy - f64::from(self.radius)).floor() as i64;

        image::imageops::overlay(surface, &scaled, x, y);
    }
}

fn center(surface: &RgbaImage) -> (f64, f64) {
    (
        f64::from(surface.width()) / 2.0,
        f64::from(surface.height()) / 2.0,
    )
}

fn source_over(dst: Rgba<u8>, src: Rgba<u8>, coverage: f32) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0 * coverage;
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }

    let mix = |s: u8, d: u8| {
        let c = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
        c.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(src[0], dst[0]),
        mix(src[1], dst[1]),
        mix(src[2], dst[2]),
        (out_a * 255.0).round() as u8,
    ])
}
