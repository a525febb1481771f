// src/qr.rs
use image::RgbaImage;
use qrcode::bits::Bits;
use qrcode::optimize::{Optimizer, Parser, Segment};
use qrcode::types::{Mode, QrError};
use qrcode::{Color, EcLevel, QrCode, Version};

use crate::color::ColorPair;
use crate::datauri;

/// Масштаб, если ширина меньше самого символа с рамкой
const FALLBACK_SCALE: f64 = 4.0;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("QR encode error: {0}")]
    Qr(#[from] QrError),
    #[error("PNG encode error: {0}")]
    Png(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy)]
pub struct QrEncoder {
    width: u32,
    margin: f64,
}

impl QrEncoder {
    pub fn new(width: u32, margin: f64) -> Self {
        Self { width, margin }
    }

    /// Генерировать QR код в формате base64 data URL
    pub fn encode(&self, data: &str, colors: ColorPair) -> Result<String, EncodeError> {
        let img = self.render(data, colors)?;
        let png = datauri::png_bytes(&img)?;
        Ok(datauri::encode_png(&png))
    }

    /// Растеризация QR кода.
    ///
    /// Рамка задаётся в модулях и может быть дробной, поэтому масштаб тоже дробный:
    /// каждый пиксель берёт цвет модуля, в который попадает его левый верхний угол.
    pub fn render(&self, data: &str, colors: ColorPair) -> Result<RgbaImage, QrError> {
        let code = build_code(data)?;
        let modules = code.width();
        let cells = code.to_colors();

        let span = modules as f64 + self.margin * 2.0;
        let scale = if f64::from(self.width) >= span {
            f64::from(self.width) / span
        } else {
            FALLBACK_SCALE
        };
        let symbol_size = (span * scale).floor() as u32;
        let scaled_margin = self.margin * scale;
        let inner_end = f64::from(symbol_size) - scaled_margin;

        let dark = colors.dark.to_pixel();
        let light = colors.light.to_pixel();

        let img = RgbaImage::from_fn(symbol_size, symbol_size, |x, y| {
            let (fx, fy) = (f64::from(x), f64::from(y));
            let inside = fx >= scaled_margin && fy >= scaled_margin && fx < inner_end && fy < inner_end;
            if !inside {
                return light;
            }

            let col = ((fx - scaled_margin) / scale).floor() as usize;
            let row = ((fy - scaled_margin) / scale).floor() as usize;
            if col < modules && row < modules && cells[row * modules + col] == Color::Dark {
                dark
            } else {
                light
            }
        });

        log::debug!(
            "QR raster: {} modules, scale {:.3}, {}x{} px",
            modules, scale, symbol_size, symbol_size
        );

        Ok(img)
    }
}

/// Наименьшая версия, в которую влезает текст на уровне M
fn build_code(data: &str) -> Result<QrCode, QrError> {
    let bytes = data.as_bytes();
    for number in 1..=40 {
        let version = Version::Normal(number);
        let mut bits = Bits::new(version);
        let pushed = bits
            .push_segments(bytes, Optimizer::new(text_segments(bytes).into_iter(), version))
            .and_then(|()| bits.push_terminator(EcLevel::M));
        match pushed {
            Ok(()) => return QrCode::with_bits(bits, EcLevel::M),
            Err(QrError::DataTooLong) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(QrError::DataTooLong)
}

/// Сегменты без Kanji режима: парсер принимает пары байт UTF-8 за Shift-JIS,
/// и сканер прочитал бы другие иероглифы. Такие куски кодируются байтами.
fn text_segments(bytes: &[u8]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for mut segment in Parser::new(bytes) {
        if segment.mode == Mode::Kanji {
            segment.mode = Mode::Byte;
        }
        match segments.last_mut() {
            Some(last) if last.mode == segment.mode && last.end == segment.begin => {
                last.end = segment.end;
            }
            _ => segments.push(segment),
        }
    }
    segments
}
