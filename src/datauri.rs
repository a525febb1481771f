use base64::{engine::general_purpose, Engine as _};
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};

const PNG_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, thiserror::Error)]
pub enum DataUriError {
    #[error("not a data URI")]
    MissingScheme,
    #[error("data URI is not base64 encoded")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Payload(#[from] base64::DecodeError),
}

/// Кодирует RGBA изображение в PNG байты
pub fn png_bytes(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut png_bytes = Vec::new();
    let encoder = PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(png_bytes)
}

pub fn encode_png(png: &[u8]) -> String {
    format!("{}{}", PNG_PREFIX, general_purpose::STANDARD.encode(png))
}

/// Достаёт байты из `data:<mime>;base64,<payload>`
pub fn decode(uri: &str) -> Result<Vec<u8>, DataUriError> {
    let rest = uri.strip_prefix("data:").ok_or(DataUriError::MissingScheme)?;
    let (meta, payload) = rest.split_once(',').ok_or(DataUriError::MissingScheme)?;
    if !meta.ends_with(";base64") {
        return Err(DataUriError::NotBase64);
    }
    Ok(general_purpose::STANDARD.decode(payload.trim())?)
}

/// Загрузка логотипа приходит либо как data URI (FileReader), либо как голый base64
pub fn decode_upload(data: &str) -> Result<Vec<u8>, DataUriError> {
    if data.starts_with("data:") {
        decode(data)
    } else {
        Ok(general_purpose::STANDARD.decode(data.trim())?)
    }
}
