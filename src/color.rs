use std::fmt;
use std::str::FromStr;

use image::Rgba;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("Invalid hex color: {0}")]
    InvalidHex(String),
}

/// Цвет в формате `#RRGGBBAA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor([u8; 4]);

impl HexColor {
    pub const WHITE: HexColor = HexColor([0xFF, 0xFF, 0xFF, 0xFF]);

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    pub fn to_pixel(self) -> Rgba<u8> {
        Rgba(self.0)
    }
}

impl FromStr for HexColor {
    type Err = ColorError;

    /// Принимает `#RGB`, `#RGBA`, `#RRGGBB` (значение color picker'а) и `#RRGGBBAA`.
    /// Без альфы цвет считается непрозрачным.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ColorError::InvalidHex(s.to_string());
        let digits = s.trim().trim_start_matches('#');

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        // Короткая форма: каждая цифра удваивается (fff -> ffffff)
        let expanded: String = match digits.len() {
            3 | 4 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => digits.to_string(),
            _ => return Err(invalid()),
        };

        let mut rgba = [0xFF_u8; 4];
        for (i, channel) in rgba.iter_mut().enumerate().take(expanded.len() / 2) {
            *channel = u8::from_str_radix(&expanded[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }

        Ok(Self(rgba))
    }
}

impl TryFrom<String> for HexColor {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "#{:02X}{:02X}{:02X}{:02X}", r, g, b, a)
    }
}

/// Пара цветов QR кода: модули (dark) и фон (light)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPair {
    pub dark: HexColor,
    pub light: HexColor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_rgba() {
        let color: HexColor = "#FFB700FF".parse().unwrap();
        assert_eq!(color, HexColor::new(0xFF, 0xB7, 0x00, 0xFF));
        assert_eq!(color.to_string(), "#FFB700FF");
    }

    #[test]
    fn picker_value_gets_opaque_alpha() {
        let color: HexColor = "#1a2b3c".parse().unwrap();
        assert_eq!(color.to_string(), "#1A2B3CFF");
    }

    #[test]
    fn shorthand_is_expanded() {
        assert_eq!("#fff".parse::<HexColor>().unwrap(), HexColor::WHITE);
        assert_eq!(
            "#0008".parse::<HexColor>().unwrap(),
            HexColor::new(0, 0, 0, 0x88)
        );
    }

    #[test]
    fn rejects_bad_lengths_and_digits() {
        for bad in ["", "#12", "#12345", "#1234567", "#123456789", "#GGGGGG", "#12 456"] {
            assert!(bad.parse::<HexColor>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn serde_uses_hex_string() {
        let pair = ColorPair {
            dark: HexColor::new(0, 0, 0, 255),
            light: HexColor::WHITE,
        };
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, r##"{"dark":"#000000FF","light":"#FFFFFFFF"}"##);

        let err = serde_json::from_str::<ColorPair>(r##"{"dark":"nope","light":"#fff"}"##);
        assert!(err.is_err());
    }
}
