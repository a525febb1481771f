use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::color::{ColorPair, HexColor};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub generator: GeneratorConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub copyright_holder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub width: u32,
    /// Рамка в модулях, может быть дробной
    pub margin: f64,
    pub default_colors: ColorPair,
    pub max_text_len: usize,
    pub logo_radius: u32,
    pub logo_padding: u32,
    pub max_logo_bytes: usize,
    pub download_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
    pub cleanup_interval_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            width: 800,
            margin: 1.5,
            default_colors: ColorPair {
                dark: HexColor::new(0xFF, 0xB7, 0x00, 0xFF),
                light: HexColor::WHITE,
            },
            max_text_len: 100,
            logo_radius: 50,
            logo_padding: 4,
            max_logo_bytes: 5 * 1024 * 1024,
            download_name: "qrcode.png".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // Загружаем из переменных окружения или используем дефолты
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = GeneratorConfig::default();

        let config = Config {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                port: parse_or(&lookup, "PORT", 3001)?,
                copyright_holder: lookup("COPYRIGHT_HOLDER")
                    .unwrap_or_else(|| "QR Studio".to_string()),
            },
            generator: GeneratorConfig {
                width: parse_or(&lookup, "QR_WIDTH", defaults.width)?,
                margin: parse_or(&lookup, "QR_MARGIN", defaults.margin)?,
                default_colors: ColorPair {
                    dark: parse_or(&lookup, "QR_DARK_COLOR", defaults.default_colors.dark)?,
                    light: parse_or(&lookup, "QR_LIGHT_COLOR", defaults.default_colors.light)?,
                },
                max_text_len: parse_or(&lookup, "QR_MAX_TEXT_LEN", defaults.max_text_len)?,
                logo_radius: parse_or(&lookup, "QR_LOGO_RADIUS", defaults.logo_radius)?,
                logo_padding: parse_or(&lookup, "QR_LOGO_PADDING", defaults.logo_padding)?,
                max_logo_bytes: parse_or(&lookup, "QR_MAX_LOGO_BYTES", defaults.max_logo_bytes)?,
                download_name: defaults.download_name,
            },
            session: SessionConfig {
                ttl_minutes: parse_or(&lookup, "SESSION_TTL_MINUTES", 60)?,
                cleanup_interval_secs: 60,
            },
        };

        // Валидация конфигурации
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let generator = &self.generator;

        if generator.width == 0 {
            anyhow::bail!("QR width must be positive");
        }

        if !generator.margin.is_finite() || generator.margin < 0.0 {
            anyhow::bail!("QR margin must be a non-negative number, got {}", generator.margin);
        }

        if generator.max_text_len == 0 {
            anyhow::bail!("Max text length must be positive");
        }

        // Подложка логотипа должна помещаться в QR код
        // В u64 сумма и удвоение двух u32 не переполняются
        let backdrop = 2 * (u64::from(generator.logo_radius) + u64::from(generator.logo_padding));
        if generator.logo_radius == 0 || backdrop >= u64::from(generator.width) {
            anyhow::bail!(
                "Logo backdrop of {} px does not fit into a {} px QR code",
                backdrop,
                generator.width
            );
        }

        if self.session.ttl_minutes <= 0 {
            anyhow::bail!("Session TTL must be positive");
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", key, raw, e)),
        None => Ok(default),
    }
}
