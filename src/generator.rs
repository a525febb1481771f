//! Генератор QR кода: состояние ввода, валидация, рендер и публикация результата.
//!
//! Каждое изменение ввода выдаёт новый номер запроса. Рендер идёт вне блокировки,
//! а результат принимается, только если его номер всё ещё последний выданный.
//! Устаревшие рендеры, закончившиеся позже новых, отбрасываются.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task;

use crate::color::{ColorPair, HexColor};
use crate::compose::{ComposeError, Compositor};
use crate::config::GeneratorConfig;
use crate::datauri;
use crate::presenter::{Download, Presenter};
use crate::qr::{EncodeError, QrEncoder};
use crate::validate::Validator;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error("failed to encode composite: {0}")]
    Png(#[from] image::ImageError),
    #[error("render task failed: {0}")]
    Join(#[from] task::JoinError),
    #[error("superseded by a newer request")]
    Superseded,
}

/// Загруженный пользователем логотип. Байты разделяются между запросами без копирования.
#[derive(Clone)]
pub struct Logo {
    file_name: String,
    bytes: Arc<[u8]>,
}

impl Logo {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl fmt::Debug for Logo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logo")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Inputs {
    text: String,
    colors: ColorPair,
    logo: Option<Logo>,
}

#[derive(Debug)]
struct State {
    inputs: Inputs,
    error: Option<String>,
    presenter: Presenter,
    /// Номер запроса, чей результат сейчас показан
    generation: u64,
}

/// Снимок ввода, привязанный к номеру запроса
#[derive(Debug)]
struct Ticket {
    token: u64,
    inputs: Inputs,
}

enum Outcome {
    Cleared,
    Rejected(String),
    Accepted,
    Rendered(String),
}

/// Состояние для отображения на странице
#[derive(Debug, Clone, Serialize)]
pub struct GeneratorView {
    pub text: String,
    pub dark_color: HexColor,
    pub light_color: HexColor,
    pub logo_name: Option<String>,
    pub error: Option<String>,
    pub qr_code: Option<String>,
    pub downloaded: bool,
    pub download_name: String,
    pub generation: u64,
}

/// Цепочка рендера: QR растр, затем (если есть логотип) подложка и логотип
#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    encoder: QrEncoder,
    compositor: Compositor,
}

impl Pipeline {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            encoder: QrEncoder::new(config.width, config.margin),
            compositor: Compositor::new(config.logo_radius, config.logo_padding),
        }
    }

    /// `is_current` проверяется перед каждым этапом: устаревший запрос
    /// бросает работу, не дожидаясь отказа при коммите.
    pub async fn render<F>(
        &self,
        text: String,
        colors: ColorPair,
        logo: Option<Logo>,
        is_current: F,
    ) -> Result<String, RenderError>
    where
        F: Fn() -> bool,
    {
        let proceed = || if is_current() { Ok(()) } else { Err(RenderError::Superseded) };

        proceed()?;
        let encoder = self.encoder;
        let qr_code = task::spawn_blocking(move || encoder.encode(&text, colors)).await??;

        let Some(logo) = logo else {
            return Ok(qr_code);
        };

        proceed()?;
        let compositor = self.compositor;
        let mut surface = task::spawn_blocking(move || {
            let mut surface = Compositor::load_surface(&qr_code)?;
            compositor.paint_backdrop(&mut surface);
            Ok::<_, ComposeError>(surface)
        })
        .await??;

        proceed()?;
        let logo_image = task::spawn_blocking(move || Compositor::decode_logo(&logo.bytes)).await??;

        proceed()?;
        let composite = task::spawn_blocking(move || {
            compositor.draw_logo(&mut surface, &logo_image);
            datauri::png_bytes(&surface)
        })
        .await??;

        Ok(datauri::encode_png(&composite))
    }
}

pub struct QrGenerator {
    pipeline: Pipeline,
    validator: Validator,
    state: RwLock<State>,
    latest: AtomicU64,
}

impl QrGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            pipeline: Pipeline::new(config),
            validator: Validator::new(config.max_text_len),
            state: RwLock::new(State {
                inputs: Inputs {
                    text: String::new(),
                    colors: config.default_colors,
                    logo: None,
                },
                error: None,
                presenter: Presenter::new(config.download_name.clone()),
                generation: 0,
            }),
            latest: AtomicU64::new(0),
        }
    }

    pub async fn set_text(&self, text: impl Into<String>) -> GeneratorView {
        let text = text.into();
        let ticket = self.stage(move |inputs| inputs.text = text).await;
        self.finish(ticket).await
    }

    pub async fn set_colors(&self, dark: Option<HexColor>, light: Option<HexColor>) -> GeneratorView {
        let ticket = self
            .stage(move |inputs| {
                if let Some(dark) = dark {
                    inputs.colors.dark = dark;
                }
                if let Some(light) = light {
                    inputs.colors.light = light;
                }
            })
            .await;
        self.finish(ticket).await
    }

    pub async fn set_logo(&self, logo: Logo) -> GeneratorView {
        let ticket = self.stage(move |inputs| inputs.logo = Some(logo)).await;
        self.finish(ticket).await
    }

    pub async fn clear_logo(&self) -> GeneratorView {
        let ticket = self.stage(|inputs| inputs.logo = None).await;
        self.finish(ticket).await
    }

    /// Полный пересчёт без изменения ввода
    pub async fn regenerate(&self) -> GeneratorView {
        let ticket = self.stage(|_| {}).await;
        self.finish(ticket).await
    }

    pub async fn view(&self) -> GeneratorView {
        let state = self.state.read().await;
        GeneratorView {
            text: state.inputs.text.clone(),
            dark_color: state.inputs.colors.dark,
            light_color: state.inputs.colors.light,
            logo_name: state.inputs.logo.as_ref().map(|l| l.file_name().to_string()),
            error: state.error.clone(),
            qr_code: state.presenter.output().map(str::to_string),
            downloaded: state.presenter.downloaded(),
            download_name: state.presenter.download_name().to_string(),
            generation: state.generation,
        }
    }

    pub async fn download(&self) -> anyhow::Result<Option<Download>> {
        self.state.write().await.presenter.download()
    }

    /// Изменить ввод и выдать номер запроса под одной блокировкой,
    /// чтобы больший номер всегда видел более свежий ввод
    async fn stage<F>(&self, update: F) -> Ticket
    where
        F: FnOnce(&mut Inputs),
    {
        let mut state = self.state.write().await;
        update(&mut state.inputs);
        let token = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        Ticket {
            token,
            inputs: state.inputs.clone(),
        }
    }

    async fn finish(&self, ticket: Ticket) -> GeneratorView {
        let Ticket { token, inputs } = ticket;

        let verdict = self.validator.validate(&inputs.text).map(|text| text.is_some());

        match verdict {
            Ok(false) => {
                self.commit(token, Outcome::Cleared).await;
            }
            Err(e) => {
                self.commit(token, Outcome::Rejected(e.to_string())).await;
            }
            Ok(true) => {
                if self.commit(token, Outcome::Accepted).await {
                    let is_current = || self.latest.load(Ordering::SeqCst) == token;
                    let rendered = self
                        .pipeline
                        .render(inputs.text, inputs.colors, inputs.logo, is_current)
                        .await;
                    match rendered {
                        Ok(qr_code) => {
                            self.commit(token, Outcome::Rendered(qr_code)).await;
                        }
                        Err(RenderError::Superseded) => {
                            log::debug!("QR generation #{} abandoned, a newer request is pending", token);
                        }
                        // Прошлый результат остаётся на экране
                        Err(e) => log::error!("QR generation #{} failed: {}", token, e),
                    }
                }
            }
        }

        self.view().await
    }

    async fn commit(&self, token: u64, outcome: Outcome) -> bool {
        let mut state = self.state.write().await;
        let latest = self.latest.load(Ordering::SeqCst);
        if token != latest {
            log::debug!("Discarding QR generation #{} (latest is #{})", token, latest);
            return false;
        }

        match outcome {
            Outcome::Cleared => {
                state.error = None;
                state.presenter.clear();
            }
            Outcome::Rejected(message) => {
                state.error = Some(message);
                state.presenter.clear();
            }
            Outcome::Accepted => {
                state.error = None;
            }
            Outcome::Rendered(qr_code) => {
                state.presenter.show(qr_code);
            }
        }
        state.generation = token;

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn config() -> GeneratorConfig {
        GeneratorConfig::default()
    }

    fn logo_png(color: Rgba<u8>) -> Vec<u8> {
        datauri::png_bytes(&RgbaImage::from_pixel(64, 64, color)).unwrap()
    }

    fn decode_output(view: &GeneratorView) -> RgbaImage {
        let uri = view.qr_code.as_deref().expect("output should be present");
        image::load_from_memory(&datauri::decode(uri).unwrap())
            .unwrap()
            .to_rgba8()
    }

    fn plain_qr(text: &str, colors: ColorPair) -> String {
        QrEncoder::new(800, 1.5).encode(text, colors).unwrap()
    }

    #[tokio::test]
    async fn url_with_default_colors_renders_png() {
        let generator = QrGenerator::new(&config());
        let view = generator.set_text("https://example.com").await;

        assert!(view.error.is_none());
        let uri = view.qr_code.as_deref().unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(decode_output(&view).dimensions(), (800, 800));
    }

    #[tokio::test]
    async fn over_long_text_shows_error_and_clears_output() {
        let generator = QrGenerator::new(&config());
        generator.set_text("hello").await;

        let view = generator.set_text("a".repeat(101)).await;
        assert_eq!(view.error.as_deref(), Some("Link or text cannot exceed 100 characters!"));
        assert!(view.qr_code.is_none());
    }

    #[tokio::test]
    async fn empty_text_clears_output_without_error() {
        let generator = QrGenerator::new(&config());
        generator.set_text("a".repeat(101)).await;
        generator.set_text("hello").await;

        let view = generator.set_text("").await;
        assert!(view.error.is_none());
        assert!(view.qr_code.is_none());
    }

    #[tokio::test]
    async fn fixing_the_text_removes_the_error() {
        let generator = QrGenerator::new(&config());
        generator.set_text("a".repeat(101)).await;

        let view = generator.set_text("a".repeat(100)).await;
        assert!(view.error.is_none());
        assert!(view.qr_code.is_some());
    }

    #[tokio::test]
    async fn color_change_regenerates_deterministically() {
        let generator = QrGenerator::new(&config());
        let before = generator.set_text("hello").await;
        assert_eq!(before.qr_code.as_deref(), Some(plain_qr("hello", config().default_colors).as_str()));

        let black: HexColor = "#000000FF".parse().unwrap();
        let after = generator.set_colors(Some(black), None).await;
        let expected = plain_qr(
            "hello",
            ColorPair {
                dark: black,
                light: HexColor::WHITE,
            },
        );
        assert_eq!(after.qr_code.as_deref(), Some(expected.as_str()));
        assert_eq!(after.dark_color, black);

        let again = generator.regenerate().await;
        assert_eq!(again.qr_code, after.qr_code);
    }

    #[tokio::test]
    async fn logo_sits_on_white_backdrop_even_on_dark_background() {
        let generator = QrGenerator::new(&config());
        let black: HexColor = "#000000FF".parse().unwrap();
        generator.set_colors(None, Some(black)).await;
        generator.set_text("https://example.com").await;

        let view = generator
            .set_logo(Logo::new("logo.png", logo_png(Rgba([0, 0, 255, 255]))))
            .await;
        assert_eq!(view.logo_name.as_deref(), Some("logo.png"));

        let img = decode_output(&view);
        let center = img.get_pixel(400, 400);
        assert!(center[2] > 240 && center[0] < 15, "logo pixel {center:?}");
        // подложка видна между краем логотипа и краем круга
        assert_eq!(*img.get_pixel(400, 452), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(452, 400), Rgba([255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn clearing_logo_returns_to_plain_output() {
        let generator = QrGenerator::new(&config());
        generator.set_text("hello").await;
        let with_logo = generator
            .set_logo(Logo::new("logo.png", logo_png(Rgba([255, 0, 0, 255]))))
            .await;
        assert_ne!(with_logo.qr_code.as_deref(), Some(plain_qr("hello", config().default_colors).as_str()));

        let view = generator.clear_logo().await;
        assert!(view.logo_name.is_none());
        assert_eq!(view.qr_code.as_deref(), Some(plain_qr("hello", config().default_colors).as_str()));
    }

    #[tokio::test]
    async fn broken_logo_keeps_previous_output() {
        let generator = QrGenerator::new(&config());
        let before = generator.set_text("hello").await;

        let view = generator.set_logo(Logo::new("notes.txt", b"not an image".to_vec())).await;
        assert_eq!(view.qr_code, before.qr_code);
        assert!(view.error.is_none());
        assert_eq!(view.logo_name.as_deref(), Some("notes.txt"));
    }

    #[tokio::test]
    async fn encoding_failure_keeps_previous_output() {
        let generator = QrGenerator::new(&GeneratorConfig {
            max_text_len: 10_000,
            ..config()
        });
        let before = generator.set_text("hello").await;

        // больше, чем вмещает QR версии 40 с уровнем M
        let view = generator.set_text("x".repeat(4000)).await;
        assert!(view.error.is_none());
        assert_eq!(view.qr_code, before.qr_code);
        assert_eq!(view.generation, before.generation + 1);
    }

    #[tokio::test]
    async fn stale_render_cannot_overwrite_newer_request() {
        let generator = QrGenerator::new(&config());

        let stale = generator.stage(|inputs| inputs.text = "first".to_string()).await;
        let fresh = generator.stage(|inputs| inputs.text = "second".to_string()).await;
        let fresh_token = fresh.token;

        generator.finish(fresh).await;
        let view = generator.finish(stale).await;

        assert_eq!(view.text, "second");
        assert_eq!(view.generation, fresh_token);
        assert_eq!(view.qr_code.as_deref(), Some(plain_qr("second", config().default_colors).as_str()));
    }

    #[tokio::test]
    async fn superseded_render_stops_between_stages() {
        let pipeline = Pipeline::new(&config());
        let checks = std::cell::Cell::new(0);
        // актуален только до первого этапа
        let is_current = || {
            checks.set(checks.get() + 1);
            checks.get() == 1
        };

        let logo = Logo::new("logo.png", logo_png(Rgba([0, 0, 255, 255])));
        let result = pipeline
            .render("hello".to_string(), config().default_colors, Some(logo), is_current)
            .await;

        assert!(matches!(result, Err(RenderError::Superseded)));
        assert_eq!(checks.get(), 2);

        let result = pipeline
            .render("hello".to_string(), config().default_colors, None, || false)
            .await;
        assert!(matches!(result, Err(RenderError::Superseded)));
    }

    #[tokio::test]
    async fn stale_render_cannot_resurrect_cleared_output() {
        let generator = QrGenerator::new(&config());

        let stale = generator.stage(|inputs| inputs.text = "hello".to_string()).await;
        let cleared = generator.stage(|inputs| inputs.text.clear()).await;

        generator.finish(cleared).await;
        let view = generator.finish(stale).await;
        assert!(view.qr_code.is_none());
    }

    #[tokio::test]
    async fn concurrent_edits_settle_on_latest_inputs() {
        let generator = QrGenerator::new(&config());

        futures::future::join(generator.set_text("alpha"), generator.set_text("beta")).await;

        let view = generator.view().await;
        assert_eq!(view.qr_code.as_deref(), Some(plain_qr(&view.text, config().default_colors).as_str()));
    }

    #[tokio::test]
    async fn download_flag_survives_later_edits() {
        let generator = QrGenerator::new(&config());
        assert!(generator.download().await.unwrap().is_none());

        generator.set_text("hello").await;
        let file = generator.download().await.unwrap().unwrap();
        assert_eq!(file.file_name, "qrcode.png");
        assert!(image::load_from_memory(&file.bytes).is_ok());

        let view = generator.set_text("world").await;
        assert!(view.downloaded);
        assert_eq!(view.download_name, "qrcode.png");
    }
}
