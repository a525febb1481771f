use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::color::HexColor;
use crate::config::Config;
use crate::datauri;
use crate::generator::{GeneratorView, Logo, QrGenerator};
use crate::presenter::Download;
use crate::storage::{Session, SessionStore, StorageStats};

#[derive(Clone)]
pub struct SessionService {
    storage: SessionStore,
    config: Config,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
pub struct SetTextRequest {
    pub text: String,
}

/// Значения color picker'а, `#RRGGBB` дополняется альфой `FF`
#[derive(Debug, Deserialize)]
pub struct SetColorsRequest {
    pub dark: Option<String>,
    pub light: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetLogoRequest {
    pub file_name: String,
    /// base64 или data URI из FileReader
    pub data: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct SessionView {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub generator: GeneratorView,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub data: Option<SessionView>,
    pub error: Option<String>,
}

impl SessionService {
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage: SessionStore::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Новая вкладка получает свой генератор с цветами по умолчанию
    pub async fn create_session(&self) -> anyhow::Result<SessionView> {
        let session_id = format!("qr_{}", Uuid::new_v4().simple());
        let now = self.clock.now();
        let session = Session {
            id: session_id.clone(),
            generator: Arc::new(QrGenerator::new(&self.config.generator)),
            created_at: now,
            expires_at: now + self.ttl(),
        };

        let view = session_view(&session, session.generator.view().await);
        self.storage.save_session(session).await?;

        log::info!("Session created: {}", session_id);

        Ok(view)
    }

    pub async fn get_session(&self, session_id: &str) -> anyhow::Result<Option<SessionView>> {
        let Some(session) = self.find(session_id).await? else {
            return Ok(None);
        };
        let view = session.generator.view().await;
        Ok(Some(session_view(&session, view)))
    }

    pub async fn set_text(
        &self,
        session_id: &str,
        request: SetTextRequest,
    ) -> anyhow::Result<Option<SessionView>> {
        let Some(session) = self.find(session_id).await? else {
            return Ok(None);
        };
        let view = session.generator.set_text(request.text).await;
        Ok(Some(session_view(&session, view)))
    }

    pub async fn set_colors(
        &self,
        session_id: &str,
        request: SetColorsRequest,
    ) -> anyhow::Result<Option<SessionView>> {
        // Сначала проверяем цвета, чтобы не пересчитывать QR на мусорном вводе
        let dark = request.dark.as_deref().map(str::parse::<HexColor>).transpose()?;
        let light = request.light.as_deref().map(str::parse::<HexColor>).transpose()?;

        let Some(session) = self.find(session_id).await? else {
            return Ok(None);
        };
        let view = session.generator.set_colors(dark, light).await;
        Ok(Some(session_view(&session, view)))
    }

    pub async fn set_logo(
        &self,
        session_id: &str,
        request: SetLogoRequest,
    ) -> anyhow::Result<Option<SessionView>> {
        let bytes = datauri::decode_upload(&request.data)?;
        let limit = self.config.generator.max_logo_bytes;
        if bytes.len() > limit {
            anyhow::bail!("Logo is too large: {} bytes, limit is {}", bytes.len(), limit);
        }
        if request.file_name.trim().is_empty() {
            anyhow::bail!("Logo file name is empty");
        }

        let Some(session) = self.find(session_id).await? else {
            return Ok(None);
        };

        log::info!(
            "Session {}: logo {} ({} bytes) attached",
            session_id,
            request.file_name,
            bytes.len()
        );
        let view = session
            .generator
            .set_logo(Logo::new(request.file_name, bytes))
            .await;
        Ok(Some(session_view(&session, view)))
    }

    pub async fn clear_logo(&self, session_id: &str) -> anyhow::Result<Option<SessionView>> {
        let Some(session) = self.find(session_id).await? else {
            return Ok(None);
        };
        let view = session.generator.clear_logo().await;
        Ok(Some(session_view(&session, view)))
    }

    /// `Ok(None)`, если сессии нет или скачивать пока нечего
    pub async fn download(&self, session_id: &str) -> anyhow::Result<Option<Download>> {
        let Some(session) = self.find(session_id).await? else {
            return Ok(None);
        };
        let download = session.generator.download().await?;
        if download.is_some() {
            log::info!("Session {}: QR code downloaded", session_id);
        }
        Ok(download)
    }

    pub async fn delete_session(&self, session_id: &str) -> anyhow::Result<bool> {
        self.storage.delete_session(session_id).await
    }

    /// Очистка просроченных сессий
    pub async fn cleanup_expired_sessions(&self) -> anyhow::Result<usize> {
        self.storage.cleanup_expired_sessions(self.clock.now()).await
    }

    pub async fn stats(&self) -> anyhow::Result<StorageStats> {
        self.storage.get_stats(self.clock.now()).await
    }

    async fn find(&self, session_id: &str) -> anyhow::Result<Option<Session>> {
        let now = self.clock.now();
        self.storage
            .touch_session(session_id, now, now + self.ttl())
            .await
    }

    fn ttl(&self) -> Duration {
        Duration::minutes(self.config.session.ttl_minutes)
    }
}

fn session_view(session: &Session, generator: GeneratorView) -> SessionView {
    SessionView {
        id: session.id.clone(),
        created_at: session.created_at,
        expires_at: session.expires_at,
        generator,
    }
}
