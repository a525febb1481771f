use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::generator::QrGenerator;

/// Вкладка браузера со своим генератором
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub generator: Arc<QrGenerator>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Сессии живут только в памяти процесса
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Сохранить сессию
    pub async fn save_session(&self, session: Session) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        log::debug!("Session {} saved to storage", session.id);
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Получить сессию и продлить её до `expires_at`
    pub async fn touch_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Session>> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) if now <= session.expires_at => {
                session.expires_at = expires_at;
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    /// Удалить сессию
    pub async fn delete_session(&self, session_id: &str) -> anyhow::Result<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(session_id).is_some())
    }

    /// Очистить просроченные сессии
    pub async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| now <= session.expires_at);
        let count = before - sessions.len();

        if count > 0 {
            log::info!("Cleaned up {} expired sessions", count);
        }

        Ok(count)
    }

    /// Получить статистику
    pub async fn get_stats(&self, now: DateTime<Utc>) -> anyhow::Result<StorageStats> {
        let sessions = self.sessions.read().await;
        let total = sessions.len();
        let expired = sessions.values().filter(|s| now > s.expires_at).count();

        Ok(StorageStats {
            total,
            active: total - expired,
            expired,
        })
    }
}

#[derive(Debug, serde::Serialize, PartialEq, Eq)]
pub struct StorageStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use chrono::{Duration, TimeZone};

    fn session(id: &str, created_at: DateTime<Utc>, ttl: Duration) -> Session {
        Session {
            id: id.to_string(),
            generator: Arc::new(QrGenerator::new(&GeneratorConfig::default())),
            created_at,
            expires_at: created_at + ttl,
        }
    }

    #[tokio::test]
    async fn touch_extends_live_sessions_only() {
        let store = SessionStore::new();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        store.save_session(session("a", t0, Duration::minutes(10))).await.unwrap();

        let t1 = t0 + Duration::minutes(5);
        let touched = store
            .touch_session("a", t1, t1 + Duration::minutes(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(touched.expires_at, t0 + Duration::minutes(15));

        let late = t0 + Duration::minutes(30);
        assert!(store.touch_session("a", late, late).await.unwrap().is_none());
        assert!(store.touch_session("missing", t0, t0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired() {
        let store = SessionStore::new();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        store.save_session(session("short", t0, Duration::minutes(1))).await.unwrap();
        store.save_session(session("long", t0, Duration::minutes(60))).await.unwrap();

        let now = t0 + Duration::minutes(2);
        assert_eq!(
            store.get_stats(now).await.unwrap(),
            StorageStats {
                total: 2,
                active: 1,
                expired: 1
            }
        );
        assert_eq!(store.cleanup_expired_sessions(now).await.unwrap(), 1);
        assert_eq!(store.get_stats(now).await.unwrap().total, 1);

        assert!(store.delete_session("long").await.unwrap());
        assert!(!store.delete_session("long").await.unwrap());
    }
}
