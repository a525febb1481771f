use chrono::{DateTime, Datelike, Utc};

/// Источник текущего времени. В тестах подменяется на `FixedClock`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Строка копирайта для подвала страницы, год берётся в момент рендера
pub fn copyright_line(clock: &dyn Clock, holder: &str) -> String {
    format!("© {} {}. All rights reserved.", clock.now().year(), holder)
}
