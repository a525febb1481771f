use crate::datauri;

/// Готовый к скачиванию файл
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Показ результата и выдача его как файла.
///
/// Флаг `downloaded` односторонний: после первого скачивания он больше не сбрасывается,
/// даже если пользователь продолжает редактировать ввод.
#[derive(Debug, Clone)]
pub struct Presenter {
    download_name: String,
    output: Option<String>,
    downloaded: bool,
}

impl Presenter {
    pub fn new(download_name: impl Into<String>) -> Self {
        Self {
            download_name: download_name.into(),
            output: None,
            downloaded: false,
        }
    }

    pub fn show(&mut self, data_uri: String) {
        self.output = Some(data_uri);
    }

    pub fn clear(&mut self) {
        self.output = None;
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    pub fn downloaded(&self) -> bool {
        self.downloaded
    }

    /// Отдать текущий результат как PNG. Без результата скачивать нечего.
    pub fn download(&mut self) -> anyhow::Result<Option<Download>> {
        let Some(uri) = self.output.as_deref() else {
            return Ok(None);
        };

        let bytes = datauri::decode(uri)?;
        self.downloaded = true;

        Ok(Some(Download {
            file_name: self.download_name.clone(),
            content_type: "image/png",
            bytes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_to_download_without_output() {
        let mut presenter = Presenter::new("qrcode.png");
        assert!(presenter.download().unwrap().is_none());
        assert!(!presenter.downloaded());
    }

    #[test]
    fn download_sets_sticky_flag() {
        let mut presenter = Presenter::new("qrcode.png");
        presenter.show("data:image/png;base64,aGVsbG8=".to_string());

        let file = presenter.download().unwrap().unwrap();
        assert_eq!(file.file_name, "qrcode.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.bytes, b"hello");
        assert!(presenter.downloaded());

        presenter.clear();
        presenter.show("data:image/png;base64,d29ybGQ=".to_string());
        assert!(presenter.downloaded());
    }
}
