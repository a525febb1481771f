/// Ошибка ввода, которую видит пользователь под полем ввода
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Link or text cannot exceed {max} characters!")]
    TooLong { max: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_len: usize,
}

impl Validator {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// `Ok(None)` для пустого ввода: вывод очищается без ошибки.
    ///
    /// Длина считается в UTF-16 единицах, как у `maxlength` текстового поля.
    pub fn validate<'a>(&self, text: &'a str) -> Result<Option<&'a str>, InputError> {
        if text.is_empty() {
            return Ok(None);
        }

        if text.encode_utf16().count() > self.max_len {
            return Err(InputError::TooLong { max: self.max_len });
        }

        Ok(Some(text))
    }
}
