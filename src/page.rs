//! HTML страница генератора. Шаблон статический, при рендере подставляются только
//! лимит ввода, имя файла для скачивания и строка копирайта.

use crate::clock::{self, Clock};
use crate::config::Config;

const TEMPLATE: &str = include_str!("../static/index.html");

pub fn render(config: &Config, clock: &dyn Clock) -> String {
    let copyright = clock::copyright_line(clock, &config.server.copyright_holder);

    TEMPLATE
        .replace("{{MAX_TEXT_LEN}}", &config.generator.max_text_len.to_string())
        .replace("{{DOWNLOAD_NAME}}", &escape_html(&config.generator.download_name))
        .replace("{{COPYRIGHT}}", &escape_html(&copyright))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
