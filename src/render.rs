//! HTML pages. Templates are compiled in and filled by replacing
//! `{{TOKEN}}` placeholders.

use crate::store::PredictionRecord;

const LOGIN_TEMPLATE: &str = include_str!("assets/login.html");
const HOME_TEMPLATE: &str = include_str!("assets/index.html");
const HISTORY_TEMPLATE: &str = include_str!("assets/history.html");

pub const INVALID_CREDENTIALS: &str = "Invalid credentials. <a href='/'>Try again</a>";

pub fn login_page() -> String {
    LOGIN_TEMPLATE.to_owned()
}

pub fn home_page(username: &str) -> String {
    HOME_TEMPLATE.replace("{{USERNAME}}", &escape_html(username))
}

pub fn history_page(records: &[PredictionRecord]) -> String {
    let rows = if records.is_empty() {
        "            <tr><td colspan=\"4\">No predictions yet.</td></tr>".to_owned()
    } else {
        records.iter().map(history_row).collect::<Vec<_>>().join("\n")
    };

    HISTORY_TEMPLATE.replace("{{ROWS}}", &rows)
}

fn history_row(record: &PredictionRecord) -> String {
    let filename = escape_html(&record.filename);
    format!(
        "            <tr><td><img src=\"/uploads/{0}\" alt=\"{0}\"></td><td>{1}</td><td>{2:.2}%</td><td>{3}</td></tr>",
        filename,
        escape_html(&record.disease),
        record.confidence * 100.0,
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
    )
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
