//! Notes buffer → minimal printable HTML.
//!
//! Only a small Markdown subset is understood: `#`/`##`/`###` headings,
//! `**bold**`, `*italic*` and `- ` bullets. Everything else is escaped and
//! kept line by line. The conversion is one-way.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,3}) (.*)$").expect("valid regex"));
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*- (.*)$").expect("valid regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+?)\*").expect("valid regex"));

const STYLE: &str = "body { font-family: 'Noto Sans TC', sans-serif; padding: 40px; line-height: 1.6; color: #333; }\n\
h1 { border-bottom: 2px solid #eee; padding-bottom: 10px; }\n\
h2 { margin-top: 20px; }\n\
li { margin-bottom: 5px; }";

/// Render `notes` as a standalone HTML document titled "Notes Export".
pub fn notes_to_html(notes: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Notes Export</title>\n<style>\n{STYLE}\n</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        notes_body(notes)
    )
}

/// The `<body>` contents for `notes`.
pub fn notes_body(notes: &str) -> String {
    let mut out = String::new();
    let mut in_list = false;

    for line in notes.lines() {
        if let Some(caps) = BULLET.captures(line) {
            if !in_list {
                out.push_str("<ul>\n");
                in_list = true;
            }
            out.push_str(&format!("<li>{}</li>\n", inline(&caps[1])));
            continue;
        }
        if in_list {
            out.push_str("</ul>\n");
            in_list = false;
        }

        if let Some(caps) = HEADING.captures(line) {
            let level = caps[1].len();
            out.push_str(&format!("<h{level}>{}</h{level}>\n", inline(&caps[2])));
        } else if line.trim().is_empty() {
            out.push_str("<br>\n");
        } else {
            out.push_str(&format!("{}<br>\n", inline(line)));
        }
    }
    if in_list {
        out.push_str("</ul>\n");
    }
    out
}

fn inline(text: &str) -> String {
    let escaped = escape(text);
    let bolded = BOLD.replace_all(&escaped, "<b>$1</b>");
    ITALIC.replace_all(&bolded, "<i>$1</i>").into_owned()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
