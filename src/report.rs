//! Plain text documents to static HTML.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result as AnyhowResult};

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

#[derive(PartialEq)]
enum Block {
    None,
    Paragraph,
    List,
}

fn close(html: &mut String, block: &mut Block) {
    match block {
        Block::Paragraph => html.push_str("</p>\n"),
        Block::List => html.push_str("</ul>\n"),
        Block::None => {}
    }
    *block = Block::None;
}

/// Renders the markup: `=` headings (one to three), `* ` bullets and
/// blank-line separated paragraphs.
pub fn render_html(title: &str, source: &str) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n",
        escape(title)
    );
    let mut block = Block::None;

    for line in source.lines() {
        let trimmed = line.trim();

        let level = trimmed.chars().take_while(|&c| c == '=').count();
        if (1..=3).contains(&level) && trimmed[level..].starts_with(' ') {
            close(&mut html, &mut block);
            let text = trimmed[level..].trim().trim_end_matches('=').trim_end();
            html.push_str(&format!("<h{level}>{}</h{level}>\n", escape(text)));
        } else if let Some(item) = trimmed.strip_prefix("* ") {
            if block != Block::List {
                close(&mut html, &mut block);
                html.push_str("<ul>\n");
                block = Block::List;
            }
            html.push_str(&format!("<li>{}</li>\n", escape(item.trim())));
        } else if trimmed.is_empty() {
            close(&mut html, &mut block);
        } else {
            if block == Block::Paragraph {
                html.push('\n');
            } else {
                close(&mut html, &mut block);
                html.push_str("<p>");
                block = Block::Paragraph;
            }
            html.push_str(&escape(trimmed));
        }
    }
    close(&mut html, &mut block);

    html.push_str("</body>\n</html>\n");
    html
}

/// Converts `source` and writes the result next to it with an `.html` extension.
pub fn generate(source: &Path) -> AnyhowResult<PathBuf> {
    let text = fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let title = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let target = source.with_extension("html");
    fs::write(&target, render_html(&title, &text))
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(target)
}
