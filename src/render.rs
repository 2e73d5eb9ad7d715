//! Transcript presentation: markdown → HTML.
//!
//! Assistant replies are markdown; embedding surfaces (the host bridge's
//! consumers) want HTML with highlighted code blocks. Pure functions of the
//! state snapshot — no business logic here.

use crate::worker::messages::{ChatMessage, Role};

/// Render markdown text to HTML via `pulldown_cmark`.
///
/// Code blocks get syntax highlighting via `syntect`.
pub fn render_markdown_html(content: &str) -> String {
    use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

    let options =
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;

    let parser = Parser::new_ext(content, options);

    let mut html_output = String::new();
    let mut code_buf = String::new();
    let mut code_lang = String::new();
    let mut in_code_block = false;

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                code_buf.clear();
                code_lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                let highlighted = highlight_code_block(&code_buf, &code_lang);
                html_output.push_str(&highlighted);
            }
            Event::Text(text) if in_code_block => {
                code_buf.push_str(&text);
            }
            other => {
                if !in_code_block {
                    let mut tmp = String::new();
                    pulldown_cmark::html::push_html(&mut tmp, std::iter::once(other));
                    html_output.push_str(&tmp);
                }
            }
        }
    }

    html_output
}

/// Highlight a code block using `syntect`.
///
/// Returns a `<pre><code>` block with inline CSS colors. Falls back to plain
/// escaped code if the language is unknown or highlighting fails.
pub fn highlight_code_block(code: &str, lang: &str) -> String {
    use syntect::highlighting::ThemeSet;
    use syntect::html::highlighted_html_for_string;
    use syntect::parsing::SyntaxSet;

    let ss = SyntaxSet::load_defaults_newlines();
    let ts = ThemeSet::load_defaults();
    let theme = &ts.themes["base16-ocean.dark"];

    let syntax = if lang.is_empty() {
        ss.find_syntax_plain_text()
    } else {
        ss.find_syntax_by_token(lang)
            .unwrap_or_else(|| ss.find_syntax_plain_text())
    };

    match highlighted_html_for_string(code, &ss, syntax, theme) {
        Ok(html) => html,
        Err(_) => format!("<pre><code>{}</code></pre>", escape_html(code)),
    }
}

/// Render a whole transcript as HTML.
///
/// User messages are escaped plain text; assistant messages are rendered as
/// markdown. Each message is wrapped in a `<div>` carrying its role as a
/// class, so consumers can style the two sides.
pub fn render_transcript_html(messages: &[ChatMessage]) -> String {
    let mut html = String::new();
    for message in messages {
        match message.role {
            Role::User => {
                html.push_str("<div class=\"message user\"><p>");
                html.push_str(&escape_html(&message.content));
                html.push_str("</p></div>\n");
            }
            Role::Assistant => {
                html.push_str("<div class=\"message assistant\">");
                html.push_str(&render_markdown_html(&message.content));
                html.push_str("</div>\n");
            }
            // System instructions are model context, not transcript.
            Role::System => {}
        }
    }
    html
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
