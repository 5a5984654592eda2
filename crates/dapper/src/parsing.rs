use crate::error::{DapperError, Result};
use crate::types::{ContentItem, ContentKind, FrontMatter};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use serde_json::{Map, Value};
use std::path::Path;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const FRONT_MATTER_DELIMITER: &str = "---";
const HIGHLIGHT_THEME: &str = "base16-ocean.dark";

pub struct MarkdownRenderer {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
        }
    }

    pub fn render(&self, content: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let mut events = Vec::new();
        let mut code_block: Option<(Option<String>, String)> = None;

        for event in Parser::new_ext(content, options) {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split(|c: char| c == ',' || c.is_whitespace())
                            .next()
                            .filter(|language| !language.is_empty())
                            .map(String::from),
                        CodeBlockKind::Indented => None,
                    };
                    code_block = Some((language, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((language, code)) = code_block.take() {
                        let html = self.highlight(language.as_deref(), &code);
                        events.push(Event::Html(html.into()));
                    }
                }
                Event::Text(text) if code_block.is_some() => {
                    if let Some((_, code)) = code_block.as_mut() {
                        code.push_str(&text);
                    }
                }
                other => events.push(other),
            }
        }

        let mut html_output = String::new();
        pulldown_cmark::html::push_html(&mut html_output, events.into_iter());
        html_output
    }

    fn highlight(&self, language: Option<&str>, code: &str) -> String {
        let Some(language) = language else {
            return format!("<pre><code>{}</code></pre>\n", escape_html(code));
        };

        let highlighted = self
            .syntax_set
            .find_syntax_by_token(language)
            .zip(self.theme_set.themes.get(HIGHLIGHT_THEME))
            .and_then(|(syntax, theme)| {
                highlighted_html_for_string(code, &self.syntax_set, syntax, theme).ok()
            });

        highlighted.unwrap_or_else(|| {
            format!(
                "<pre><code class=\"language-{}\">{}</code></pre>\n",
                escape_html(language),
                escape_html(code)
            )
        })
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn parse_markdown(content: &str) -> String {
    MarkdownRenderer::new().render(content)
}

/// Builds a [`ContentItem`] from the raw bytes of a content file.
/// `relative` is the path below the source root and only used for
/// classification and error reporting.
pub fn parse_content(bytes: &[u8], relative: &Path) -> Result<ContentItem> {
    let text = std::str::from_utf8(bytes).map_err(|error| DapperError::Parse {
        path: relative.to_path_buf(),
        message: format!("not valid UTF-8: {error}"),
    })?;

    let (front_matter, body) = extract_front_matter(text, relative)?;

    Ok(ContentItem {
        source_path: relative.to_path_buf(),
        front_matter,
        body,
        is_markdown: ContentKind::from_path(relative) == ContentKind::Markdown,
    })
}

/// Splits `content` into its front-matter mapping and body.
///
/// The block must open on the very first line and close on a later line,
/// both consisting of exactly `---`. Without an opening line the whole input
/// is body.
pub fn extract_front_matter(content: &str, path: &Path) -> Result<(FrontMatter, String)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let Some(rest) = strip_opening_delimiter(content) else {
        return Ok((FrontMatter::default(), content.to_string()));
    };

    let (yaml_end, body_start) =
        find_closing_delimiter(rest).ok_or_else(|| DapperError::Parse {
            path: path.to_path_buf(),
            message: "front matter block is never closed".to_string(),
        })?;

    let raw = parse_yaml_mapping(&rest[..yaml_end], path)?;

    Ok((FrontMatter { raw }, rest[body_start..].to_string()))
}

fn strip_opening_delimiter(content: &str) -> Option<&str> {
    let (line, rest) = match content.find('\n') {
        Some(index) => (&content[..index], &content[index + 1..]),
        None => (content, ""),
    };

    (line.trim_end_matches('\r') == FRONT_MATTER_DELIMITER).then_some(rest)
}

/// Returns where the closing delimiter line starts and where the body after it starts.
fn find_closing_delimiter(content: &str) -> Option<(usize, usize)> {
    let mut position = 0;

    for line in content.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == FRONT_MATTER_DELIMITER {
            return Some((position, position + line.len()));
        }
        position += line.len();
    }

    None
}

fn parse_yaml_mapping(yaml: &str, path: &Path) -> Result<Map<String, Value>> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }

    serde_yaml::from_str(yaml).map_err(|error| DapperError::Parse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}
