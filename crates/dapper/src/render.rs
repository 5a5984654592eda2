use crate::config::SiteConfig;
use crate::error::{DapperError, IoContext, Result};
use crate::parsing::MarkdownRenderer;
use crate::types::{ContentItem, RenderContext};
use regex::Regex;
use std::error::Error as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tera::{Context, Tera};

pub const DEFAULT_LAYOUT: &str = include_str!("../templates/index.html");

const LAYOUT_EXTENSION: &str = "html";

/// Bare `{{ a.b.c }}` interpolations. These get a `default` filter so a
/// missing key renders as an empty string instead of failing the page.
static SIMPLE_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(-?)\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\s*(-?)\}\}")
        .expect("static regex is valid")
});

/// `{% raw %}...{% endraw %}` spans, which Tera emits verbatim.
static RAW_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{%-?\s*raw\s*-?%\}.*?\{%-?\s*endraw\s*-?%\}")
        .expect("static regex is valid")
});

const DEFAULTED_VARIABLE: &str = "{{${1} ${2} | default(value=\"\") ${3}}}";

pub struct Renderer {
    markdown: MarkdownRenderer,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            markdown: MarkdownRenderer::new(),
        }
    }

    /// Renders one content item to its final text.
    ///
    /// The body is converted from Markdown first (when applicable), then
    /// expanded as a template against the `page` scope alone. If the item
    /// names a layout, that layout is expanded with both `site` and `page`,
    /// `page.content` holding the expanded body.
    pub fn render(&self, item: &ContentItem, config: &SiteConfig) -> Result<String> {
        let layout = item.layout()?;
        let mut context = RenderContext::new(config, item);

        if item.is_markdown {
            context.set_content(self.markdown.render(&item.body));
        }

        let mut page_scope = Context::new();
        page_scope.insert("page", &context.page);
        let label = item.source_path.to_string_lossy();
        let content = expand(&label, context.content(), &page_scope, &item.source_path)?;
        context.set_content(content);

        let Some(layout) = layout else {
            return Ok(context.content().to_string());
        };

        let template = load_layout(&config.layout_dir, &layout, &item.source_path)?;
        let mut full_scope = Context::new();
        full_scope.insert("site", &context.site);
        full_scope.insert("page", &context.page);

        expand(
            &format!("{layout}.{LAYOUT_EXTENSION}"),
            &template,
            &full_scope,
            &item.source_path,
        )
    }
}

pub fn layout_path(layout_dir: &Path, name: &str) -> PathBuf {
    layout_dir.join(format!("{name}.{LAYOUT_EXTENSION}"))
}

fn load_layout(layout_dir: &Path, name: &str, item_path: &Path) -> Result<String> {
    let path = layout_path(layout_dir, name);

    if !path.is_file() {
        return Err(DapperError::LayoutNotFound {
            name: name.to_string(),
            path: item_path.to_path_buf(),
            layout_path: path,
        });
    }

    fs::read_to_string(&path).read_context(&path)
}

/// Evaluates `template` against `context`. Output is never HTML-escaped:
/// `page.content` is already HTML by the time layouts see it.
pub fn expand(name: &str, template: &str, context: &Context, item_path: &Path) -> Result<String> {
    let source = default_missing_keys(template);

    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    tera.add_raw_template(name, &source)
        .map_err(|error| template_error(item_path, &error))?;

    tera.render(name, context)
        .map_err(|error| template_error(item_path, &error))
}

/// Applies the missing-key rewrite everywhere except inside raw blocks.
fn default_missing_keys(template: &str) -> String {
    let mut source = String::with_capacity(template.len());
    let mut last = 0;

    for raw in RAW_BLOCK.find_iter(template) {
        let outside = &template[last..raw.start()];
        source.push_str(&SIMPLE_VARIABLE.replace_all(outside, DEFAULTED_VARIABLE));
        source.push_str(raw.as_str());
        last = raw.end();
    }
    source.push_str(&SIMPLE_VARIABLE.replace_all(&template[last..], DEFAULTED_VARIABLE));

    source
}

fn template_error(path: &Path, error: &tera::Error) -> DapperError {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    DapperError::Template {
        path: path.to_path_buf(),
        message,
    }
}
