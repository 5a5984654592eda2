use crate::config::SiteConfig;
use crate::error::DapperError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// How a source file is handled by the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Front matter + Markdown body, written as `.html`.
    Markdown,
    /// Copied byte-for-byte, HTML included.
    Static,
}

impl ContentKind {
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase());

        match extension.as_deref() {
            Some(ext) if MARKDOWN_EXTENSIONS.contains(&ext) => Self::Markdown,
            _ => Self::Static,
        }
    }

    pub fn is_content(self) -> bool {
        self != Self::Static
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontMatter {
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

impl FrontMatter {
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.raw.get(key).and_then(|v| v.as_str().map(String::from))
    }
}

/// One parsed source file. Lives for a single build only.
#[derive(Debug, Clone)]
pub struct ContentItem {
    /// Path relative to the source root.
    pub source_path: PathBuf,
    pub front_matter: FrontMatter,
    pub body: String,
    pub is_markdown: bool,
}

impl ContentItem {
    /// Name of the layout requested in front matter. `layout: null` counts as unset.
    pub fn layout(&self) -> Result<Option<String>, DapperError> {
        match self.front_matter.get("layout") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(name)) => Ok(Some(name.clone())),
            Some(Value::Number(number)) => Ok(Some(number.to_string())),
            Some(_) => Err(DapperError::Parse {
                path: self.source_path.clone(),
                message: "`layout` must be a string".to_string(),
            }),
        }
    }

    /// Output location of this item, relative to the output root.
    pub fn output_path(&self) -> PathBuf {
        output_relative_path(&self.source_path)
    }
}

/// Mirrors a source-relative path into the output tree. Markdown becomes `.html`.
pub fn output_relative_path(relative: &Path) -> PathBuf {
    match ContentKind::from_path(relative) {
        ContentKind::Markdown => relative.with_extension("html"),
        ContentKind::Static => relative.to_path_buf(),
    }
}

/// The `site` and `page` scopes handed to templates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderContext {
    pub site: Map<String, Value>,
    pub page: Map<String, Value>,
}

impl RenderContext {
    pub fn new(config: &SiteConfig, item: &ContentItem) -> Self {
        let mut site = config.extra.clone();
        site.insert("name".to_string(), Value::String(config.name.clone()));

        let mut page = item.front_matter.raw.clone();
        page.insert("content".to_string(), Value::String(item.body.clone()));

        Self { site, page }
    }

    pub fn content(&self) -> &str {
        self.page
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn set_content(&mut self, content: String) {
        self.page
            .insert("content".to_string(), Value::String(content));
    }
}

/// Outcome of one build pass.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Files visited, whether or not they succeeded.
    pub processed: usize,
    pub rendered: usize,
    pub copied: usize,
    /// Per-file failures, in traversal order.
    pub errors: Vec<DapperError>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn record_error(&mut self, error: DapperError) {
        tracing::warn!(%error, "skipping file");
        self.errors.push(error);
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} rendered, {} copied, {} errors",
            self.processed,
            self.rendered,
            self.copied,
            self.errors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(front_matter: Value) -> ContentItem {
        ContentItem {
            source_path: PathBuf::from("notes/today.md"),
            front_matter: FrontMatter {
                raw: front_matter.as_object().cloned().unwrap_or_default(),
            },
            body: "Body".to_string(),
            is_markdown: true,
        }
    }

    #[test]
    fn test_content_kind_from_extension() {
        assert_eq!(ContentKind::from_path(Path::new("a.md")), ContentKind::Markdown);
        assert_eq!(
            ContentKind::from_path(Path::new("a.MARKDOWN")),
            ContentKind::Markdown
        );
        assert_eq!(ContentKind::from_path(Path::new("a.html")), ContentKind::Static);
        assert_eq!(ContentKind::from_path(Path::new("a.htm")), ContentKind::Static);
        assert_eq!(ContentKind::from_path(Path::new("style.css")), ContentKind::Static);
        assert_eq!(ContentKind::from_path(Path::new("README")), ContentKind::Static);
    }

    #[test]
    fn test_output_path_mirrors_source() {
        assert_eq!(
            output_relative_path(Path::new("blog/post.markdown")),
            PathBuf::from("blog/post.html")
        );
        assert_eq!(
            output_relative_path(Path::new("css/site.css")),
            PathBuf::from("css/site.css")
        );
        assert_eq!(
            output_relative_path(Path::new("about.html")),
            PathBuf::from("about.html")
        );
    }

    #[test]
    fn test_layout_lookup() {
        assert_eq!(item(json!({})).layout().unwrap(), None);
        assert_eq!(item(json!({ "layout": null })).layout().unwrap(), None);
        assert_eq!(
            item(json!({ "layout": "post" })).layout().unwrap(),
            Some("post".to_string())
        );
        assert!(item(json!({ "layout": ["a"] })).layout().is_err());
    }

    #[test]
    fn test_render_context_scopes() {
        let mut config = SiteConfig::default();
        config.name = "My Site".to_string();
        config
            .extra
            .insert("author".to_string(), Value::String("Ada".to_string()));

        let context = RenderContext::new(&config, &item(json!({ "title": "Hi" })));
        assert_eq!(context.site["name"], json!("My Site"));
        assert_eq!(context.site["author"], json!("Ada"));
        assert_eq!(context.page["title"], json!("Hi"));
        assert_eq!(context.content(), "Body");
    }

    #[test]
    fn test_page_without_front_matter_holds_only_content() {
        let item = crate::parsing::parse_content(b"Just text\n", Path::new("plain.md")).unwrap();
        assert!(item.front_matter.is_empty());

        let context = RenderContext::new(&SiteConfig::default(), &item);
        let keys: Vec<&str> = context.page.keys().map(String::as_str).collect();
        assert_eq!(keys, ["content"]);
        assert_eq!(context.content(), "Just text\n");
    }

    #[test]
    fn test_report_display() {
        let report = BuildReport {
            processed: 3,
            rendered: 2,
            copied: 1,
            errors: Vec::new(),
        };
        assert_eq!(report.to_string(), "3 files: 2 rendered, 1 copied, 0 errors");
        assert!(report.is_clean());
    }
}
