use crate::config::{ConfigOverrides, SiteConfig};
use crate::error::{DapperError, IoContext, Result};
use crate::parsing::parse_content;
use crate::render::Renderer;
use crate::types::{BuildReport, ContentKind, output_relative_path};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Instant;
use walkdir::{DirEntry, WalkDir};

enum FileOutcome {
    Rendered,
    Copied,
}

/// Walks the source tree and mirrors it into the output directory.
///
/// Entries are visited in file-name order so output and error ordering are
/// reproducible. Names starting with `_` or `.` are skipped only when they sit
/// directly under the source root.
pub struct TreeWalker<'a> {
    config: &'a SiteConfig,
    renderer: Renderer,
}

impl<'a> TreeWalker<'a> {
    pub fn new(config: &'a SiteConfig) -> Self {
        Self {
            config,
            renderer: Renderer::new(),
        }
    }

    pub fn walk(&self) -> BuildReport {
        let source_dir = &self.config.source_dir;
        let mut report = BuildReport::default();

        let walker = WalkDir::new(source_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    report.record_error(DapperError::WalkDir {
                        path: error.path().unwrap_or(source_dir.as_path()).to_path_buf(),
                        message: error.to_string(),
                    });
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            report.processed += 1;

            let Ok(relative) = path.strip_prefix(source_dir) else {
                continue;
            };

            match self.process_file(path, relative) {
                Ok(FileOutcome::Rendered) => report.rendered += 1,
                Ok(FileOutcome::Copied) => report.copied += 1,
                Err(error) => report.record_error(error),
            }
        }

        report
    }

    fn process_file(&self, path: &Path, relative: &Path) -> Result<FileOutcome> {
        let destination = self.config.output_dir.join(output_relative_path(relative));

        if !ContentKind::from_path(relative).is_content() {
            tracing::debug!(path = %relative.display(), "copying");
            copy_file(path, &destination)?;
            return Ok(FileOutcome::Copied);
        }

        tracing::debug!(path = %relative.display(), "rendering");
        let bytes = fs::read(path).read_context(path)?;
        let item = parse_content(&bytes, relative)?;
        let rendered = self.renderer.render(&item, self.config)?;

        ensure_parent_dir(&destination)?;
        fs::write(&destination, rendered).write_context(&destination)?;

        Ok(FileOutcome::Rendered)
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() == 1
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('_') || name.starts_with('.'))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).write_context(parent)?;
    }
    Ok(())
}

/// Byte copy that reports an unreadable source as a read error against the
/// source, and anything after that as a write error against the destination.
fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    let mut input = fs::File::open(source).read_context(source)?;
    ensure_parent_dir(destination)?;
    let mut output = fs::File::create(destination).write_context(destination)?;
    io::copy(&mut input, &mut output).write_context(destination)?;
    Ok(())
}

/// One full build pass over an already-loaded config.
pub struct SiteBuilder<'a> {
    config: &'a SiteConfig,
    clean: bool,
}

impl<'a> SiteBuilder<'a> {
    pub fn new(config: &'a SiteConfig) -> Self {
        Self {
            config,
            clean: false,
        }
    }

    /// Remove the output directory before building.
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn build(&self) -> Result<BuildReport> {
        let config = self.config;

        if !config.source_dir.is_dir() {
            return Err(DapperError::SourceNotFound {
                path: config.source_dir.clone(),
            });
        }

        if self.clean {
            clean_output_dir(&config.output_dir, &config.source_dir)?;
        }
        fs::create_dir_all(&config.output_dir)?;

        let start = Instant::now();
        let report = TreeWalker::new(config).walk();

        tracing::info!(
            source = %config.source_dir.display(),
            output = %config.output_dir.display(),
            elapsed = ?start.elapsed(),
            "{report}"
        );

        Ok(report)
    }
}

pub fn build(config: &SiteConfig) -> Result<BuildReport> {
    SiteBuilder::new(config).build()
}

/// Loads the config file, applies command-line overrides and builds.
pub fn build_site(
    config_path: &Path,
    overrides: &ConfigOverrides,
    clean: bool,
) -> Result<BuildReport> {
    let config = SiteConfig::load(config_path)?.with_overrides(overrides);
    SiteBuilder::new(&config).clean(clean).build()
}

pub fn clean_output_dir(output_dir: &Path, source_dir: &Path) -> Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }

    let output = fs::canonicalize(output_dir)?;
    let source = fs::canonicalize(source_dir).unwrap_or_else(|_| source_dir.to_path_buf());
    if source.starts_with(&output) {
        return Err(DapperError::UnsafeClean {
            path: output_dir.to_path_buf(),
        });
    }

    fs::remove_dir_all(output_dir)?;
    Ok(())
}
