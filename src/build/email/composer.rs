//! Template composer: pages + layouts + partials + helpers.
//!
//! Layouts, partials and helpers are loaded lazily on first use and kept until
//! [`Composer::refresh`] is called; page templates are read fresh on every
//! invocation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use handlebars::{Handlebars, RenderError, RenderErrorReason};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::inky;
use crate::build::pipeline::{FileRecord, FileStage, PipelineContext, PipelineError};
use crate::util::{relabel_template, relative_root, slash_path};

const DEFAULT_LAYOUT: &str = "default";
const NO_LAYOUT: &str = "none";

// =============================================================================
// Front matter
// =============================================================================

/// A page split into front matter data and template body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub data: Map<String, Value>,
    pub body: String,
}

/// Parse YAML front matter from page content.
///
/// Front matter is delimited by `---` at the start and end:
/// ```text
/// ---
/// layout: plain
/// subject: Welcome
/// ---
/// <p>Content here</p>
/// ```
pub fn parse_front_matter(content: &str) -> Result<ParsedPage, String> {
    let trimmed = content.trim_start();

    let no_front_matter = || ParsedPage {
        data: Map::new(),
        body: content.to_string(),
    };

    if !trimmed.starts_with("---") {
        return Ok(no_front_matter());
    }

    // Find the closing delimiter
    let after_opening = &trimmed[3..];
    let Some(closing_pos) = after_opening.find("\n---") else {
        return Ok(no_front_matter());
    };

    let yaml = after_opening[..closing_pos].trim_start_matches(['\r', '\n']);

    // Body starts after "\n---" and the rest of that line
    let rest = &after_opening[closing_pos + 4..];
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => "",
    };

    let data = match serde_yaml::from_str::<Value>(yaml).map_err(|e| e.to_string())? {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return Err(format!("front matter must be a mapping, found {other}")),
    };

    Ok(ParsedPage {
        data,
        body: body.to_string(),
    })
}

// =============================================================================
// Composer
// =============================================================================

/// Resolves page templates against layouts, partials and helpers.
pub struct Composer {
    layouts: PathBuf,
    partials: PathBuf,
    helpers: PathBuf,
    registry: Option<Handlebars<'static>>,
}

impl Composer {
    pub fn new(
        layouts: impl Into<PathBuf>,
        partials: impl Into<PathBuf>,
        helpers: impl Into<PathBuf>,
    ) -> Self {
        Self {
            layouts: layouts.into(),
            partials: partials.into(),
            helpers: helpers.into(),
            registry: None,
        }
    }

    /// Forget the loaded layouts, partials and helpers.
    ///
    /// They are read again from disk on the next [`Composer::compose`].
    pub fn refresh(&mut self) {
        debug!("composer refreshed");
        self.registry = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.registry.is_some()
    }

    /// Compose one page.
    ///
    /// `page` is the page path relative to the pages root; `origin` is used in
    /// error messages.
    pub fn compose(
        &mut self,
        page: &Path,
        origin: &Path,
        source: &str,
    ) -> Result<String, PipelineError> {
        let parsed = parse_front_matter(source).map_err(|e| PipelineError::syntax(origin, e))?;

        let layout = parsed
            .data
            .get("layout")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_LAYOUT)
            .to_string();

        let mut data = parsed.data;
        let stem = page
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        data.insert("page".into(), Value::String(stem));
        data.insert("layout".into(), Value::String(layout.clone()));
        data.insert("root".into(), Value::String(relative_root(page)));
        let data = Value::Object(data);

        let layouts_dir = self.layouts.clone();
        let registry = self.registry()?;

        if layout == NO_LAYOUT {
            return registry
                .render_template(&parsed.body, &data)
                .map_err(|e| render_error(origin, e));
        }

        let name = layout_name(&layout);
        if !registry.has_template(&name) {
            return Err(PipelineError::missing(
                origin,
                format!("layout '{layout}' not found in {}", layouts_dir.display()),
            ));
        }

        // Renders the page itself when the layout reaches `{{> body}}`.
        registry
            .register_partial("body", &parsed.body)
            .map_err(|e| PipelineError::syntax(origin, e))?;

        registry
            .render(&name, &data)
            .map_err(|e| render_error(origin, e))
    }

    fn registry(&mut self) -> Result<&mut Handlebars<'static>, PipelineError> {
        if self.registry.is_none() {
            let loaded = self.load()?;
            self.registry = Some(loaded);
        }
        self.registry
            .as_mut()
            .ok_or_else(|| PipelineError::stage("compose", "template registry unavailable"))
    }

    fn load(&self) -> Result<Handlebars<'static>, PipelineError> {
        let mut registry = Handlebars::new();

        for (path, name) in template_files(&self.layouts)? {
            let text = std::fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
            registry
                .register_template_string(&layout_name(&name), text)
                .map_err(|e| PipelineError::syntax(&path, e))?;
        }

        for (path, name) in template_files(&self.partials)? {
            let text = std::fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
            registry
                .register_partial(&name, text)
                .map_err(|e| PipelineError::syntax(&path, e))?;
        }

        for (path, name) in template_files(&self.helpers)? {
            if path.extension().is_some_and(|e| e == "rhai") {
                registry
                    .register_script_helper_file(&name, &path)
                    .map_err(|e| PipelineError::syntax(&path, e))?;
            } else {
                warn!(path = %path.display(), "ignoring helper that is not a .rhai script");
            }
        }

        debug!(
            layouts = %self.layouts.display(),
            partials = %self.partials.display(),
            "templates loaded"
        );
        Ok(registry)
    }
}

fn layout_name(layout: &str) -> String {
    format!("layout:{layout}")
}

/// Every file below `dir` with its registration name: the relative path
/// without its last extension, using forward slashes.
fn template_files(dir: &Path) -> Result<Vec<(PathBuf, String)>, PipelineError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = dir.join("**").join("*");
    let mut files = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy())? {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            PipelineError::io(path, e.into_error())
        })?;
        if !path.is_file() {
            continue;
        }
        let relative = path.strip_prefix(dir).unwrap_or(&path).with_extension("");
        let name = slash_path(&relative);
        files.push((path, name));
    }
    Ok(files)
}

fn render_error(origin: &Path, error: RenderError) -> PipelineError {
    match error.reason() {
        RenderErrorReason::PartialNotFound(name) => {
            PipelineError::missing(origin, format!("partial '{name}' not found"))
        }
        RenderErrorReason::TemplateNotFound(name) => {
            PipelineError::missing(origin, format!("template '{name}' not found"))
        }
        _ => PipelineError::syntax(origin, error),
    }
}

// =============================================================================
// Pipeline stage
// =============================================================================

/// Composes every page record, expands its Inky markup and relabels it for
/// output.
pub struct Compose {
    composer: Arc<Mutex<Composer>>,
    template_extension: String,
}

impl Compose {
    pub fn new(composer: Arc<Mutex<Composer>>, template_extension: impl Into<String>) -> Self {
        Self {
            composer,
            template_extension: template_extension.into(),
        }
    }
}

impl FileStage for Compose {
    fn name(&self) -> &'static str {
        "compose"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        let html = {
            let mut composer = self.composer.lock().unwrap_or_else(PoisonError::into_inner);
            composer.compose(&file.path, &file.origin, file.text()?)?
        };
        file.set_text(inky::expand(&html));
        file.path = relabel_template(&file.path, &self.template_extension);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildMode;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            fixture.write(
                "layouts/default.html",
                "<html><body>{{> header}}<container>{{> body}}</container></body></html>",
            );
            fixture.write("partials/header.html", "<h1>Pony.fm</h1>");
            fixture
        }

        fn write(&self, name: &str, contents: &str) {
            let path = self.dir.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        fn composer(&self) -> Composer {
            Composer::new(
                self.dir.path().join("layouts"),
                self.dir.path().join("partials"),
                self.dir.path().join("helpers"),
            )
        }
    }

    #[test]
    fn test_parse_front_matter_basic() {
        let content = "---\nlayout: plain\nsubject: Hi\n---\n<p>Body</p>\n";
        let parsed = parse_front_matter(content).unwrap();
        assert_eq!(parsed.data["layout"], "plain");
        assert_eq!(parsed.data["subject"], "Hi");
        assert_eq!(parsed.body, "<p>Body</p>\n");
    }

    #[test]
    fn test_parse_front_matter_absent() {
        let parsed = parse_front_matter("<p>No front matter</p>").unwrap();
        assert!(parsed.data.is_empty());
        assert_eq!(parsed.body, "<p>No front matter</p>");
    }

    #[test]
    fn test_parse_front_matter_not_a_mapping() {
        assert!(parse_front_matter("---\n- a\n- b\n---\nx").is_err());
    }

    #[test]
    fn test_compose_with_layout_and_partial() {
        let fixture = Fixture::new();
        let mut composer = fixture.composer();

        let html = composer
            .compose(Path::new("hello.tmpl"), Path::new("/p/hello.tmpl"), "<p>Hello {{page}}</p>")
            .unwrap();

        assert_eq!(
            html,
            "<html><body><h1>Pony.fm</h1><container><p>Hello hello</p></container></body></html>"
        );
    }

    #[test]
    fn test_front_matter_variables_and_root() {
        let fixture = Fixture::new();
        let mut composer = fixture.composer();

        let html = composer
            .compose(
                Path::new("account/welcome.blade.php.hbs"),
                Path::new("/p/account/welcome.blade.php.hbs"),
                "---\nlayout: none\nsubject: Welcome\n---\n{{subject}} {{root}}logo.png",
            )
            .unwrap();

        assert_eq!(html, "Welcome ../logo.png");
    }

    #[test]
    fn test_missing_layout() {
        let fixture = Fixture::new();
        let mut composer = fixture.composer();

        let err = composer
            .compose(Path::new("a.hbs"), Path::new("/p/a.hbs"), "---\nlayout: fancy\n---\nx")
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingDependency { .. }));
    }

    #[test]
    fn test_missing_partial() {
        let fixture = Fixture::new();
        let mut composer = fixture.composer();

        let err = composer
            .compose(Path::new("a.hbs"), Path::new("/p/a.hbs"), "{{> footer}}")
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingDependency { .. }));
    }

    #[test]
    fn test_layout_cached_until_refresh() {
        let fixture = Fixture::new();
        let mut composer = fixture.composer();
        let page = Path::new("p.hbs");

        composer.compose(page, page, "x").unwrap();
        assert!(composer.is_loaded());

        fixture.write("layouts/default.html", "<div>{{> body}}</div>");
        let stale = composer.compose(page, page, "x").unwrap();
        assert!(stale.contains("<h1>Pony.fm</h1>"));

        composer.refresh();
        assert!(!composer.is_loaded());
        let fresh = composer.compose(page, page, "x").unwrap();
        assert_eq!(fresh, "<div>x</div>");
    }

    #[test]
    fn test_rhai_helper() {
        let fixture = Fixture::new();
        fixture.write("helpers/shout.rhai", "params[0].to_upper()");
        let mut composer = fixture.composer();

        let html = composer
            .compose(
                Path::new("p.hbs"),
                Path::new("/p/p.hbs"),
                "---\nlayout: none\nname: derpy\n---\n{{shout name}}",
            )
            .unwrap();
        assert_eq!(html, "DERPY");
    }

    #[test]
    fn test_compose_stage_expands_inky_and_relabels() {
        let fixture = Fixture::new();
        let stage = Compose::new(Arc::new(Mutex::new(fixture.composer())), "hbs");
        let ctx = PipelineContext::new("email-pages", BuildMode::Development);
        let mut file = FileRecord::new("hello.tmpl", "/p/hello.tmpl", b"<p>Hi</p>".to_vec());

        stage.transform(&mut file, &ctx).unwrap();

        assert_eq!(file.path, PathBuf::from("hello.html"));
        let html = file.text().unwrap();
        assert!(html.contains("<h1>Pony.fm</h1>"));
        assert!(html.contains(r#"<table align="center" class="container">"#));
        assert!(!html.contains("<container>"));
    }
}
