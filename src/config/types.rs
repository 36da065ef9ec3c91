//! Configuration type definitions.
//!
//! This module contains all the data structures used in pipewright configuration
//! files. These types are pure data - no I/O or complex logic. Every field has a
//! default that follows the conventional project layout, so an empty
//! `pipewright.yaml` is a valid configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// =============================================================================
// Project configuration
// =============================================================================

/// Root configuration for a pipewright project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// License header prepended to compiled scripts and stylesheets
    #[serde(default)]
    pub license: LicenseConfig,
    /// Application stylesheet bundles
    #[serde(default)]
    pub styles: StylesConfig,
    /// Application script bundles
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// HTML view templates packed into a script module
    #[serde(default)]
    pub templates: TemplateCacheConfig,
    /// HTML email build
    #[serde(default)]
    pub email: EmailConfig,
    /// Development-specific settings (dev server, watch mode, etc.)
    #[serde(default)]
    pub dev: DevConfig,
}

// =============================================================================
// License header
// =============================================================================

/// License header configuration.
///
/// Either inline `text` or a `file` to read the text from. When both are
/// absent, no header is prepended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LicenseConfig {
    /// Header text, including comment delimiters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// File containing the header text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// =============================================================================
// Bundles (styles and scripts)
// =============================================================================

/// A named output bundle built from a set of source globs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Bundle name; the task is called `styles-<name>` / `scripts-<name>`
    /// and the production bundle is written as `<name>.css` / `<name>.js`
    pub name: String,
    /// Source file whose development output shares the bundle's file name.
    /// Cache entries for it are evicted whenever the build mode changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Glob patterns (relative to the section's `base`) in concatenation order
    pub sources: Vec<String>,
    /// Extra patterns only included in development builds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dev_sources: Vec<String>,
    /// Skip this bundle in development builds
    #[serde(default)]
    pub production_only: bool,
}

/// Stylesheet compilation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    /// Base directory; output paths preserve the structure below it
    pub base: PathBuf,
    /// Output directory for compiled stylesheets
    pub output: PathBuf,
    /// Additional SCSS load paths
    pub include_paths: Vec<PathBuf>,
    /// Browserslist queries used for vendor prefixing
    pub browsers: Vec<String>,
    /// Bundles to build
    pub bundles: Vec<BundleConfig>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            base: "resources/assets/styles".into(),
            output: "public/build/styles".into(),
            include_paths: Vec::new(),
            browsers: vec!["last 2 versions".to_string()],
            bundles: vec![
                BundleConfig {
                    name: "app".to_string(),
                    entry: Some("app.scss".to_string()),
                    sources: vec![
                        "base/jquery-ui.css".to_string(),
                        "base/colorbox.css".to_string(),
                        "app.scss".to_string(),
                    ],
                    dev_sources: vec!["embed.scss".to_string()],
                    production_only: false,
                },
                BundleConfig {
                    name: "embed".to_string(),
                    entry: Some("embed.scss".to_string()),
                    sources: vec!["embed.scss".to_string()],
                    dev_sources: Vec::new(),
                    production_only: true,
                },
            ],
        }
    }
}

/// Script compilation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Base directory; output paths preserve the structure below it
    pub base: PathBuf,
    /// Output directory for compiled scripts
    pub output: PathBuf,
    /// External bundler; modules are concatenated as-is when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundler: Option<BundlerConfig>,
    /// Bundles to build
    pub bundles: Vec<BundleConfig>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            base: "resources/assets/scripts".into(),
            output: "public/build/scripts".into(),
            bundler: None,
            bundles: vec![BundleConfig {
                name: "app".to_string(),
                entry: None,
                sources: vec!["app.js".to_string()],
                dev_sources: Vec::new(),
                production_only: false,
            }],
        }
    }
}

/// External script bundler invocation.
///
/// The entry file path is appended after the mode-specific arguments and the
/// compiled module is read from standard output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlerConfig {
    /// Program and base arguments, e.g. `["esbuild", "--bundle"]`
    pub command: Vec<String>,
    /// Arguments added in production builds
    #[serde(default = "default_production_args")]
    pub production_args: Vec<String>,
    /// Arguments added in development builds
    #[serde(default)]
    pub development_args: Vec<String>,
}

fn default_production_args() -> Vec<String> {
    vec!["--minify".to_string()]
}

/// Template cache module settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateCacheConfig {
    /// Build the template cache module at all
    pub enabled: bool,
    /// Directory containing the view templates
    pub source: PathBuf,
    /// Glob pattern for templates below `source`
    pub glob: String,
    /// Module name the templates are registered on
    pub module: String,
    /// URL prefix of the template keys
    pub root: String,
    /// Output file name (written to the scripts output directory)
    pub output: String,
}

impl Default for TemplateCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: "public/templates".into(),
            glob: "**/*.html".to_string(),
            module: "ponyfm".to_string(),
            root: "/templates".to_string(),
            output: "templates.js".to_string(),
        }
    }
}

// =============================================================================
// Email
// =============================================================================

/// HTML email build settings.
///
/// `pages`, `layouts`, `partials`, `helpers`, `stylesheet` and `images` are
/// relative to `source`; `css_dir` and `images_dir` are relative to `output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub source: PathBuf,
    pub pages: PathBuf,
    pub layouts: PathBuf,
    pub partials: PathBuf,
    pub helpers: PathBuf,
    /// Glob pattern for page templates below `pages`
    pub page_glob: String,
    /// Extension stripped from page templates when writing output
    pub template_extension: String,
    /// Stylesheet entry point
    pub stylesheet: PathBuf,
    /// Pattern of all stylesheet sources (used by the watcher)
    pub stylesheet_glob: String,
    /// SCSS load paths
    pub include_paths: Vec<PathBuf>,
    pub images: PathBuf,
    pub output: PathBuf,
    pub css_dir: PathBuf,
    pub images_dir: PathBuf,
    /// Glob pattern for composed documents below `output`
    pub inline_glob: String,
    /// Marker replaced by the media-query `<style>` block
    pub placeholder: String,
    /// `href` of the stylesheet link removed after inlining
    pub stylesheet_href: String,
    /// Remove rules that match nothing in the composed pages (production)
    pub remove_unused_css: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            source: "resources/emails/src".into(),
            pages: "pages".into(),
            layouts: "layouts".into(),
            partials: "partials".into(),
            helpers: "helpers".into(),
            page_glob: "**/*.blade.php.hbs".to_string(),
            template_extension: "hbs".to_string(),
            stylesheet: "assets/scss/app.scss".into(),
            stylesheet_glob: "assets/scss/**/*.scss".to_string(),
            include_paths: vec!["node_modules/foundation-emails/scss".into()],
            images: "assets/img".into(),
            output: "resources/views/emails/build".into(),
            css_dir: "css".into(),
            images_dir: "assets/img".into(),
            inline_glob: "**/*.blade.php".to_string(),
            placeholder: "<!-- <style> -->".to_string(),
            stylesheet_href: "css/app.css".to_string(),
            remove_unused_css: true,
        }
    }
}

// =============================================================================
// Development settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// Host the development server binds to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the development server binds to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served by the development server
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Enable live reload in the browser when files change (default: true)
    #[serde(default = "default_live_reload")]
    pub live_reload: bool,
    /// What to do with change events arriving while a rebuild runs
    #[serde(default)]
    pub trigger_policy: TriggerPolicy,
    /// File watching configuration
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_dir: default_public_dir(),
            live_reload: true,
            trigger_policy: TriggerPolicy::default(),
            watch: WatchConfig::default(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    61999
}

fn default_public_dir() -> PathBuf {
    "public".into()
}

fn default_live_reload() -> bool {
    true
}

/// Handling of overlapping watch triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerPolicy {
    /// Every event runs its full sequence, even if an identical one is queued.
    #[default]
    RunEach,
    /// Events queued while a sequence runs are merged; each distinct sequence
    /// runs once.
    Coalesce,
}

/// Configuration for file watching during development.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Use polling-based watcher instead of native file system events.
    /// Useful for network filesystems, Docker volumes, or other situations
    /// where native events are unreliable.
    #[serde(default)]
    pub poll: bool,
    /// Poll interval in milliseconds (only used if poll=true).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Debounce timeout in milliseconds.
    /// Changes within this window are batched together.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll: false,
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}
