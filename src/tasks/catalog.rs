//! The project's build tasks.
//!
//! | Task                  | Does                                              |
//! |-----------------------|---------------------------------------------------|
//! | `styles-<bundle>`     | compile one stylesheet bundle                     |
//! | `styles-reset-<bundle>` | evict the bundle entry from the styles cache    |
//! | `scripts-<bundle>`    | compile one script bundle                         |
//! | `scripts-reset-<bundle>` | evict the bundle entry from the scripts cache  |
//! | `templates`           | pack view templates into a template-cache module  |
//! | `email-clean`         | delete the email output directory                 |
//! | `email-refresh`       | forget loaded layouts, partials and helpers       |
//! | `email-pages`         | compose email pages                               |
//! | `email-sass`          | compile the email stylesheet                      |
//! | `email-images`        | copy (and in production compress) email images    |
//! | `email-inline`        | inline CSS into composed pages (production)       |
//! | `email-build`         | sequence of the email tasks                       |
//! | `build`               | everything above, concurrently                    |

use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use super::{TaskContext, TaskError, TaskRegistry};
use crate::build::email::{Compose, EmailInliner, OptimizeImages, RemoveUnused};
use crate::build::pipeline::stages::{Cached, Concat, Header, SourceMapInit, SourceMapWrite, When};
use crate::build::pipeline::{
    Outcome, PerFile, Pipeline, PipelineContext, PipelineError, SourceSet,
};
use crate::build::scripts::{Bundler, TemplateCache};
use crate::build::styles::{MinifyCss, Prefix, Scss, targets_for};
use crate::build::{BuildMode, CacheHandle, WatchRule};
use crate::config::{BundleConfig, ProjectConfig};

pub const BUILD: &str = "build";
pub const TEMPLATES: &str = "templates";
pub const EMAIL_CLEAN: &str = "email-clean";
pub const EMAIL_REFRESH: &str = "email-refresh";
pub const EMAIL_PAGES: &str = "email-pages";
pub const EMAIL_SASS: &str = "email-sass";
pub const EMAIL_IMAGES: &str = "email-images";
pub const EMAIL_INLINE: &str = "email-inline";
pub const EMAIL_BUILD: &str = "email-build";

fn styles_task(bundle: &str) -> String {
    format!("styles-{bundle}")
}

fn styles_reset_task(bundle: &str) -> String {
    format!("styles-reset-{bundle}")
}

fn scripts_task(bundle: &str) -> String {
    format!("scripts-{bundle}")
}

fn scripts_reset_task(bundle: &str) -> String {
    format!("scripts-reset-{bundle}")
}

// =============================================================================
// Registration
// =============================================================================

/// Register every task of the project and check the resulting graph.
pub fn register_all(
    registry: &mut TaskRegistry<TaskContext>,
    config: &ProjectConfig,
) -> Result<(), TaskError> {
    let mut build = Vec::new();

    for bundle in &config.styles.bundles {
        let name = styles_task(&bundle.name);
        let compile = bundle.clone();
        registry.register(&name, &[], move |ctx| styles(ctx, compile.clone()))?;

        let namespace = name.clone();
        let entry = bundle.entry.clone();
        registry.register(&styles_reset_task(&bundle.name), &[], move |ctx| {
            reset_bundle(ctx, namespace.clone(), entry.clone())
        })?;
        build.push(name);
    }

    for bundle in &config.scripts.bundles {
        let name = scripts_task(&bundle.name);
        let compile = bundle.clone();
        registry.register(&name, &[], move |ctx| scripts(ctx, compile.clone()))?;

        let namespace = name.clone();
        let entry = bundle.entry.clone();
        registry.register(&scripts_reset_task(&bundle.name), &[], move |ctx| {
            reset_bundle(ctx, namespace.clone(), entry.clone())
        })?;
        build.push(name);
    }

    if config.templates.enabled {
        registry.register(TEMPLATES, &[], templates)?;
        build.push(TEMPLATES.to_string());
    }

    registry
        .register(EMAIL_CLEAN, &[], email_clean)?
        .register(EMAIL_REFRESH, &[], email_refresh)?
        .register(EMAIL_PAGES, &[], email_pages)?
        .register(EMAIL_SASS, &[], email_sass)?
        .register(EMAIL_IMAGES, &[], email_images)?
        .register(EMAIL_INLINE, &[], email_inline)?
        .register_sequence(
            EMAIL_BUILD,
            &[],
            &[EMAIL_CLEAN, EMAIL_PAGES, EMAIL_SASS, EMAIL_IMAGES, EMAIL_INLINE],
        )?;
    build.push(EMAIL_BUILD.to_string());

    let build: Vec<&str> = build.iter().map(String::as_str).collect();
    registry.register_group(BUILD, &build)?;

    registry.validate()
}

/// File-change rules of the watch loop.
///
/// Every rule matching a changed path runs its sequence.
pub fn watch_rules(config: &ProjectConfig) -> Result<Vec<WatchRule>, glob::PatternError> {
    let email = &config.email;
    let source = &email.source;
    let mut rules = vec![
        WatchRule::new(
            "email pages",
            source,
            &[email.pages.join(&email.page_glob)],
            &[EMAIL_PAGES, EMAIL_INLINE],
        )?,
        WatchRule::new(
            "email layouts",
            source,
            &[
                email.layouts.join("**/*"),
                email.partials.join("**/*"),
                email.helpers.join("**/*"),
            ],
            &[EMAIL_REFRESH, EMAIL_PAGES, EMAIL_INLINE],
        )?,
        WatchRule::new(
            "email styles",
            source,
            &[email.stylesheet_glob.clone().into()],
            &[EMAIL_REFRESH, EMAIL_SASS, EMAIL_PAGES, EMAIL_INLINE],
        )?,
        WatchRule::new(
            "email images",
            source,
            &[email.images.join("**/*")],
            &[EMAIL_IMAGES],
        )?,
    ];

    for bundle in config.styles.bundles.iter().filter(|b| !b.production_only) {
        let compile = styles_task(&bundle.name);
        let reset = styles_reset_task(&bundle.name);
        rules.push(WatchRule::new(
            &compile,
            &config.styles.base,
            &["**/*.scss".into(), "**/*.css".into()],
            &[&reset, &compile],
        )?);
    }

    for bundle in config.scripts.bundles.iter().filter(|b| !b.production_only) {
        let compile = scripts_task(&bundle.name);
        let reset = scripts_reset_task(&bundle.name);
        rules.push(WatchRule::new(
            &compile,
            &config.scripts.base,
            &["**/*.js".into()],
            &[&reset, &compile],
        )?);
    }

    if config.templates.enabled {
        rules.push(WatchRule::new(
            TEMPLATES,
            &config.templates.source,
            &[config.templates.glob.clone().into()],
            &[TEMPLATES],
        )?);
    }

    Ok(rules)
}

// =============================================================================
// Shared helpers
// =============================================================================

async fn run_pipeline(
    ctx: &TaskContext,
    task: &str,
    pipeline: &Pipeline,
    sources: &SourceSet,
    output: &Path,
) -> Result<Outcome, PipelineError> {
    debug!(task, stages = ?pipeline.stage_names(), "running pipeline");
    let mut pctx = PipelineContext::new(task, ctx.mode);
    let outcome = pipeline.run(sources, output, &mut pctx).await?;
    info!(
        task,
        mode = %ctx.mode,
        matched = outcome.matched,
        written = outcome.written.len(),
        failed = outcome.failures.len(),
        "pipeline complete"
    );
    Ok(outcome)
}

/// Evict the bundle entry when the namespace was last used in another mode.
fn evict_on_mode_switch(cache: &CacheHandle, bundle: &BundleConfig, mode: BuildMode) {
    if !cache.switch_variant(mode.as_str()) {
        return;
    }
    if let Some(entry) = &bundle.entry {
        let evicted = cache.evict_matching(|path| path.ends_with(entry));
        info!(namespace = cache.namespace(), %mode, evicted, "build mode changed");
    }
}

fn skip_in_development(ctx: &TaskContext, task: &str, bundle: &BundleConfig) -> bool {
    if bundle.production_only && !ctx.mode.is_production() {
        info!(task, "production-only bundle, skipped");
        return true;
    }
    false
}

fn add_header(pipeline: &mut Pipeline, config: &ProjectConfig) {
    if let Some(header) = config.license_header() {
        pipeline.add_file_stage(Header::new(header));
    }
}

// =============================================================================
// Styles and scripts
// =============================================================================

async fn styles(ctx: TaskContext, bundle: BundleConfig) -> anyhow::Result<()> {
    let task = styles_task(&bundle.name);
    if skip_in_development(&ctx, &task, &bundle) {
        return Ok(());
    }
    let config = ctx.config();
    let styles = &config.styles;
    let cache = ctx.project.caches.handle(&task);
    evict_on_mode_switch(&cache, &bundle, ctx.mode);

    let scss = When::extension("scss", Scss::new(styles.include_paths.clone()));
    let mut sources = SourceSet::new(&styles.base).patterns(&bundle.sources);
    let mut pipeline = Pipeline::new();

    if ctx.mode.is_production() {
        pipeline
            .add_file_stage(scss)
            .add_file_stage(Prefix::new(&styles.browsers)?)
            .add_stage(Concat::new(format!("{}.css", bundle.name)))
            .add_file_stage(MinifyCss::new(targets_for(&styles.browsers)?));
        add_header(&mut pipeline, config);
    } else {
        sources = sources.patterns(&bundle.dev_sources);
        pipeline
            .add_stage(Cached::new(cache))
            .add_file_stage(SourceMapInit)
            .add_file_stage(scss);
        add_header(&mut pipeline, config);
        pipeline.add_file_stage(SourceMapWrite);
    }

    let outcome = run_pipeline(&ctx, &task, &pipeline, &sources, &styles.output).await?;
    if !ctx.mode.is_production() && !outcome.written.is_empty() {
        ctx.project.reload.notify();
    }
    Ok(())
}

/// Evict the bundle entry, or the whole namespace when the bundle names none,
/// so the next run recompiles it even though the entry itself is unchanged.
async fn reset_bundle(
    ctx: TaskContext,
    namespace: String,
    entry: Option<String>,
) -> anyhow::Result<()> {
    let cache = ctx.project.caches.handle(&namespace);
    let evicted = match entry {
        Some(entry) => cache.evict_matching(|path| path.ends_with(&entry)),
        None => {
            let count = cache.len();
            cache.clear();
            count
        }
    };
    debug!(namespace = %namespace, evicted, "cache entries evicted");
    Ok(())
}

async fn scripts(ctx: TaskContext, bundle: BundleConfig) -> anyhow::Result<()> {
    let task = scripts_task(&bundle.name);
    if skip_in_development(&ctx, &task, &bundle) {
        return Ok(());
    }
    let config = ctx.config();
    let scripts = &config.scripts;
    let cache = ctx.project.caches.handle(&task);
    evict_on_mode_switch(&cache, &bundle, ctx.mode);

    let mut sources = SourceSet::new(&scripts.base).patterns(&bundle.sources);
    let mut pipeline = Pipeline::new();
    let production = ctx.mode.is_production();

    if production {
        if let Some(bundler) = &scripts.bundler {
            pipeline.add_file_stage(Bundler::new(bundler, true));
        }
        pipeline.add_stage(Concat::new(format!("{}.js", bundle.name)));
        add_header(&mut pipeline, config);
    } else {
        sources = sources.patterns(&bundle.dev_sources);
        pipeline
            .add_stage(Cached::new(cache))
            .add_file_stage(SourceMapInit);
        if let Some(bundler) = &scripts.bundler {
            pipeline.add_file_stage(Bundler::new(bundler, false));
        }
        add_header(&mut pipeline, config);
        pipeline.add_file_stage(SourceMapWrite);
    }

    run_pipeline(&ctx, &task, &pipeline, &sources, &scripts.output).await?;
    Ok(())
}

async fn templates(ctx: TaskContext) -> anyhow::Result<()> {
    let config = ctx.config();
    let templates = &config.templates;
    let sources = SourceSet::new(&templates.source).pattern(&templates.glob);

    let mut pipeline = Pipeline::new();
    pipeline.add_stage(TemplateCache::new(
        &templates.module,
        &templates.root,
        &templates.output,
    ));
    add_header(&mut pipeline, config);

    run_pipeline(&ctx, TEMPLATES, &pipeline, &sources, &config.scripts.output).await?;
    Ok(())
}

// =============================================================================
// Email
// =============================================================================

async fn email_clean(ctx: TaskContext) -> anyhow::Result<()> {
    let output = &ctx.config().email.output;
    match tokio::fs::remove_dir_all(output).await {
        Ok(()) => info!(path = %output.display(), "email output removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::io(output, e).into()),
    }
    Ok(())
}

async fn email_refresh(ctx: TaskContext) -> anyhow::Result<()> {
    let mut composer = ctx
        .project
        .composer
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if composer.is_loaded() {
        composer.refresh();
        info!("email layouts, partials and helpers will be reloaded");
    }
    Ok(())
}

async fn email_pages(ctx: TaskContext) -> anyhow::Result<()> {
    let email = &ctx.config().email;
    let sources = SourceSet::new(email.source.join(&email.pages)).pattern(&email.page_glob);

    let mut pipeline = Pipeline::new();
    pipeline.add_file_stage(Compose::new(
        ctx.project.composer.clone(),
        &email.template_extension,
    ));

    run_pipeline(&ctx, EMAIL_PAGES, &pipeline, &sources, &email.output).await?;
    Ok(())
}

async fn email_sass(ctx: TaskContext) -> anyhow::Result<()> {
    let email = &ctx.config().email;
    let entry = email.source.join(&email.stylesheet);
    let (Some(dir), Some(file)) = (entry.parent(), entry.file_name()) else {
        anyhow::bail!("invalid email stylesheet path {}", entry.display());
    };
    let sources = SourceSet::new(dir).pattern(file.to_string_lossy());

    let mut pipeline = Pipeline::new();
    pipeline.add_file_stage(When::extension(
        "scss",
        Scss::new(email.include_paths.clone()),
    ));
    if ctx.mode.is_production() {
        if email.remove_unused_css {
            let documents = SourceSet::new(&email.output)
                .pattern(&email.inline_glob)
                .load()
                .await?
                .into_iter()
                .map(|doc| String::from_utf8_lossy(&doc.contents).into_owned())
                .collect();
            pipeline.insert_after("scss", PerFile(RemoveUnused::new(documents)));
        }
    } else {
        pipeline
            .insert_before("scss", PerFile(SourceMapInit))
            .insert_after("scss", PerFile(SourceMapWrite));
    }

    let output = email.output.join(&email.css_dir);
    run_pipeline(&ctx, EMAIL_SASS, &pipeline, &sources, &output).await?;
    Ok(())
}

async fn email_images(ctx: TaskContext) -> anyhow::Result<()> {
    let email = &ctx.config().email;
    let sources = SourceSet::new(email.source.join(&email.images)).pattern("**/*");

    let mut pipeline = Pipeline::new();
    if ctx.mode.is_production() {
        pipeline.add_file_stage(OptimizeImages);
    }

    let output = email.output.join(&email.images_dir);
    run_pipeline(&ctx, EMAIL_IMAGES, &pipeline, &sources, &output).await?;
    Ok(())
}

async fn email_inline(ctx: TaskContext) -> anyhow::Result<()> {
    if !ctx.mode.is_production() {
        debug!("css inlining only runs in production");
        return Ok(());
    }
    let email = &ctx.config().email;
    let compiled = email
        .output
        .join(&email.css_dir)
        .join(email.stylesheet.with_extension("css").file_name().unwrap_or_default());

    let stylesheet = match tokio::fs::read_to_string(&compiled).await {
        Ok(css) => css,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PipelineError::missing(
                &compiled,
                format!("compiled email stylesheet not found, run {EMAIL_SASS} first"),
            )
            .into());
        }
        Err(e) => return Err(PipelineError::io(&compiled, e).into()),
    };

    let mut pipeline = Pipeline::new();
    let inliner = EmailInliner::new(&stylesheet, &email.placeholder, &email.stylesheet_href)
        .map_err(|e| PipelineError::syntax(&compiled, e))?;
    pipeline.add_file_stage(inliner);

    let sources = SourceSet::new(&email.output).pattern(&email.inline_glob);
    run_pipeline(&ctx, EMAIL_INLINE, &pipeline, &sources, &email.output)
        .await
        .with_context(|| format!("inlining {}", compiled.display()))?;
    Ok(())
}
