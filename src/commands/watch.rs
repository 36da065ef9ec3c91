use std::convert::Infallible;
use std::path::{Path, PathBuf};

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use futures_util::stream::Stream;
use tokio::sync::{broadcast, mpsc};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::{
    GlobalArgs, WatchArgs,
    build::{BuildMode, FileWatcher, LiveReload, WatchController},
    commands::Session,
    tasks::{BUILD, watch_rules},
};

const LIVE_RELOAD_SCRIPT: &str = r#"(function () {
  var source = new EventSource("/_pipewright/live-reload");
  source.addEventListener("reload", function () {
    window.location.reload();
  });
})();
"#;

/// SSE handler for live reload notifications.
async fn live_reload_handler(
    State(reload): State<LiveReload>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = reload.subscribe();
    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(_) => {
                    yield Ok(Event::default().event("reload").data("reload"));
                }
                // A burst of rebuilds still needs only one reload
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn live_reload_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        LIVE_RELOAD_SCRIPT,
    )
}

fn router(public_dir: &Path, reload: LiveReload, live_reload: bool) -> Router {
    let serve_dir = ServeDir::new(public_dir).append_index_html_on_directories(true);

    let mut app = Router::new();
    if live_reload {
        app = app
            .route("/_pipewright/live-reload", get(live_reload_handler))
            .route("/_pipewright/live-reload.js", get(live_reload_script));
    }
    app.with_state(reload).fallback_service(serve_dir)
}

pub async fn run(global: &GlobalArgs, args: &WatchArgs) -> Result<(), anyhow::Error> {
    let Session { registry, ctx } = Session::open(&global.config, BuildMode::Development).await?;
    let dev = ctx.config().dev.clone();

    // Build everything first; a broken source must not prevent watching
    info!("running initial development build");
    if let Err(e) = registry.run(BUILD, ctx.clone()).await {
        error!("initial build failed: {e}");
    }

    let rules = watch_rules(ctx.config())?;
    let mut roots: Vec<PathBuf> = Vec::new();
    for rule in &rules {
        if !roots.contains(&rule.root) {
            roots.push(rule.root.clone());
        }
    }

    let (tx, rx) = mpsc::channel(64);
    let _watcher = match FileWatcher::new(&dev.watch, &roots, tx) {
        Ok(watcher) => {
            info!(roots = roots.len(), poll = dev.watch.poll, "watching for changes");
            Some(watcher)
        }
        Err(e) => {
            warn!("failed to start file watcher: {e}");
            None
        }
    };

    let reload = ctx.project.reload.clone();
    let notifier = reload.clone();
    let live_reload = dev.live_reload;
    let controller = WatchController::new(registry, ctx.clone(), rules, dev.trigger_policy)
        .on_success(move || {
            if live_reload {
                notifier.notify();
            }
        });
    tokio::spawn(controller.run(rx));

    let app = router(&dev.public_dir, reload, dev.live_reload);
    let listener = tokio::net::TcpListener::bind((dev.host.as_str(), dev.port)).await?;
    let url = format!("http://{}:{}", dev.host, dev.port);

    info!(%url, public_dir = %dev.public_dir.display(), "serving");
    println!("\nServing at {url}");
    println!("Press Ctrl+C to stop\n");

    // Open browser if requested
    if args.open
        && let Err(e) = open::that(&url)
    {
        warn!("failed to open browser: {e}");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
