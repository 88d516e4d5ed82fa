#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]

mod application;
mod configuration;
mod domain;
mod infrastructure;

use std::env;
use std::path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task;
use yansi::Paint;

use crate::application::cli;
use crate::application::repl;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Action;
use crate::domain::models::Backend;
use crate::domain::models::Canvas;
use crate::domain::models::CredentialStore;
use crate::domain::models::Event;
use crate::domain::services::actions::ActionsService;
use crate::domain::services::ChatSession;
use crate::domain::services::SessionSettings;
use crate::domain::services::SnapshotAccessor;
use crate::infrastructure::backends::gemini::Gemini;
use crate::infrastructure::canvas::FileCanvas;
use crate::infrastructure::credentials::FileCredentialStore;
use crate::infrastructure::credentials::MemoryCredentialStore;

fn handle_error(err: Error) {
    eprintln!(
            "{}",
            Paint::red(format!(
                "Oh no! ExcaliGenius has failed with the following app version and error.\n\nVersion: {}\nCommit: {}\nError: {}",
                env!("CARGO_PKG_VERSION"),
                env!("VERGEN_GIT_DESCRIBE"),
                err
            ))
        );

    let backtrace = err.backtrace();
    if backtrace.to_string() == "disabled backtrace" {
        let args = env::args().collect::<Vec<String>>().join(" ");
        eprintln!("\nRunning the following can help explain further what the issue is:");
        eprintln!("\nRUST_BACKTRACE=1 {args}");
    } else {
        eprintln!("\n{}", backtrace);
    }

    process::exit(1);
}

fn credential_store() -> Arc<dyn CredentialStore> {
    let token = Config::get(ConfigKey::GeminiToken);
    if !token.trim().is_empty() {
        return Arc::new(MemoryCredentialStore::new(&token));
    }

    return Arc::new(FileCredentialStore::default());
}

async fn run() -> Result<()> {
    let credentials = credential_store();
    let canvas: Arc<dyn Canvas> =
        Arc::new(FileCanvas::open(path::Path::new(&Config::get(ConfigKey::Diagram))).await?);
    let backend: Arc<dyn Backend> = Arc::new(Gemini::new(credentials.clone()));

    if let Err(health_err) = backend.health_check().await {
        tracing::warn!(err = ?health_err, "Gemini health check failed");
        eprintln!(
            "{}",
            Paint::yellow(format!(
                "Could not reach Gemini ({health_err}). Set an API key with /key <value> if you have not yet."
            ))
        );
    }

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();

    let mut session = ChatSession::new(
        backend,
        canvas.clone(),
        SessionSettings::from_config()?,
        event_tx.clone(),
    );
    session.set_project_description(&Config::get(ConfigKey::Project));
    if session.project_description().is_empty() {
        event_tx.send(Event::Notice(
            "Tell me what you are building with /project <description>.".to_string(),
        ))?;
    }

    let debounce = Duration::from_millis(Config::parse(ConfigKey::SnapshotDebounce)?);
    let (diagram_rx, _publisher) = SnapshotAccessor::new(canvas.clone()).publish_debounced(debounce);

    let mut background_futures = task::JoinSet::new();
    background_futures.spawn(async move {
        return ActionsService::start(session, credentials, canvas, event_tx, &mut action_rx)
            .await;
    });

    let repl_future = repl::start(action_tx, event_rx, diagram_rx);

    return tokio::select!(
        res = background_futures.join_next() => match res {
            Some(Ok(res)) => res,
            Some(Err(join_err)) => Err(join_err.into()),
            None => Ok(()),
        },
        res = repl_future => res,
    );
}

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let debug_log_dir = env::var("EXCALIGENIUS_LOG_DIR").unwrap_or_else(|_| {
        return dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join("excaligenius")
            .to_string_lossy()
            .to_string();
    });

    let file_appender = tracing_appender::rolling::never(debug_log_dir, "debug.log");
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    if env::var("RUST_LOG")
        .unwrap_or_else(|_| return "".to_string())
        .contains("excaligenius")
    {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(writer)
            .init();
    }

    match cli::parse().await {
        Ok(true) => {}
        Ok(false) => process::exit(0),
        Err(ready_err) => {
            handle_error(ready_err);
            return;
        }
    }

    if let Err(err) = run().await {
        handle_error(err);
    }

    process::exit(0);
}
