mod cli;
mod config;
mod logging;
mod persistence;
mod render;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use leadstream_core::SessionStatus;
use leadstream_engine::{ControllerServices, ReqwestBackend, SearchController};
use stream_logging::{stream_info, stream_warn};

use crate::cli::Cli;
use crate::config::AppConfig;
use crate::persistence::SessionCache;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Load configuration error")?;
    config.apply_cli(&cli);
    logging::initialize(&config.log_settings()?);
    stream_info!("leadstream {} starting", env!("CARGO_PKG_VERSION"));

    let cache = if cli.no_cache {
        None
    } else {
        persistence::load_session_cache(&config.cache_path)
    };
    if let Some(cache) = &cache {
        println!("{}", render::cached_summary(cache));
    }

    let backend =
        ReqwestBackend::new(config.backend_settings()).context("Backend configuration error")?;
    let mut controller = SearchController::spawn(
        ControllerServices::from_backend(backend),
        config.controller_settings(),
    );
    if let Some(cache) = &cache {
        controller.restore(cache.records.clone());
    }

    let parameters = cli.search_parameters(&config.user_id);
    let audio = match &cli.audio {
        Some(path) => Some(
            cli::read_audio(path).with_context(|| format!("Read audio file {}", path.display()))?,
        ),
        None => None,
    };

    let cancel = controller.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stream_warn!("Interrupted; cancelling search");
            cancel.cancel();
        }
    });

    let session_id = controller.start(parameters.clone(), audio).await?;
    let mut line = render::ProgressLine::default();
    let outcome = controller
        .wait_for(session_id, |event| {
            if let Some(text) = line.render(event) {
                eprintln!("{text}");
            }
        })
        .await?;

    println!("{}", render::outcome_summary(&outcome));
    for record in &outcome.records {
        println!("{}", render::record_line(record));
    }

    if outcome.status == SessionStatus::Completed && !cli.no_cache {
        let records =
            persistence::records_to_store(cache.as_ref(), outcome.records.clone(), parameters.merge);
        persistence::save_session_cache(&config.cache_path, &SessionCache::new(parameters, records));
    }

    controller.shutdown().await;

    Ok(if outcome.status == SessionStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
