//! Application entry point: voice-driven database assistant.
//!
//! # Startup sequence
//!
//! 1. Load `.env`, initialise logging.
//! 2. Load [`AppConfig`] from disk (default on first run), apply environment
//!    overrides.
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Purge speech clips left behind by a crashed run.
//! 5. Build the query pipeline: LLM client plus SQLite database, or the
//!    offline pipeline when no database is configured.
//! 6. Build the playback controller (synthesizer + speaker).
//! 7. Build the recognizer from the Whisper model, or a recognizer that
//!    reports itself unavailable.
//! 8. Spawn the turn coordinator thread.
//! 9. Run [`eframe::run_native`], which blocks until the window is closed.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use eframe::egui;
use voice_query::{
    app::AssistantApp,
    audio::CpalSink,
    config::{AppConfig, AppPaths},
    pipeline::{ui_channel, TurnCoordinator},
    query::{ApiChatModel, Database, OfflinePipeline, QueryPipeline, SqlAssistant},
    stt::{ContinuousRecognizer, RecognitionSource, TranscribeParams, UnavailableRecognizer, WhisperEngine},
    tts::{purge_stale_clips, ApiSynthesizer, PlaybackController},
};

// ---------------------------------------------------------------------------
// Component builders
// ---------------------------------------------------------------------------

fn build_pipeline(config: &AppConfig) -> Arc<dyn QueryPipeline> {
    let Some(path) = config.database.path.as_deref() else {
        log::warn!("No database configured; answering every question offline");
        return Arc::new(OfflinePipeline);
    };

    match Database::open(path) {
        Ok(db) => {
            log::info!("Database opened: {}", path.display());
            let chat = Arc::new(ApiChatModel::from_config(&config.llm));
            Arc::new(SqlAssistant::new(chat, db, config.database.clone()))
        }
        Err(e) => {
            log::warn!("Could not open database ({}): {e}", path.display());
            Arc::new(OfflinePipeline)
        }
    }
}

fn build_recognizer(config: &AppConfig) -> Arc<dyn RecognitionSource> {
    let model_path = AppPaths::new().model_file(&config.stt.model);
    let params = TranscribeParams::from_config(&config.stt);

    match WhisperEngine::load(&model_path, params) {
        Ok(engine) => {
            log::info!("Whisper model loaded: {}", model_path.display());
            Arc::new(ContinuousRecognizer::new(
                Arc::new(engine),
                config.audio.clone(),
            ))
        }
        Err(e) => {
            log::warn!(
                "Could not load Whisper model ({}): {e}. Recognition unavailable.",
                model_path.display()
            );
            Arc::new(UnavailableRecognizer::new(format!(
                "speech model not loaded: {e}"
            )))
        }
    }
}

fn clear_old_clips(dir: &Path) {
    match purge_stale_clips(dir) {
        Ok(0) => {}
        Ok(n) => log::info!("Removed {n} leftover speech clip(s) from {}", dir.display()),
        Err(e) => log::debug!("No clips purged from {}: {e}", dir.display()),
    }
}

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (width, height) = config.ui.window_size;
    let vp = egui::ViewportBuilder::default()
        .with_title(config.ui.title.clone())
        .with_inner_size([width, height])
        .with_min_inner_size([320.0, 200.0]);

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Environment and logging
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {e}");
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Voice query assistant starting up");

    // 2. Configuration
    let config = AppConfig::load()
        .unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        })
        .with_env_overrides();

    // 3. Tokio runtime (2 worker threads: LLM requests and speech synthesis)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Leftovers from a crashed run
    clear_old_clips(&config.tts.clip_dir);

    // 5. Query pipeline
    let pipeline = build_pipeline(&config);

    // 6. Playback
    let playback = PlaybackController::new(
        Arc::new(ApiSynthesizer::from_config(&config.tts)),
        Arc::new(CpalSink::new(config.audio.output_device.clone())),
        config.tts.clip_dir.clone(),
        rt.handle().clone(),
    );

    // 7. Recognition
    let recognizer = build_recognizer(&config);

    // 8. Turn coordinator
    let (events, source) = ui_channel();
    let coordinator = TurnCoordinator::new(
        recognizer,
        pipeline,
        playback.clone(),
        events,
        config.turn.clone(),
        rt.handle().clone(),
    )
    .spawn()
    .context("failed to spawn turn coordinator thread")?;

    // 9. UI (blocks until the window is closed)
    let app = AssistantApp::new(source, &config);
    let result = eframe::run_native(
        &config.ui.title,
        native_options(&config),
        Box::new(move |_cc| Ok(Box::new(app))),
    );

    log::info!("Shutting down");
    playback.stop();
    coordinator.shutdown();
    result.map_err(|e| anyhow!("UI error: {e}"))
}
