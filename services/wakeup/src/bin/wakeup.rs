//! services/wakeup/src/bin/wakeup.rs

use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        Method,
    },
    Router,
};
use chrono::Local;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use wakeup_core::{
    feed::FeedSettings,
    manager::AlarmManager,
    ports::{AudioPlaybackService, FeedGenerationService, TextToSpeechService},
};
use wakeup_lib::{
    adapters::{
        console_button, tts, CommandPlayer, JsonFileAlarmStore, OfflineAdapter,
        OpenAiFeedAdapter, OpenAiTtsAdapter, SimulatedPlayer,
    },
    config::Config,
    driver::{AlarmDriver, Collaborators, DriverSettings},
    error::ApiError,
    web::{self, state::AppState, ApiDoc},
};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting alarm service...");

    // --- 2. Load Alarms ---
    let store = Arc::new(JsonFileAlarmStore::new(&config.alarms_file_path));
    info!("Loading alarms from {}", config.alarms_file_path.display());
    let manager = Arc::new(AlarmManager::load(store, Local::now()).await);

    // --- 3. Initialize Service Adapters ---
    let (feeds, speech): (Arc<dyn FeedGenerationService>, Arc<dyn TextToSpeechService>) =
        match config.require_openai_key() {
            Ok(api_key) => {
                let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
                let tts_model = tts::speech_model(&config.tts_model).ok_or_else(|| {
                    ApiError::Internal(format!(
                        "Invalid TTS model specified in config: '{}'",
                        config.tts_model
                    ))
                })?;
                let tts_voice = tts::speech_voice(&config.tts_voice).ok_or_else(|| {
                    ApiError::Internal(format!(
                        "Invalid TTS voice specified in config: '{}'",
                        config.tts_voice
                    ))
                })?;
                let feed_settings = FeedSettings {
                    news_article_count: config.news_article_count,
                };
                let feeds: Arc<dyn FeedGenerationService> = Arc::new(OpenAiFeedAdapter::new(
                    openai_client.clone(),
                    config.feed_model.clone(),
                    feed_settings,
                ));
                let speech: Arc<dyn TextToSpeechService> =
                    Arc::new(OpenAiTtsAdapter::new(openai_client, tts_model, tts_voice));
                (feeds, speech)
            }
            Err(e) => {
                warn!("{}. Alarms will play the fallback sound only.", e);
                let offline = Arc::new(OfflineAdapter::new("OPENAI_API_KEY is not set"));
                let feeds: Arc<dyn FeedGenerationService> = offline.clone();
                let speech: Arc<dyn TextToSpeechService> = offline;
                (feeds, speech)
            }
        };

    let player: Arc<dyn AudioPlaybackService> = match config
        .audio_player_command
        .as_deref()
        .and_then(|line| CommandPlayer::from_command_line(line, &config.audio_dir))
    {
        Some(player) => {
            info!("Playing audio through external player.");
            Arc::new(player)
        }
        None => {
            info!("No audio player configured. Playback is simulated.");
            Arc::new(SimulatedPlayer::default())
        }
    };

    // --- 4. Start the Alarm Driver ---
    let settings = DriverSettings {
        tick_interval: config.tick_interval,
        max_playback: config.max_playback,
        fallback_sound: config.default_alarm_sound_path.clone(),
    };
    let (driver, control) = AlarmDriver::new(
        manager.clone(),
        Collaborators {
            feeds,
            speech,
            player,
        },
        settings,
    );
    let shutdown = CancellationToken::new();
    let driver_task = tokio::spawn(driver.run(shutdown.clone()));

    if config.console_button {
        let (press_tx, mut press_rx) = mpsc::channel(4);
        tokio::spawn(console_button::listen(
            BufReader::new(tokio::io::stdin()),
            press_tx,
            shutdown.clone(),
        ));
        let control = control.clone();
        let snooze_minutes = config.default_snooze_minutes;
        tokio::spawn(async move {
            while let Some(press) = press_rx.recv().await {
                control.press(press, snooze_minutes).await;
            }
        });
    }

    // --- 5. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState {
        manager: manager.clone(),
        control,
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let app = Router::new()
        .merge(web::router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received."),
                _ = signal.cancelled() => {}
            }
        })
        .await?;

    // --- 7. Shut Down ---
    shutdown.cancel();
    if let Err(e) = driver_task.await {
        error!("Alarm driver task failed: {}", e);
    }
    if let Err(e) = manager.flush().await {
        error!("Failed to save alarms on shutdown: {}", e);
    }
    info!("Alarm service stopped.");
    Ok(())
}
