use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use livecord::{
    create_router, AppState, AudioSource, Config, DeviceSessionFactory, SessionFactory,
    VoiceSession,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "livecord", version, about = "Realtime voice bridge to Gemini Live")]
struct Cli {
    /// Config file path (without extension)
    #[arg(long, global = true, default_value = "config/livecord")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one voice session until Ctrl-C or the service closes it
    Talk {
        /// Replay a WAV file instead of capturing the microphone
        #[arg(long)]
        input: Option<String>,

        /// Discard synthesized audio instead of playing it
        #[arg(long)]
        mute: bool,
    },

    /// Start the HTTP control API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Livecord v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Talk { input, mute } => talk(cfg, input, mute).await,
        Command::Serve => serve(cfg).await,
    }
}

async fn talk(cfg: Config, input: Option<String>, mute: bool) -> Result<()> {
    let source = match input {
        Some(path) => AudioSource::File(path),
        None => AudioSource::Microphone,
    };
    let factory = DeviceSessionFactory::new(cfg)
        .with_source(source)
        .muted(mute);

    let (closed_tx, closed_rx) = oneshot::channel();
    let session = VoiceSession::connect(factory.session_config(), factory.parts()?, move || {
        let _ = closed_tx.send(());
    })
    .await
    .context("Failed to start voice session")?;

    info!("Talking in session {} (Ctrl-C to stop)", session.session_id());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, disconnecting");
            session.disconnect().await;
        }
        _ = closed_rx => {
            info!("Voice session ended");
        }
    }

    let stats = session.stats().await;
    info!(
        "Session {}: {:.1}s, {} frames sent, {} received, {} dropped, {} decode errors, {:.1}s scheduled",
        stats.session_id,
        stats.duration_secs,
        stats.frames_sent,
        stats.frames_received,
        stats.frames_dropped,
        stats.decode_errors,
        stats.seconds_scheduled
    );
    if let Some(reason) = &stats.close_reason {
        info!("Close reason: {:?}", reason);
    }

    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(Arc::new(DeviceSessionFactory::new(cfg)));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
