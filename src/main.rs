use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumalink=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    run().await
}

#[cfg(feature = "audio-io")]
async fn run() -> Result<()> {
    use lumalink::audio::{CpalCapture, CpalPlayback};
    use lumalink::client::StreamClient;
    use lumalink::config::ClientConfig;
    use lumalink::speech::NullRecognizer;
    use tracing::info;
    use url::Url;

    let ws_url = std::env::var("LUMA_WS_URL").unwrap_or_else(|_| "ws://localhost:8080/ws".into());
    let ws_url = Url::parse(&ws_url)?;
    let session_id = uuid::Uuid::new_v4().to_string();

    info!(%ws_url, %session_id, "Starting Lumalink streaming client");

    let config = ClientConfig::new(ws_url).with_session_id(session_id);

    let capture = CpalCapture::new(config.capture_buffer_frames)?;
    // No STT backend is wired up in the demo binary; say "hey luma" all you
    // want, the gate stays put
    let (recognizer, transcript_rx) = NullRecognizer::with_channel();

    let mut client = StreamClient::new(
        config,
        Box::new(capture),
        Box::new(recognizer),
        transcript_rx,
        None,
    )?;

    let mut playback = CpalPlayback::new(client.playback_queue())?;
    playback.start()?;

    client.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    client.stop().await;
    playback.stop();

    Ok(())
}

#[cfg(not(feature = "audio-io"))]
async fn run() -> Result<()> {
    anyhow::bail!("built without the audio-io feature; no devices to stream from")
}
