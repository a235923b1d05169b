//! Push-socket transport — a persistent websocket connection emitting the
//! same logical envelope per text frame.
//!
//! Reconnects with doubling backoff; parse failures drop the frame and keep
//! the connection.

use apiary_core::config::TransportConfig;
use apiary_core::envelope::Envelope;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Run the socket feed until the runtime shuts down.
pub async fn run(config: TransportConfig, tx: mpsc::Sender<Envelope>) {
    if config.socket_url.is_empty() {
        error!("socket transport enabled but socket_url is empty");
        return;
    }

    let mut backoff_secs: u64 = 1;

    loop {
        info!("socket transport connecting to {}", config.socket_url);

        match connect_and_read(&config.socket_url, &tx).await {
            Ok(()) => {
                info!("socket transport receiver dropped, stopping");
                return;
            }
            Err(e) => {
                error!("socket transport error (retry in {backoff_secs}s): {e}");
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
        backoff_secs = (backoff_secs * 2).min(60);
    }
}

/// Read frames until the stream ends or the dispatcher goes away.
/// `Ok(())` means the receiver dropped (shutdown); `Err` means reconnect.
async fn connect_and_read(url: &str, tx: &mpsc::Sender<Envelope>) -> anyhow::Result<()> {
    let (stream, _response) = connect_async(url).await?;
    info!("socket transport connected");
    let (_write, mut read) = stream.split();

    while let Some(frame) = read.next().await {
        let frame = frame?;
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => {
                warn!("socket transport: server closed the connection");
                anyhow::bail!("connection closed by server");
            }
            _ => continue,
        };

        let envelope: Envelope = match serde_json::from_str(text.as_str()) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("socket transport: dropping malformed frame: {e}");
                continue;
            }
        };

        if tx.send(envelope).await.is_err() {
            return Ok(());
        }
    }

    anyhow::bail!("socket stream ended")
}
