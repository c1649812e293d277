//! Subscriber side of the snapshot stream, for debugging a running service.

use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

/// Errors from [`subscribe`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("WebSocket error: {0}")]
    Stream(#[from] tungstenite::Error),
}

/// Connect to a snapshot stream and yield each text payload as it arrives.
///
/// Binary, ping and pong frames are skipped. The stream ends when the server
/// closes the connection.
pub async fn subscribe(
    url: &str,
) -> Result<impl Stream<Item = Result<String, ClientError>>, ClientError> {
    let (socket, response) = connect_async(url)
        .await
        .map_err(|source| ClientError::Connect {
            url: url.to_string(),
            source,
        })?;
    debug!(status = %response.status(), "Connected to {}", url);

    Ok(socket
        .take_while(|message| {
            futures::future::ready(!matches!(message, Ok(Message::Close(_))))
        })
        .filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(_) => None,
                Err(e) => Some(Err(ClientError::from(e))),
            }
        }))
}
