//! WebSocket transport.

use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{
	models::TransportKind,
	services::blockchain::transports::{DuplexTransport, TransportError},
};

/// Opens a WebSocket connection to `uri`.
pub async fn connect(uri: &str) -> Result<DuplexTransport, TransportError> {
	let (socket, _response) = connect_async(uri).await.map_err(|e| {
		TransportError::network(
			format!("Failed to open WebSocket to {}", uri),
			Some(Box::new(e)),
			None,
		)
	})?;
	let (write, read) = socket.split();

	let sink = write
		.with(|frame: String| future::ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::Text(frame))))
		.sink_map_err(|e| TransportError::network("WebSocket write failed", Some(Box::new(e)), None));

	let stream = read.filter_map(|message| {
		future::ready(match message {
			Ok(Message::Text(text)) => Some(Ok(text)),
			Ok(Message::Binary(bytes)) => String::from_utf8(bytes).ok().map(Ok),
			Ok(Message::Close(_)) => Some(Err(TransportError::closed(
				"WebSocket closed by peer",
				None,
				None,
			))),
			Ok(_) => None,
			Err(e) => Some(Err(TransportError::network(
				"WebSocket read failed",
				Some(Box::new(e)),
				None,
			))),
		})
	});

	Ok(DuplexTransport::spawn(
		uri,
		TransportKind::WebSocket,
		sink,
		stream,
	))
}
