//! Local socket transport (newline delimited JSON-RPC over a Unix domain socket, as served by
//! `geth.ipc`).

use crate::services::blockchain::transports::{DuplexTransport, TransportError};

/// Opens a connection to the socket at `path`.
#[cfg(unix)]
pub async fn connect(path: &str) -> Result<DuplexTransport, TransportError> {
	use futures::{SinkExt, StreamExt};
	use tokio::net::UnixStream;
	use tokio_util::codec::{Framed, LinesCodec};

	use crate::models::TransportKind;

	let socket = UnixStream::connect(path).await.map_err(|e| {
		TransportError::network(
			format!("Failed to connect to socket {}", path),
			Some(Box::new(e)),
			None,
		)
	})?;
	let (write, read) = Framed::new(socket, LinesCodec::new()).split();

	let sink = write.sink_map_err(|e| {
		TransportError::network("Socket write failed", Some(Box::new(e)), None)
	});
	let stream = read.map(|line| {
		line.map_err(|e| TransportError::network("Socket read failed", Some(Box::new(e)), None))
	});

	Ok(DuplexTransport::spawn(
		path,
		TransportKind::LocalSocket,
		sink,
		stream,
	))
}

#[cfg(not(unix))]
pub async fn connect(path: &str) -> Result<DuplexTransport, TransportError> {
	Err(TransportError::unsupported_transport(
		format!("Local sockets are only supported on unix: {}", path),
		None,
		None,
	))
}
