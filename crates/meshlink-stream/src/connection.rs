//! Framed stream connection shared by the TCP and serial transports
//!
//! Writes go straight to the stream behind an async mutex. A reader task owns
//! the read half, runs it through [`StreamDecoder`] and pushes frames and
//! console lines into the session's event channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meshlink_core::protocol::{encode_stream_frame, DecodedItem, StreamDecoder, WAKE_SEQUENCE};
use meshlink_core::{
    Connection, ConnectionEvent, ConnectionEvents, DeviceId, FromRadio, MeshError, MeshResult,
    ToRadio,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::StreamTransportError;

const READ_BUFFER_SIZE: usize = 1024;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ----------------------------------------------------------------------------
// Stream Connection
// ----------------------------------------------------------------------------

pub struct StreamConnection {
    device_id: DeviceId,
    writer: tokio::sync::Mutex<BoxedWriter>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    connected: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StreamConnection {
    /// Wake the device's parser and start reading from `stream`
    pub async fn start<S>(
        device_id: DeviceId,
        stream: S,
    ) -> MeshResult<(Arc<Self>, ConnectionEvents)>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        write_half
            .write_all(&WAKE_SEQUENCE)
            .await
            .map_err(|e| StreamTransportError::WriteFailed(e.to_string()))?;
        write_half
            .flush()
            .await
            .map_err(|e| StreamTransportError::WriteFailed(e.to_string()))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(
            device_id.clone(),
            read_half,
            events_tx.clone(),
            connected.clone(),
        ));
        debug!("Stream session to {} started", device_id);

        let connection = Self {
            device_id,
            writer: tokio::sync::Mutex::new(Box::new(write_half)),
            events: events_tx,
            connected,
            reader: Mutex::new(Some(reader)),
        };
        Ok((Arc::new(connection), events_rx))
    }

    fn stop_reader(&self) {
        let reader = match self.reader.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

async fn read_loop<R>(
    device_id: DeviceId,
    mut reader: R,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    connected: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = StreamDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                if connected.swap(false, Ordering::SeqCst) {
                    info!("{} closed the stream", device_id);
                    let _ = events.send(ConnectionEvent::Error {
                        error: MeshError::disconnected("stream closed by device"),
                        reconnectable: true,
                    });
                }
                return;
            }
            Ok(n) => n,
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    warn!("Read from {} failed: {}", device_id, e);
                    let _ = events.send(ConnectionEvent::Error {
                        error: MeshError::io_failed(e.to_string()),
                        reconnectable: true,
                    });
                }
                return;
            }
        };

        for item in decoder.push(&buf[..n]) {
            let event = match item {
                DecodedItem::Frame(body) => match FromRadio::decode(&body) {
                    Ok(frame) => ConnectionEvent::Data(frame),
                    Err(e) => {
                        warn!("Undecodable frame from {} ({} bytes): {}", device_id, body.len(), e);
                        continue;
                    }
                },
                DecodedItem::Text(line) => ConnectionEvent::LogLine(line),
            };
            if events.send(event).is_err() {
                trace!("Event receiver for {} dropped", device_id);
                return;
            }
        }
    }
}

#[async_trait]
impl Connection for StreamConnection {
    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, frame: ToRadio) -> MeshResult<()> {
        if !self.is_connected() {
            return Err(StreamTransportError::Closed.into());
        }
        let bytes = encode_stream_frame(&frame.encode()?)?;

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| StreamTransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| StreamTransportError::WriteFailed(e.to_string()))?;
        trace!("Wrote {} bytes to {}", bytes.len(), self.device_id);
        Ok(())
    }

    async fn disconnect(&self, reason: &str, should_reconnect: bool) -> MeshResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_reader();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("Error closing stream to {}: {}", self.device_id, e);
        }
        info!("Disconnected from {} ({})", self.device_id, reason);

        let event = if should_reconnect {
            ConnectionEvent::Error {
                error: MeshError::disconnected(reason),
                reconnectable: true,
            }
        } else {
            ConnectionEvent::Disconnected
        };
        let _ = self.events.send(event);
        Ok(())
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.stop_reader();
    }
}
