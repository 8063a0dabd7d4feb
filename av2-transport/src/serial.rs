//! Serial channel for the amplifier control link
//!
//! Owns the physical port: blocking writes and drains behind a mutex,
//! plus a dedicated reader thread that splits the inbound byte stream
//! on the 0xFF delimiter and broadcasts each raw frame. Writes are tiny
//! (a handful of bytes at 9600 baud), so holding the lock across the
//! blocking call is fine.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::frame::EOL;
use crate::Channel;

/// The device speaks 9600 8N1, no flow control. Not configurable.
pub const BAUD_RATE: u32 = 9600;

/// Reader poll timeout - only affects how often the shutdown flag is
/// checked while the link is quiet (ms)
const READ_TIMEOUT_MS: u64 = 50;

/// Broadcast channel capacity for inbound frames
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Serial transport for the amplifier's control port
pub struct SerialChannel {
    writer: Mutex<Box<dyn SerialPort>>,
    frame_tx: broadcast::Sender<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    path: String,
}

impl SerialChannel {
    /// Open the control port and start the frame reader thread.
    pub fn open(path: &str) -> Result<Self, TransportError> {
        let port = serialport::new(path, BAUD_RATE)
            .timeout(Duration::from_millis(READ_TIMEOUT_MS))
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|e| TransportError::PortOpen(format!("{path}: {e}")))?;

        let reader = port
            .try_clone()
            .map_err(|e| TransportError::PortOpen(format!("{path}: {e}")))?;

        let (frame_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));

        let tx = frame_tx.clone();
        let flag = Arc::clone(&shutdown);
        std::thread::Builder::new()
            .name("av2-frame-reader".into())
            .spawn(move || run_frame_reader_loop(reader, tx, flag))
            .expect("Failed to spawn frame reader thread");

        Ok(Self {
            writer: Mutex::new(port),
            frame_tx,
            shutdown,
            path: path.to_string(),
        })
    }

    /// Path the port was opened with
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Channel for SerialChannel {
    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut port = self.writer.lock().unwrap();
        port.write_all(bytes)
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn drain(&self) -> Result<(), TransportError> {
        let mut port = self.writer.lock().unwrap();
        port.flush().map_err(|e| TransportError::Drain(e.to_string()))
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<Vec<u8>> {
        self.frame_tx.subscribe()
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        debug!("SerialChannel dropped, signaling frame reader shutdown");
    }
}

/// Reader loop: accumulate bytes until the 0xFF delimiter, broadcast
/// each completed frame. Runs until the shutdown flag is set.
fn run_frame_reader_loop(
    mut port: Box<dyn SerialPort>,
    tx: broadcast::Sender<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
) {
    debug!("frame reader thread started");
    let mut buf = [0u8; 64];
    let mut pending: Vec<u8> = Vec::new();

    while !shutdown.load(Ordering::Relaxed) {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                for &b in &buf[..n] {
                    if b == EOL {
                        if !pending.is_empty() {
                            debug!("frame in: {:02X?}", pending);
                            // Ignored error just means no subscriber yet
                            let _ = tx.send(std::mem::take(&mut pending));
                        }
                    } else {
                        pending.push(b);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("frame reader error: {e}");
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }

    debug!("frame reader thread exiting");
}
