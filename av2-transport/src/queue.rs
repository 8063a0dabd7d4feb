//! Command queue and timing-governed transmitter
//!
//! All outbound traffic funnels through one FIFO. A pump task ticks
//! every 25 ms; at most one frame is ever in flight (the busy flag is
//! checked on every tick), and each transmission follows the device's
//! receiver contract:
//!
//! 1. wait out the 105 ms settling gap since the previous command
//!    finished draining,
//! 2. write the lone attention byte and drain,
//! 3. if the link sat idle for more than 200 ms, pause another 25 ms so
//!    the device wakes before the real frame arrives,
//! 4. write the complete frame in one write and drain.
//!
//! The two-phase write is part of the wire contract - collapsing the
//! attention byte into the frame write is an observable protocol
//! violation. A failed send is logged and its payload dropped; there is
//! no retry and no reconnection here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::frame;
use crate::protocol::timing;
use crate::Channel;

/// FIFO command queue feeding the single-flight transmitter.
///
/// Must be created inside a tokio runtime; the pump task is aborted
/// when the queue is dropped.
pub struct CommandQueue {
    inner: Arc<QueueInner>,
    pump: JoinHandle<()>,
}

struct QueueInner {
    channel: Arc<dyn Channel>,
    pending: Mutex<VecDeque<Vec<u8>>>,
    busy: AtomicBool,
    last_complete: Mutex<Option<Instant>>,
}

impl CommandQueue {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        let inner = Arc::new(QueueInner {
            channel,
            pending: Mutex::new(VecDeque::new()),
            busy: AtomicBool::new(false),
            last_complete: Mutex::new(None),
        });

        let pump_inner = Arc::clone(&inner);
        let pump = tokio::spawn(async move {
            let mut tick = time::interval(Duration::from_millis(timing::TICK_MS));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                pump_inner.tick().await;
            }
        });

        Self { inner, pump }
    }

    /// Append a command payload. Never blocks, never rejects; the
    /// payload is owned by the queue until it has been transmitted.
    pub fn enqueue(&self, payload: Vec<u8>) {
        debug!("enqueue {:02X?}", payload);
        self.inner.pending.lock().push_back(payload);
    }

    /// Number of payloads waiting (not counting one in flight)
    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.pending.lock().is_empty()
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl QueueInner {
    /// One pump tick: a no-op while a send is in progress or nothing is
    /// queued, otherwise transmit the head entry to completion.
    async fn tick(&self) {
        if self.busy.load(Ordering::Acquire) {
            return;
        }
        let Some(payload) = self.pending.lock().pop_front() else {
            return;
        };
        self.busy.store(true, Ordering::Release);
        if let Err(e) = self.transmit(&payload).await {
            // Dropped, not requeued - restarting the engine is the
            // caller's recovery path
            warn!("command {:02X?} dropped: {e}", payload);
        }
        self.busy.store(false, Ordering::Release);
    }

    async fn transmit(&self, payload: &[u8]) -> Result<(), TransportError> {
        let elapsed = self.last_complete.lock().map(|t| t.elapsed());

        if let Some(elapsed) = elapsed {
            let gap = Duration::from_millis(timing::MIN_COMMAND_GAP_MS);
            if elapsed < gap {
                time::sleep(gap - elapsed).await;
            }
        }

        // Attention byte on its own, fully drained, before the frame
        self.channel.write(&[frame::COMMAND_HEADER]).await?;
        self.channel.drain().await?;

        // A link that sat idle needs the wake pause; the first command
        // after startup counts as idle
        let was_idle = elapsed.is_none_or(|e| e > Duration::from_millis(timing::IDLE_THRESHOLD_MS));
        if was_idle {
            time::sleep(Duration::from_millis(timing::WAKE_PAUSE_MS)).await;
        }

        let encoded = frame::encode(payload);
        debug!("frame out: {:02X?}", encoded);
        self.channel.write(&encoded).await?;
        self.channel.drain().await?;

        *self.last_complete.lock() = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    struct MockChannel {
        writes: Mutex<Vec<(Instant, Vec<u8>)>>,
        frame_tx: broadcast::Sender<Vec<u8>>,
        fail_writes: AtomicBool,
    }

    impl MockChannel {
        fn new() -> Arc<Self> {
            let (frame_tx, _) = broadcast::channel(16);
            Arc::new(Self {
                writes: Mutex::new(Vec::new()),
                frame_tx,
                fail_writes: AtomicBool::new(false),
            })
        }

        fn writes(&self) -> Vec<(Instant, Vec<u8>)> {
            self.writes.lock().clone()
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
            if self.fail_writes.load(Ordering::Relaxed) {
                return Err(TransportError::Write("mock failure".into()));
            }
            self.writes.lock().push((Instant::now(), bytes.to_vec()));
            Ok(())
        }

        async fn drain(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn subscribe_frames(&self) -> broadcast::Receiver<Vec<u8>> {
            self.frame_tx.subscribe()
        }
    }

    async fn settle_until<F: Fn() -> bool>(done: F) {
        for _ in 0..1000 {
            if done() {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn two_phase_write_order() {
        let mock = MockChannel::new();
        let queue = CommandQueue::new(mock.clone());

        queue.enqueue(vec![0x50]);
        settle_until(|| mock.writes().len() >= 2).await;

        let writes = mock.writes();
        assert_eq!(writes[0].1, vec![0x2A], "attention byte must go alone");
        assert_eq!(writes[1].1, frame::encode(&[0x50]));
    }

    #[tokio::test(start_paused = true)]
    async fn transmissions_respect_minimum_gap() {
        let mock = MockChannel::new();
        let queue = CommandQueue::new(mock.clone());

        for b in [0x50u8, 0x4D, 0x44, 0x56] {
            queue.enqueue(vec![b]);
        }
        settle_until(|| mock.writes().len() >= 8).await;

        // Transmission start = each attention-byte write
        let starts: Vec<Instant> = mock
            .writes()
            .iter()
            .filter(|(_, w)| w.as_slice() == [0x2A].as_slice())
            .map(|(t, _)| *t)
            .collect();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= Duration::from_millis(timing::MIN_COMMAND_GAP_MS),
                "start-to-start gap {gap:?} below minimum"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_is_dropped_not_requeued() {
        let mock = MockChannel::new();
        let queue = CommandQueue::new(mock.clone());

        mock.fail_writes.store(true, Ordering::Relaxed);
        queue.enqueue(vec![0x50]);
        time::sleep(Duration::from_millis(500)).await;
        assert!(queue.is_empty(), "failed payload must not be requeued");
        assert!(mock.writes().is_empty());

        // Channel recovers; the next command goes out normally
        mock.fail_writes.store(false, Ordering::Relaxed);
        queue.enqueue(vec![0x4D]);
        settle_until(|| mock.writes().len() >= 2).await;
        assert_eq!(mock.writes()[1].1, frame::encode(&[0x4D]));
    }

    #[tokio::test(start_paused = true)]
    async fn queue_preserves_fifo_order() {
        let mock = MockChannel::new();
        let queue = CommandQueue::new(mock.clone());

        queue.enqueue(vec![0x50]);
        queue.enqueue(vec![0x4D]);
        queue.enqueue(vec![0x30, 42]);
        settle_until(|| mock.writes().len() >= 6).await;

        let frames: Vec<Vec<u8>> = mock
            .writes()
            .iter()
            .filter(|(_, w)| w.len() > 1)
            .map(|(_, w)| w.clone())
            .collect();
        assert_eq!(
            frames,
            vec![
                frame::encode(&[0x50]),
                frame::encode(&[0x4D]),
                frame::encode(&[0x30, 42]),
            ]
        );
    }
}
