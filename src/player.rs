//! Player activity poller
//!
//! Watches the local player's activity file: non-empty, nonzero content
//! means playback. While playback is active the amplifier is kept
//! powered on with the configured input selected; once activity has
//! been absent for the idle timeout, the amplifier is powered down.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use av2_amplifier::{Amplifier, Input};

use crate::config::PlayerConfig;

pub async fn run(amp: Arc<Amplifier>, cfg: PlayerConfig) {
    let Some(path) = cfg.activity_file else {
        debug!("player poller disabled: no activity file configured");
        return;
    };
    let input: Input = match cfg.input.parse() {
        Ok(input) => input,
        Err(e) => {
            warn!("player poller disabled: {e}");
            return;
        }
    };

    let idle_timeout = Duration::from_secs(cfg.idle_timeout_secs);
    let mut tick = time::interval(Duration::from_millis(cfg.poll_interval_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut was_active = false;
    let mut last_active: Option<Instant> = None;
    info!("watching {} for player activity", path.display());

    loop {
        tick.tick().await;
        let active = read_activity(&path);

        if active {
            last_active = Some(Instant::now());
        }

        if active && !was_active {
            info!("player started - amplifier on, input {input}");
            amp.set_power(true);
            if let Err(e) = amp.set_input(input) {
                warn!("input select failed: {e}");
            }
        } else if !active && was_active {
            debug!("player idle - standby in {}s", idle_timeout.as_secs());
        }

        if !active {
            if let Some(t) = last_active {
                if t.elapsed() >= idle_timeout {
                    info!(
                        "player idle for {}s - amplifier standby",
                        idle_timeout.as_secs()
                    );
                    amp.set_power(false);
                    // Cleared so the standby command is not repeated
                    // every poll while the player stays idle
                    last_active = None;
                }
            }
        }

        was_active = active;
    }
}

/// Non-empty, nonzero file content counts as playback activity. An
/// unreadable or missing file counts as idle.
fn read_activity(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            !trimmed.is_empty() && trimmed != "0"
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use av2_amplifier::{Amplifier, Channel, TransportError};
    use tokio::sync::broadcast;

    #[test]
    fn activity_file_semantics() {
        let dir = std::env::temp_dir();
        let path = dir.join("av2-bridge-activity-test");

        std::fs::write(&path, "1\n").unwrap();
        assert!(read_activity(&path));

        std::fs::write(&path, "0\n").unwrap();
        assert!(!read_activity(&path));

        std::fs::write(&path, "   \n").unwrap();
        assert!(!read_activity(&path));

        std::fs::write(&path, "playing").unwrap();
        assert!(read_activity(&path));

        std::fs::remove_file(&path).unwrap();
        assert!(!read_activity(&path));
    }

    struct MockChannel {
        writes: Mutex<Vec<Vec<u8>>>,
        frame_tx: broadcast::Sender<Vec<u8>>,
    }

    impl MockChannel {
        fn new() -> Arc<Self> {
            let (frame_tx, _) = broadcast::channel(16);
            Arc::new(Self {
                writes: Mutex::new(Vec::new()),
                frame_tx,
            })
        }

        /// Payloads of the full frames sent so far (attention bytes
        /// filtered out, framing stripped)
        fn sent_payloads(&self) -> Vec<Vec<u8>> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|w| w.len() > 1)
                .map(|w| w[5..w.len() - 1].to_vec())
                .collect()
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
            self.writes.lock().unwrap().push(bytes.to_vec());
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
    async fn poller_drives_power_and_input_once_per_edge() {
        let path = std::env::temp_dir().join("av2-bridge-poller-test");
        std::fs::write(&path, "0").unwrap();

        let mock = MockChannel::new();
        let amp = Arc::new(Amplifier::new(mock.clone()));
        let cfg = PlayerConfig {
            activity_file: Some(path.clone()),
            poll_interval_ms: 100,
            input: "OP1".into(),
            idle_timeout_secs: 1,
        };
        tokio::spawn(run(Arc::clone(&amp), cfg));

        // Idle player: nothing goes out
        time::sleep(Duration::from_millis(500)).await;
        assert!(mock.sent_payloads().is_empty());

        // Idle -> playing edge: power on + input select, exactly once
        std::fs::write(&path, "1").unwrap();
        settle_until(|| mock.sent_payloads().len() >= 2).await;
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(mock.sent_payloads(), vec![vec![0x50], vec![0x49, 7]]);

        // Playing -> idle edge: standby after the timeout, exactly once
        std::fs::write(&path, "0").unwrap();
        settle_until(|| mock.sent_payloads().len() >= 3).await;
        time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(
            mock.sent_payloads(),
            vec![vec![0x50], vec![0x49, 7], vec![0x70]]
        );

        std::fs::remove_file(&path).unwrap();
    }
}
