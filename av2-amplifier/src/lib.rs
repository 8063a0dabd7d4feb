//! High-level amplifier interface
//!
//! This crate sits on top of `av2-transport` and exposes the amplifier
//! as semantic operations: power, mute, volume, input selection, menu
//! toggles and per-input labels. It owns the single device-state
//! instance, tracks startup synchronisation, and broadcasts
//! state-change events to collaborators (the CEC bridge, the player
//! poller, logging).
//!
//! Setters follow a confirmed-update policy: the cached state changes
//! only when the device's own status frame confirms it, never at call
//! time. A setter whose requested value already matches the cache
//! enqueues nothing.

pub mod error;
pub mod state;

pub use error::AmplifierError;
pub use state::{AmpEvent, AmpState, StartupProgress};

// Re-export the transport surface consumers need alongside the facade
pub use av2_transport::status::{
    DecodeMode, DistanceUnits, FirmwareVersion, Input, InputLabel, InputMenuStatus,
    SoftwareVersion, SpeakerMenuStatus, SpeakerSize, SystemStatus,
};
pub use av2_transport::{Channel, CommandQueue, SerialChannel, TransportError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use av2_transport::protocol::{cmd, timing, volume};
use av2_transport::status::ParsedStatus;
use av2_transport::{frame, status};

/// Broadcast channel capacity for engine events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Semantic interface to the amplifier.
///
/// Created from any [`Channel`]; spawns the command queue pump and the
/// decode task. Both are torn down on drop.
pub struct Amplifier {
    queue: CommandQueue,
    shared: Arc<Shared>,
    decode_task: JoinHandle<()>,
}

struct Shared {
    state: Mutex<AmpState>,
    event_tx: broadcast::Sender<AmpEvent>,
    ready_notified: AtomicBool,
    /// Pending debounced audio-status broadcast; replaced, never stacked
    volume_sync: Mutex<Option<JoinHandle<()>>>,
}

impl Amplifier {
    /// Build the engine on an already-open channel.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        let queue = CommandQueue::new(Arc::clone(&channel));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            state: Mutex::new(AmpState::default()),
            event_tx,
            ready_notified: AtomicBool::new(false),
            volume_sync: Mutex::new(None),
        });

        let rx = channel.subscribe_frames();
        let decode_shared = Arc::clone(&shared);
        let decode_task = tokio::spawn(decode_loop(rx, decode_shared));

        Self {
            queue,
            shared,
            decode_task,
        }
    }

    /// Open the serial control port and build the engine on it.
    pub fn open(path: &str) -> Result<Self, AmplifierError> {
        let channel = SerialChannel::open(path)?;
        Ok(Self::new(Arc::new(channel)))
    }

    /// Ask the device for every status record, in a fixed order. The
    /// replies drive startup synchronisation; [`AmpEvent::Ready`] fires
    /// once the required ones have arrived, whatever order the device
    /// answers in.
    pub fn request_all_status(&self) {
        for code in [
            cmd::REQUEST_SYSTEM_STATUS,
            cmd::REQUEST_INPUT_MENU_STATUS,
            cmd::REQUEST_SPEAKER_MENU_STATUS,
            cmd::REQUEST_SOFTWARE_VERSION,
            cmd::REQUEST_FIRMWARE_VERSION,
            cmd::REQUEST_EXTRA_STATUS,
        ] {
            self.queue.enqueue(vec![code]);
        }
    }

    /// Snapshot of the current believed state
    pub fn state(&self) -> AmpState {
        self.shared.state.lock().clone()
    }

    /// Whether startup synchronisation has completed
    pub fn is_ready(&self) -> bool {
        self.shared.ready_notified.load(Ordering::SeqCst)
    }

    /// Subscribe to engine events (state changes, readiness, debounced
    /// audio status), delivered in decode order.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AmpEvent> {
        self.shared.event_tx.subscribe()
    }

    // === System flags ===

    pub fn power(&self) -> Option<bool> {
        self.system_flag(|s| s.power)
    }

    pub fn set_power(&self, on: bool) {
        self.set_system_flag(self.power(), on, cmd::POWER_ON, cmd::POWER_OFF);
    }

    pub fn mute(&self) -> Option<bool> {
        self.system_flag(|s| s.mute)
    }

    pub fn set_mute(&self, on: bool) {
        self.set_system_flag(self.mute(), on, cmd::MUTE_ON, cmd::MUTE_OFF);
    }

    pub fn display(&self) -> Option<bool> {
        self.system_flag(|s| s.display)
    }

    pub fn set_display(&self, on: bool) {
        self.set_system_flag(self.display(), on, cmd::DISPLAY_ON, cmd::DISPLAY_OFF);
    }

    pub fn midnight_mode(&self) -> Option<bool> {
        self.system_flag(|s| s.midnight_mode)
    }

    pub fn set_midnight_mode(&self, on: bool) {
        self.set_system_flag(self.midnight_mode(), on, cmd::MIDNIGHT_ON, cmd::MIDNIGHT_OFF);
    }

    pub fn bass_mix(&self) -> Option<bool> {
        self.system_flag(|s| s.bass_mix)
    }

    pub fn set_bass_mix(&self, on: bool) {
        self.set_system_flag(self.bass_mix(), on, cmd::BASS_MIX_ON, cmd::BASS_MIX_OFF);
    }

    pub fn cine_eq(&self) -> Option<bool> {
        self.system_flag(|s| s.cine_eq)
    }

    pub fn set_cine_eq(&self, on: bool) {
        self.set_system_flag(self.cine_eq(), on, cmd::CINE_EQ_ON, cmd::CINE_EQ_OFF);
    }

    pub fn verbose(&self) -> Option<bool> {
        self.system_flag(|s| s.verbose)
    }

    pub fn set_verbose(&self, on: bool) {
        self.set_system_flag(self.verbose(), on, cmd::VERBOSE_ON, cmd::VERBOSE_OFF);
    }

    pub fn input_menu_open(&self) -> Option<bool> {
        self.system_flag(|s| s.input_menu)
    }

    pub fn set_input_menu(&self, open: bool) {
        self.set_system_flag(
            self.input_menu_open(),
            open,
            cmd::INPUT_MENU_OPEN,
            cmd::INPUT_MENU_CLOSE,
        );
    }

    pub fn speaker_menu_open(&self) -> Option<bool> {
        self.system_flag(|s| s.speaker_menu)
    }

    pub fn set_speaker_menu(&self, open: bool) {
        self.set_system_flag(
            self.speaker_menu_open(),
            open,
            cmd::SPEAKER_MENU_OPEN,
            cmd::SPEAKER_MENU_CLOSE,
        );
    }

    // === Volume ===

    pub fn volume(&self) -> Option<u8> {
        self.shared.state.lock().system.as_ref().map(|s| s.volume)
    }

    /// Set the volume to an absolute level.
    ///
    /// Levels above 99 are rejected; so is 10, which the device
    /// reassigns to an unrelated function and must never see as a
    /// level byte.
    pub fn set_volume(&self, level: u8) -> Result<(), AmplifierError> {
        if level > volume::MAX {
            return Err(AmplifierError::InvalidParameter(format!(
                "volume {level} out of range (max {})",
                volume::MAX
            )));
        }
        if level == volume::RESERVED_STEP {
            return Err(AmplifierError::InvalidParameter(
                "volume level 10 is reserved by the device".into(),
            ));
        }
        if self.volume() == Some(level) {
            return Ok(());
        }
        self.queue.enqueue(vec![cmd::VOLUME_SET, level]);
        Ok(())
    }

    /// Step the volume up one notch, skipping the reserved level 10 and
    /// saturating at 99. A no-op until the first system status arrives.
    pub fn volume_up(&self) {
        let Some(current) = self.volume() else {
            debug!("volume_up ignored: state not yet synchronised");
            return;
        };
        let next = step_up(current);
        if next != current {
            self.queue.enqueue(vec![cmd::VOLUME_SET, next]);
        }
    }

    /// Step the volume down one notch, skipping the reserved level 10
    /// and saturating at 0. A no-op until the first system status
    /// arrives.
    pub fn volume_down(&self) {
        let Some(current) = self.volume() else {
            debug!("volume_down ignored: state not yet synchronised");
            return;
        };
        let next = step_down(current);
        if next != current {
            self.queue.enqueue(vec![cmd::VOLUME_SET, next]);
        }
    }

    // === Input selection and labels ===

    pub fn input(&self) -> Option<Input> {
        self.shared.state.lock().system.as_ref().map(|s| s.input)
    }

    pub fn set_input(&self, input: Input) -> Result<(), AmplifierError> {
        let Some(code) = input.to_code() else {
            return Err(AmplifierError::InvalidParameter(format!(
                "{input} is not selectable"
            )));
        };
        if self.input() == Some(input) {
            return Ok(());
        }
        self.queue.enqueue(vec![cmd::INPUT_SELECT, code]);
        Ok(())
    }

    pub fn input_label(&self, input: Input) -> Option<InputLabel> {
        let slot = input.label_slot()?;
        self.shared
            .state
            .lock()
            .input_menu
            .as_ref()
            .map(|m| m.labels[slot])
    }

    pub fn set_input_label(&self, input: Input, label: InputLabel) -> Result<(), AmplifierError> {
        let Some(input_code) = input.to_code().filter(|_| input.label_slot().is_some()) else {
            return Err(AmplifierError::InvalidParameter(format!(
                "{input} has no label slot"
            )));
        };
        let Some(label_code) = label.to_code() else {
            return Err(AmplifierError::InvalidParameter(
                "label code outside the vocabulary".into(),
            ));
        };
        if self.input_label(input) == Some(label) {
            return Ok(());
        }
        self.queue
            .enqueue(vec![cmd::INPUT_LABEL_SET, input_code, label_code]);
        Ok(())
    }

    // === Speaker menu ===

    pub fn units(&self) -> Option<DistanceUnits> {
        self.shared
            .state
            .lock()
            .speaker_menu
            .as_ref()
            .map(|s| s.units)
    }

    pub fn set_units(&self, units: DistanceUnits) {
        if self.units() == Some(units) {
            return;
        }
        let code = match units {
            DistanceUnits::Feet => cmd::UNITS_FEET,
            DistanceUnits::Metres => cmd::UNITS_METRES,
        };
        self.queue.enqueue(vec![code]);
    }

    pub fn speaker_menu(&self) -> Option<SpeakerMenuStatus> {
        self.shared.state.lock().speaker_menu
    }

    // === Read-only status ===

    pub fn decode_mode(&self) -> Option<DecodeMode> {
        self.shared
            .state
            .lock()
            .system
            .as_ref()
            .map(|s| s.decode_mode)
    }

    pub fn software_version(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .software_version
            .as_ref()
            .map(|v| v.version.clone())
    }

    pub fn firmware_version(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .firmware_version
            .as_ref()
            .map(|v| v.version.clone())
    }

    // === Internals ===

    fn system_flag(&self, f: impl FnOnce(&SystemStatus) -> bool) -> Option<bool> {
        self.shared.state.lock().system.as_ref().map(f)
    }

    /// Confirmed-update discipline for single-opcode flag transitions:
    /// skip when the cache already matches, otherwise put the opcode on
    /// the queue and let the device's status frame move the cache.
    fn set_system_flag(&self, current: Option<bool>, want: bool, on: u8, off: u8) {
        if current == Some(want) {
            return;
        }
        self.queue.enqueue(vec![if want { on } else { off }]);
    }
}

impl Drop for Amplifier {
    fn drop(&mut self) {
        self.decode_task.abort();
        if let Some(pending) = self.shared.volume_sync.lock().take() {
            pending.abort();
        }
    }
}

/// Next level up: 9 jumps to 11 (the device reassigns level 10), 99
/// saturates.
fn step_up(v: u8) -> u8 {
    match v {
        9 => 11,
        v if v >= volume::MAX => volume::MAX,
        v => v + 1,
    }
}

/// Next level down: 11 jumps to 9, 0 saturates.
fn step_down(v: u8) -> u8 {
    match v {
        11 => 9,
        0 => 0,
        v => v - 1,
    }
}

// ---------------------------------------------------------------------------
// Decode task
// ---------------------------------------------------------------------------

/// Consume inbound frames, update state wholesale and emit events.
///
/// Malformed frames are dropped with a warning and touch nothing;
/// unknown status codes are ignored silently. The loop ends when the
/// channel's frame stream closes.
async fn decode_loop(mut rx: broadcast::Receiver<Vec<u8>>, shared: Arc<Shared>) {
    loop {
        let raw = match rx.recv().await {
            Ok(raw) => raw,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("decode loop lagged by {n} frames");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let payload = match frame::decode(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("dropping frame: {e}");
                continue;
            }
        };
        let parsed = match status::try_parse_status(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("dropping malformed status: {e}");
                continue;
            }
        };

        apply_status(&shared, parsed);
    }
    debug!("decode loop exiting");
}

fn apply_status(shared: &Arc<Shared>, parsed: ParsedStatus) {
    let (previous, current) = {
        let mut state = shared.state.lock();
        let previous = state.clone();
        match parsed {
            ParsedStatus::System(s) => {
                state.system = Some(s);
                state.startup.mark(StartupProgress::SYSTEM);
            }
            ParsedStatus::InputMenu(m) => {
                state.input_menu = Some(m);
                state.startup.mark(StartupProgress::INPUT_MENU);
            }
            ParsedStatus::SpeakerMenu(s) => {
                state.speaker_menu = Some(s);
                state.startup.mark(StartupProgress::SPEAKER_MENU);
            }
            ParsedStatus::SoftwareVersion(v) => {
                state.software_version = Some(v);
                state.startup.mark(StartupProgress::SOFTWARE);
            }
            ParsedStatus::FirmwareVersion(v) => {
                state.firmware_version = Some(v);
                state.startup.mark(StartupProgress::FIRMWARE);
            }
            ParsedStatus::Extra => {
                state.startup.mark(StartupProgress::EXTRA);
            }
            ParsedStatus::Unknown { code } => {
                debug!("ignoring unknown status code 0x{code:02X}");
                return;
            }
        }
        (previous, state.clone())
    };

    let _ = shared.event_tx.send(AmpEvent::StateChanged {
        previous: previous.clone(),
        current: current.clone(),
    });

    if current.startup.is_complete() && !shared.ready_notified.swap(true, Ordering::SeqCst) {
        info!("amplifier state synchronised");
        let _ = shared.event_tx.send(AmpEvent::Ready);
    }

    // A confirmed volume change recomputes the downstream audio status,
    // debounced so a volume ramp produces one broadcast
    if let Some(system) = current.system {
        let prev_volume = previous.system.map(|s| s.volume);
        if prev_volume != Some(system.volume) {
            schedule_audio_status(shared, system.volume, system.mute);
        }
    }
}

fn schedule_audio_status(shared: &Arc<Shared>, volume: u8, mute: bool) {
    let tx = shared.event_tx.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(timing::VOLUME_SYNC_DEBOUNCE_MS)).await;
        debug!("audio status sync: volume={volume} mute={mute}");
        let _ = tx.send(AmpEvent::AudioStatus { volume, mute });
    });
    let mut slot = shared.volume_sync.lock();
    if let Some(previous) = slot.replace(handle) {
        previous.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_steps_skip_reserved_level() {
        assert_eq!(step_up(9), 11);
        assert_eq!(step_down(11), 9);
        assert_eq!(step_up(10), 11);
        assert_eq!(step_down(10), 9);
        assert_eq!(step_up(0), 1);
        assert_eq!(step_up(99), 99);
        assert_eq!(step_down(0), 0);
        assert_eq!(step_down(1), 0);
    }
}
