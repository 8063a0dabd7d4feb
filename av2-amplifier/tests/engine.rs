//! End-to-end engine tests against an in-memory channel.
//!
//! The mock channel records every outbound write and lets tests inject
//! inbound frames as if the device had pushed them. Time is paused, so
//! the queue's timing discipline and the audio-status debounce run
//! deterministically.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time;

use av2_amplifier::{AmpEvent, Amplifier, Channel, Input, InputLabel, TransportError};

struct MockChannel {
    writes: Mutex<Vec<Vec<u8>>>,
    frame_tx: broadcast::Sender<Vec<u8>>,
}

impl MockChannel {
    fn new() -> Arc<Self> {
        let (frame_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            writes: Mutex::new(Vec::new()),
            frame_tx,
        })
    }

    /// Inject an inbound frame as the reader thread would deliver it
    /// (0xFF delimiter already stripped).
    fn push_frame(&self, frame: &[u8]) {
        self.frame_tx
            .send(frame.to_vec())
            .expect("decode loop should be subscribed");
    }

    fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// Payloads of the full command frames sent so far (attention bytes
    /// filtered out, framing stripped)
    fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.writes()
            .into_iter()
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

/// Build an inbound response frame around `payload`.
fn response(payload: &[u8]) -> Vec<u8> {
    let mut v = b"#AV2 ".to_vec();
    v.extend_from_slice(payload);
    v
}

/// Minimal system status payload: power on, given input code, volume
/// and mute, decode mode Stereo.
fn system_status(input_code: u8, volume: u8, mute: bool) -> Vec<u8> {
    vec![
        0x69,
        0b1000_0000,
        input_code & 0x0F,
        (volume & 0x7F) | if mute { 0x80 } else { 0 },
        0x00,
        0x02,
    ]
}

fn input_menu_status() -> Vec<u8> {
    let mut v = vec![0u8; 14];
    v[0] = 0x6A;
    v[1] = 1; // VIP1 labelled DVD
    v
}

fn speaker_menu_status() -> Vec<u8> {
    let mut v = vec![0u8; 23];
    v[0] = 0x6B;
    v[1] = 2; // front: Large
    v
}

async fn settle() {
    time::sleep(Duration::from_millis(20)).await;
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

fn drain_events(rx: &mut broadcast::Receiver<AmpEvent>) -> Vec<AmpEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn ready_fires_exactly_once_in_any_arrival_order() {
    let mock = MockChannel::new();
    let amp = Amplifier::new(mock.clone());
    let mut rx = amp.subscribe_events();
    settle().await;

    // Scrambled arrival order; extra never arrives at all
    mock.push_frame(&response(&[0x66, 1, 2, 3])); // firmware
    settle().await;
    mock.push_frame(&response(&speaker_menu_status()));
    settle().await;
    mock.push_frame(&response(&[0x73, 4, 11])); // software
    settle().await;
    assert!(!amp.is_ready());
    mock.push_frame(&response(&input_menu_status()));
    settle().await;
    mock.push_frame(&response(&system_status(1, 20, false)));
    settle_until(|| amp.is_ready()).await;

    let ready_count = drain_events(&mut rx)
        .iter()
        .filter(|e| matches!(e, AmpEvent::Ready))
        .count();
    assert_eq!(ready_count, 1);

    // Later state changes never re-fire readiness
    mock.push_frame(&response(&system_status(2, 30, false)));
    settle().await;
    let ready_again = drain_events(&mut rx)
        .iter()
        .filter(|e| matches!(e, AmpEvent::Ready))
        .count();
    assert_eq!(ready_again, 0);
}

#[tokio::test(start_paused = true)]
async fn bad_header_frame_mutates_nothing() {
    let mock = MockChannel::new();
    let amp = Amplifier::new(mock.clone());
    settle().await;

    let mut bogus = b"!AV2 ".to_vec();
    bogus.extend_from_slice(&system_status(1, 20, false));
    mock.push_frame(&bogus);
    settle().await;

    assert_eq!(amp.power(), None);
    assert!(!amp.is_ready());
}

#[tokio::test(start_paused = true)]
async fn matching_setter_enqueues_nothing() {
    let mock = MockChannel::new();
    let amp = Amplifier::new(mock.clone());
    settle().await;

    mock.push_frame(&response(&system_status(1, 20, false)));
    settle_until(|| amp.power() == Some(true)).await;

    let before = mock.writes().len();
    amp.set_power(true);
    amp.set_mute(false);
    amp.set_input(Input::Vip1).unwrap();
    amp.set_volume(20).unwrap();
    time::sleep(Duration::from_millis(500)).await;
    assert_eq!(mock.writes().len(), before, "no-op setters must not send");

    // A real transition does go out
    amp.set_power(false);
    settle_until(|| mock.sent_payloads().contains(&vec![0x70])).await;
}

#[tokio::test(start_paused = true)]
async fn volume_stepping_skips_reserved_level() {
    let mock = MockChannel::new();
    let amp = Amplifier::new(mock.clone());
    settle().await;

    mock.push_frame(&response(&system_status(1, 9, false)));
    settle_until(|| amp.volume() == Some(9)).await;

    amp.volume_up();
    settle_until(|| mock.sent_payloads().contains(&vec![0x30, 11])).await;

    mock.push_frame(&response(&system_status(1, 11, false)));
    settle_until(|| amp.volume() == Some(11)).await;

    amp.volume_down();
    settle_until(|| mock.sent_payloads().contains(&vec![0x30, 9])).await;
}

#[tokio::test(start_paused = true)]
async fn set_volume_rejects_out_of_range_and_reserved() {
    let mock = MockChannel::new();
    let amp = Amplifier::new(mock.clone());
    settle().await;

    assert!(amp.set_volume(100).is_err());
    assert!(amp.set_volume(10).is_err());
    time::sleep(Duration::from_millis(300)).await;
    assert!(mock.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn audio_status_is_debounced_to_one_event() {
    let mock = MockChannel::new();
    let amp = Amplifier::new(mock.clone());
    let mut rx = amp.subscribe_events();
    settle().await;

    // A quick volume ramp: three confirmations within the debounce
    // window
    mock.push_frame(&response(&system_status(1, 20, false)));
    time::sleep(Duration::from_millis(100)).await;
    mock.push_frame(&response(&system_status(1, 21, false)));
    time::sleep(Duration::from_millis(100)).await;
    mock.push_frame(&response(&system_status(1, 22, false)));
    time::sleep(Duration::from_millis(2000)).await;

    let audio: Vec<(u8, bool)> = drain_events(&mut rx)
        .iter()
        .filter_map(|e| match e {
            AmpEvent::AudioStatus { volume, mute } => Some((*volume, *mute)),
            _ => None,
        })
        .collect();
    assert_eq!(audio, vec![(22, false)], "ramp must collapse to one event");
    drop(amp);
}

#[tokio::test(start_paused = true)]
async fn state_records_are_replaced_wholesale() {
    let mock = MockChannel::new();
    let amp = Amplifier::new(mock.clone());
    settle().await;

    mock.push_frame(&response(&input_menu_status()));
    settle_until(|| amp.input_label(Input::Vip1) == Some(InputLabel::Dvd)).await;

    // A fresh record with a different slot set replaces the whole
    // sub-record, including slots that went back to default
    let mut next = vec![0u8; 14];
    next[0] = 0x6A;
    next[2] = 2; // VIP2 labelled CD
    mock.push_frame(&response(&next));
    settle_until(|| amp.input_label(Input::Vip2) == Some(InputLabel::Cd)).await;
    assert_eq!(amp.input_label(Input::Vip1), Some(InputLabel::Default));
}

#[tokio::test(start_paused = true)]
async fn unknown_status_codes_are_ignored() {
    let mock = MockChannel::new();
    let amp = Amplifier::new(mock.clone());
    let mut rx = amp.subscribe_events();
    settle().await;

    mock.push_frame(&response(&[0xEE, 1, 2, 3]));
    settle().await;

    assert!(drain_events(&mut rx).is_empty());
    assert!(!amp.is_ready());
}

#[tokio::test(start_paused = true)]
async fn startup_requests_go_out_in_order() {
    let mock = MockChannel::new();
    let amp = Amplifier::new(mock.clone());
    settle().await;

    amp.request_all_status();
    settle_until(|| mock.sent_payloads().len() >= 6).await;

    assert_eq!(
        mock.sent_payloads(),
        vec![
            vec![0x69],
            vec![0x6A],
            vec![0x6B],
            vec![0x73],
            vec![0x66],
            vec![0x78],
        ]
    );
}
