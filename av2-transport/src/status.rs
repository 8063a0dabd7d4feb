//! Typed decoding of the amplifier's status frames
//!
//! Every inbound payload starts with a response code byte; the rest is
//! a densely packed record that replaces one slice of the device state
//! wholesale. [`try_parse_status`] is the single dispatch point; unknown
//! codes are passed through untouched for forward compatibility with
//! firmware revisions that push codes this crate does not know.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::protocol::status_code;

/// A status record that can be parsed from a response payload
pub trait StatusResponse: Sized {
    /// Response code identifying this record
    const CODE: u8;

    /// Minimum payload length (including the code byte)
    const MIN_LEN: usize;

    /// Parse from a payload whose length and code have been validated
    fn from_payload(payload: &[u8]) -> Result<Self, ParseError>;

    /// Parse with validation
    fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        if payload.len() < Self::MIN_LEN {
            return Err(ParseError::TooShort {
                expected: Self::MIN_LEN,
                got: payload.len(),
            });
        }
        if payload[0] != Self::CODE {
            return Err(ParseError::CodeMismatch {
                expected: Self::CODE,
                got: payload[0],
            });
        }
        Self::from_payload(payload)
    }
}

/// Parse error for status payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TooShort { expected: usize, got: usize },
    CodeMismatch { expected: u8, got: u8 },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { expected, got } => {
                write!(f, "Payload too short: expected {} bytes, got {}", expected, got)
            }
            Self::CodeMismatch { expected, got } => {
                write!(
                    f,
                    "Code mismatch: expected 0x{:02X}, got 0x{:02X}",
                    expected, got
                )
            }
        }
    }
}

impl std::error::Error for ParseError {}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Physical and logical input selections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Input {
    Vip1,
    Vip2,
    An3,
    An4,
    An5,
    An6,
    Op1,
    Op2,
    Co1,
    Co2,
    Multi,
    /// Codes outside 1..=11 - kept rather than rejected so newer
    /// firmware doesn't break older bridges
    #[default]
    Future,
}

impl Input {
    /// The 10 physical inputs, in label-slot order
    pub const PHYSICAL: [Input; 10] = [
        Input::Vip1,
        Input::Vip2,
        Input::An3,
        Input::An4,
        Input::An5,
        Input::An6,
        Input::Op1,
        Input::Op2,
        Input::Co1,
        Input::Co2,
    ];

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Input::Vip1,
            2 => Input::Vip2,
            3 => Input::An3,
            4 => Input::An4,
            5 => Input::An5,
            6 => Input::An6,
            7 => Input::Op1,
            8 => Input::Op2,
            9 => Input::Co1,
            10 => Input::Co2,
            11 => Input::Multi,
            _ => Input::Future,
        }
    }

    /// Wire code for `INPUT_SELECT`. `Future` has no code.
    pub fn to_code(self) -> Option<u8> {
        match self {
            Input::Vip1 => Some(1),
            Input::Vip2 => Some(2),
            Input::An3 => Some(3),
            Input::An4 => Some(4),
            Input::An5 => Some(5),
            Input::An6 => Some(6),
            Input::Op1 => Some(7),
            Input::Op2 => Some(8),
            Input::Co1 => Some(9),
            Input::Co2 => Some(10),
            Input::Multi => Some(11),
            Input::Future => None,
        }
    }

    /// Label slot index (0-9) for physical inputs, `None` otherwise
    pub fn label_slot(self) -> Option<usize> {
        Self::PHYSICAL.iter().position(|&i| i == self)
    }

    pub fn name(self) -> &'static str {
        match self {
            Input::Vip1 => "VIP1",
            Input::Vip2 => "VIP2",
            Input::An3 => "AN3",
            Input::An4 => "AN4",
            Input::An5 => "AN5",
            Input::An6 => "AN6",
            Input::Op1 => "OP1",
            Input::Op2 => "OP2",
            Input::Co1 => "CO1",
            Input::Co2 => "CO2",
            Input::Multi => "Multi",
            Input::Future => "Future",
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Input {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VIP1" => Ok(Input::Vip1),
            "VIP2" => Ok(Input::Vip2),
            "AN3" => Ok(Input::An3),
            "AN4" => Ok(Input::An4),
            "AN5" => Ok(Input::An5),
            "AN6" => Ok(Input::An6),
            "OP1" => Ok(Input::Op1),
            "OP2" => Ok(Input::Op2),
            "CO1" => Ok(Input::Co1),
            "CO2" => Ok(Input::Co2),
            "MULTI" => Ok(Input::Multi),
            _ => Err(format!("unknown input: \"{s}\". Use VIP1/VIP2/AN3-AN6/OP1/OP2/CO1/CO2/Multi")),
        }
    }
}

// ---------------------------------------------------------------------------
// Decode mode
// ---------------------------------------------------------------------------

/// Active decode/processing mode reported in the system status.
///
/// Codes 0-23 and 48-55 are defined; everything else maps to `Future`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DecodeMode {
    Mono,
    AnalogueDirect,
    Stereo,
    PliiMovie,
    PliiMusic,
    PliiMatrix,
    PliiGame,
    PliiEmulation,
    DolbyDigital,
    DolbyDigitalEx,
    Dts,
    DtsEsMatrix,
    DtsEsDiscrete,
    Neo6Cinema,
    Neo6Music,
    Dts9624,
    MpegMultichannel,
    MultiChannelPcm,
    MonoMovie,
    Club,
    ConcertHall,
    Stadium,
    Church,
    Party,
    DolbyHeadphone,
    DolbyVirtualSpeaker,
    StereoDirect,
    FiveChannelStereo,
    SevenChannelStereo,
    DspSurround,
    Bypass,
    Through,
    #[default]
    Future,
}

impl DecodeMode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Mono,
            1 => Self::AnalogueDirect,
            2 => Self::Stereo,
            3 => Self::PliiMovie,
            4 => Self::PliiMusic,
            5 => Self::PliiMatrix,
            6 => Self::PliiGame,
            7 => Self::PliiEmulation,
            8 => Self::DolbyDigital,
            9 => Self::DolbyDigitalEx,
            10 => Self::Dts,
            11 => Self::DtsEsMatrix,
            12 => Self::DtsEsDiscrete,
            13 => Self::Neo6Cinema,
            14 => Self::Neo6Music,
            15 => Self::Dts9624,
            16 => Self::MpegMultichannel,
            17 => Self::MultiChannelPcm,
            18 => Self::MonoMovie,
            19 => Self::Club,
            20 => Self::ConcertHall,
            21 => Self::Stadium,
            22 => Self::Church,
            23 => Self::Party,
            48 => Self::DolbyHeadphone,
            49 => Self::DolbyVirtualSpeaker,
            50 => Self::StereoDirect,
            51 => Self::FiveChannelStereo,
            52 => Self::SevenChannelStereo,
            53 => Self::DspSurround,
            54 => Self::Bypass,
            55 => Self::Through,
            _ => Self::Future,
        }
    }
}

// ---------------------------------------------------------------------------
// Input labels
// ---------------------------------------------------------------------------

/// Display label selected for an input in the input menu.
///
/// Code 0 means "use the input's own default name"; codes 1-20 select
/// from the fixed vocabulary; anything else renders as `---`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InputLabel {
    #[default]
    Default,
    Dvd,
    Cd,
    Sat,
    Tv,
    Vcr,
    Pvr,
    Game,
    Tuner,
    Aux,
    Tape,
    Md,
    Laser,
    Phono,
    Cable,
    Radio,
    Pc,
    Hdd,
    Camera,
    Ipod,
    Bluray,
    Invalid,
}

impl InputLabel {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Default,
            1 => Self::Dvd,
            2 => Self::Cd,
            3 => Self::Sat,
            4 => Self::Tv,
            5 => Self::Vcr,
            6 => Self::Pvr,
            7 => Self::Game,
            8 => Self::Tuner,
            9 => Self::Aux,
            10 => Self::Tape,
            11 => Self::Md,
            12 => Self::Laser,
            13 => Self::Phono,
            14 => Self::Cable,
            15 => Self::Radio,
            16 => Self::Pc,
            17 => Self::Hdd,
            18 => Self::Camera,
            19 => Self::Ipod,
            20 => Self::Bluray,
            _ => Self::Invalid,
        }
    }

    /// Wire code for `INPUT_LABEL_SET`. `Invalid` has no code.
    pub fn to_code(self) -> Option<u8> {
        match self {
            Self::Default => Some(0),
            Self::Dvd => Some(1),
            Self::Cd => Some(2),
            Self::Sat => Some(3),
            Self::Tv => Some(4),
            Self::Vcr => Some(5),
            Self::Pvr => Some(6),
            Self::Game => Some(7),
            Self::Tuner => Some(8),
            Self::Aux => Some(9),
            Self::Tape => Some(10),
            Self::Md => Some(11),
            Self::Laser => Some(12),
            Self::Phono => Some(13),
            Self::Cable => Some(14),
            Self::Radio => Some(15),
            Self::Pc => Some(16),
            Self::Hdd => Some(17),
            Self::Camera => Some(18),
            Self::Ipod => Some(19),
            Self::Bluray => Some(20),
            Self::Invalid => None,
        }
    }

    /// Text shown on the front panel for this selection
    pub fn display(self, input: Input) -> &'static str {
        match self {
            Self::Default => input.name(),
            Self::Dvd => "DVD",
            Self::Cd => "CD",
            Self::Sat => "SAT",
            Self::Tv => "TV",
            Self::Vcr => "VCR",
            Self::Pvr => "PVR",
            Self::Game => "GAME",
            Self::Tuner => "TUNER",
            Self::Aux => "AUX",
            Self::Tape => "TAPE",
            Self::Md => "MD",
            Self::Laser => "LASER",
            Self::Phono => "PHONO",
            Self::Cable => "CABLE",
            Self::Radio => "RADIO",
            Self::Pc => "PC",
            Self::Hdd => "HDD",
            Self::Camera => "CAMERA",
            Self::Ipod => "IPOD",
            Self::Bluray => "BD",
            Self::Invalid => "---",
        }
    }
}

// ---------------------------------------------------------------------------
// Speaker menu enums
// ---------------------------------------------------------------------------

/// Configured size of a speaker group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SpeakerSize {
    #[default]
    Off,
    Small,
    Large,
    TwoSmall,
    TwoLarge,
}

impl SpeakerSize {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Small,
            2 => Self::Large,
            3 => Self::TwoSmall,
            4 => Self::TwoLarge,
            _ => Self::Off,
        }
    }
}

/// Units the distance values are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DistanceUnits {
    #[default]
    Metres,
    Feet,
}

impl DistanceUnits {
    pub fn from_byte(b: u8) -> Self {
        if b != 0 {
            Self::Feet
        } else {
            Self::Metres
        }
    }
}

// ---------------------------------------------------------------------------
// System status
// ---------------------------------------------------------------------------

/// System status record (code 0x69)
///
/// Layout, 0-indexed from the code byte:
/// - byte 1, bits 7..0: power, input menu, speaker menu, display,
///   Dolby Digital, Dolby PLII, DTS, stereo
/// - byte 2, bits 7..4: midnight mode, bass mix, cine EQ, verbose;
///   bits 3..0: input code
/// - byte 3, bit 7: mute; bits 6..0: volume
/// - byte 5: decode mode code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SystemStatus {
    pub power: bool,
    pub input_menu: bool,
    pub speaker_menu: bool,
    pub display: bool,
    pub dolby_digital: bool,
    pub dolby_plii: bool,
    pub dts: bool,
    pub stereo: bool,
    pub midnight_mode: bool,
    pub bass_mix: bool,
    pub cine_eq: bool,
    pub verbose: bool,
    pub mute: bool,
    /// 0-99 on a well-behaved device; values above 99 are
    /// protocol-invalid but stored as received
    pub volume: u8,
    pub input: Input,
    pub decode_mode: DecodeMode,
}

impl StatusResponse for SystemStatus {
    const CODE: u8 = status_code::SYSTEM;
    const MIN_LEN: usize = 6;

    fn from_payload(payload: &[u8]) -> Result<Self, ParseError> {
        let flags = payload[1];
        let opts = payload[2];
        let vol = payload[3];
        Ok(Self {
            power: flags & 0x80 != 0,
            input_menu: flags & 0x40 != 0,
            speaker_menu: flags & 0x20 != 0,
            display: flags & 0x10 != 0,
            dolby_digital: flags & 0x08 != 0,
            dolby_plii: flags & 0x04 != 0,
            dts: flags & 0x02 != 0,
            stereo: flags & 0x01 != 0,
            midnight_mode: opts & 0x80 != 0,
            bass_mix: opts & 0x40 != 0,
            cine_eq: opts & 0x20 != 0,
            verbose: opts & 0x10 != 0,
            input: Input::from_code(opts & 0x0F),
            mute: vol & 0x80 != 0,
            volume: vol & 0x7F,
            decode_mode: DecodeMode::from_code(payload[5]),
        })
    }
}

// ---------------------------------------------------------------------------
// Input menu status
// ---------------------------------------------------------------------------

/// Input menu record (code 0x6A): one label per physical input plus the
/// panorama settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InputMenuStatus {
    /// Label selection per physical input, in [`Input::PHYSICAL`] order
    pub labels: [InputLabel; 10],
    pub panorama: bool,
    /// 0-7
    pub width: u8,
    /// 0-6
    pub depth: u8,
}

impl StatusResponse for InputMenuStatus {
    const CODE: u8 = status_code::INPUT_MENU;
    const MIN_LEN: usize = 14;

    fn from_payload(payload: &[u8]) -> Result<Self, ParseError> {
        let mut labels = [InputLabel::Default; 10];
        for (slot, label) in labels.iter_mut().enumerate() {
            *label = InputLabel::from_code(payload[1 + slot]);
        }
        Ok(Self {
            labels,
            panorama: payload[11] != 0,
            width: payload[12],
            depth: payload[13],
        })
    }
}

// ---------------------------------------------------------------------------
// Speaker menu status
// ---------------------------------------------------------------------------

/// Raw wire layout of the speaker menu record after the code byte
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct SpeakerMenuRaw {
    sizes: [u8; 4],
    subwoofer: u8,
    units: u8,
    distances: [u8; 8],
    levels: [u8; 8],
}

/// Speaker menu record (code 0x6B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SpeakerMenuStatus {
    /// Front / centre / surround / back group sizes
    pub sizes: [SpeakerSize; 4],
    pub subwoofer: bool,
    pub units: DistanceUnits,
    /// Raw distance values, units-dependent, stored verbatim
    pub distances: [u8; 8],
    /// Per-channel trim in dB: raw value minus 30, clamped to -30..=30
    pub levels_db: [i8; 8],
}

impl StatusResponse for SpeakerMenuStatus {
    const CODE: u8 = status_code::SPEAKER_MENU;
    const MIN_LEN: usize = 23;

    fn from_payload(payload: &[u8]) -> Result<Self, ParseError> {
        let (raw, _) =
            SpeakerMenuRaw::read_from_prefix(&payload[1..]).map_err(|_| ParseError::TooShort {
                expected: Self::MIN_LEN,
                got: payload.len(),
            })?;
        let mut sizes = [SpeakerSize::Off; 4];
        for (size, &code) in sizes.iter_mut().zip(raw.sizes.iter()) {
            *size = SpeakerSize::from_code(code);
        }
        let mut levels_db = [0i8; 8];
        for (level, &rawv) in levels_db.iter_mut().zip(raw.levels.iter()) {
            *level = (i16::from(rawv) - 30).clamp(-30, 30) as i8;
        }
        Ok(Self {
            sizes,
            subwoofer: raw.subwoofer != 0,
            units: DistanceUnits::from_byte(raw.units),
            distances: raw.distances,
            levels_db,
        })
    }
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// Software version record (code 0x73): "{major}.{minor}"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftwareVersion {
    pub version: String,
}

impl StatusResponse for SoftwareVersion {
    const CODE: u8 = status_code::SOFTWARE_VERSION;
    const MIN_LEN: usize = 3;

    fn from_payload(payload: &[u8]) -> Result<Self, ParseError> {
        Ok(Self {
            version: format!("{}.{}", payload[1], payload[2]),
        })
    }
}

/// Firmware version record (code 0x66): "{major}.{minor}.{patch}"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub version: String,
}

impl StatusResponse for FirmwareVersion {
    const CODE: u8 = status_code::FIRMWARE_VERSION;
    const MIN_LEN: usize = 4;

    fn from_payload(payload: &[u8]) -> Result<Self, ParseError> {
        Ok(Self {
            version: format!("{}.{}.{}", payload[1], payload[2], payload[3]),
        })
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// A decoded status payload
#[derive(Debug, Clone, Serialize)]
pub enum ParsedStatus {
    System(SystemStatus),
    InputMenu(InputMenuStatus),
    SpeakerMenu(SpeakerMenuStatus),
    SoftwareVersion(SoftwareVersion),
    FirmwareVersion(FirmwareVersion),
    /// Reserved record; the device pushes it during startup with no
    /// payload worth interpreting
    Extra,
    /// Response code this crate doesn't know - ignored, not an error
    Unknown { code: u8 },
}

/// Dispatch a response payload by its code byte.
///
/// Known codes with malformed payloads fail with [`ParseError`] (the
/// frame is dropped by the caller); unknown codes come back as
/// [`ParsedStatus::Unknown`] so newer firmware never breaks the decode
/// loop.
pub fn try_parse_status(payload: &[u8]) -> Result<ParsedStatus, ParseError> {
    let Some(&code) = payload.first() else {
        return Err(ParseError::TooShort { expected: 1, got: 0 });
    };
    match code {
        status_code::SYSTEM => SystemStatus::parse(payload).map(ParsedStatus::System),
        status_code::INPUT_MENU => InputMenuStatus::parse(payload).map(ParsedStatus::InputMenu),
        status_code::SPEAKER_MENU => {
            SpeakerMenuStatus::parse(payload).map(ParsedStatus::SpeakerMenu)
        }
        status_code::SOFTWARE_VERSION => {
            SoftwareVersion::parse(payload).map(ParsedStatus::SoftwareVersion)
        }
        status_code::FIRMWARE_VERSION => {
            FirmwareVersion::parse(payload).map(ParsedStatus::FirmwareVersion)
        }
        status_code::EXTRA => Ok(ParsedStatus::Extra),
        _ => Ok(ParsedStatus::Unknown { code }),
    }
}
