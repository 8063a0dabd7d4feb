//! Protocol constants for the AV2 serial control link
//!
//! Command opcodes are single bytes; a few carry parameter bytes after
//! the opcode. Status requests reuse the code the device echoes back in
//! its reply, so `cmd::REQUEST_*` and `status_code::*` line up.

/// Command opcodes (first payload byte of an outbound frame)
pub mod cmd {
    // Power / display / mute - each direction is its own opcode
    pub const POWER_ON: u8 = 0x50;
    pub const POWER_OFF: u8 = 0x70;
    pub const DISPLAY_ON: u8 = 0x44;
    pub const DISPLAY_OFF: u8 = 0x64;
    pub const MUTE_ON: u8 = 0x4D;
    pub const MUTE_OFF: u8 = 0x6D;

    // Audio options
    pub const MIDNIGHT_ON: u8 = 0x4E;
    pub const MIDNIGHT_OFF: u8 = 0x6E;
    pub const BASS_MIX_ON: u8 = 0x42;
    pub const BASS_MIX_OFF: u8 = 0x62;
    pub const CINE_EQ_ON: u8 = 0x43;
    pub const CINE_EQ_OFF: u8 = 0x63;
    pub const VERBOSE_ON: u8 = 0x56;
    pub const VERBOSE_OFF: u8 = 0x76;

    // On-screen menus
    pub const INPUT_MENU_OPEN: u8 = 0x55;
    pub const INPUT_MENU_CLOSE: u8 = 0x75;
    pub const SPEAKER_MENU_OPEN: u8 = 0x51;
    pub const SPEAKER_MENU_CLOSE: u8 = 0x71;

    // Speaker distance units
    pub const UNITS_FEET: u8 = 0x46;
    pub const UNITS_METRES: u8 = 0x45;

    /// Followed by one level byte (0-99).
    ///
    /// The device interprets a level byte of 10 as a different opcode
    /// entirely, so 10 is never put on the wire - see
    /// [`volume::RESERVED_STEP`].
    pub const VOLUME_SET: u8 = 0x30;
    /// Followed by one input code byte (see `status::Input`).
    pub const INPUT_SELECT: u8 = 0x49;
    /// Followed by an input code byte and a label code byte.
    pub const INPUT_LABEL_SET: u8 = 0x4C;

    // Status requests - the device replies with the same code
    pub const REQUEST_SYSTEM_STATUS: u8 = 0x69;
    pub const REQUEST_INPUT_MENU_STATUS: u8 = 0x6A;
    pub const REQUEST_SPEAKER_MENU_STATUS: u8 = 0x6B;
    pub const REQUEST_SOFTWARE_VERSION: u8 = 0x73;
    pub const REQUEST_FIRMWARE_VERSION: u8 = 0x66;
    pub const REQUEST_EXTRA_STATUS: u8 = 0x78;

    /// Get human-readable name for a command opcode
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            POWER_ON => "POWER_ON",
            POWER_OFF => "POWER_OFF",
            DISPLAY_ON => "DISPLAY_ON",
            DISPLAY_OFF => "DISPLAY_OFF",
            MUTE_ON => "MUTE_ON",
            MUTE_OFF => "MUTE_OFF",
            MIDNIGHT_ON => "MIDNIGHT_ON",
            MIDNIGHT_OFF => "MIDNIGHT_OFF",
            BASS_MIX_ON => "BASS_MIX_ON",
            BASS_MIX_OFF => "BASS_MIX_OFF",
            CINE_EQ_ON => "CINE_EQ_ON",
            CINE_EQ_OFF => "CINE_EQ_OFF",
            VERBOSE_ON => "VERBOSE_ON",
            VERBOSE_OFF => "VERBOSE_OFF",
            INPUT_MENU_OPEN => "INPUT_MENU_OPEN",
            INPUT_MENU_CLOSE => "INPUT_MENU_CLOSE",
            SPEAKER_MENU_OPEN => "SPEAKER_MENU_OPEN",
            SPEAKER_MENU_CLOSE => "SPEAKER_MENU_CLOSE",
            UNITS_FEET => "UNITS_FEET",
            UNITS_METRES => "UNITS_METRES",
            VOLUME_SET => "VOLUME_SET",
            INPUT_SELECT => "INPUT_SELECT",
            INPUT_LABEL_SET => "INPUT_LABEL_SET",
            REQUEST_SYSTEM_STATUS => "REQUEST_SYSTEM_STATUS",
            REQUEST_INPUT_MENU_STATUS => "REQUEST_INPUT_MENU_STATUS",
            REQUEST_SPEAKER_MENU_STATUS => "REQUEST_SPEAKER_MENU_STATUS",
            REQUEST_SOFTWARE_VERSION => "REQUEST_SOFTWARE_VERSION",
            REQUEST_FIRMWARE_VERSION => "REQUEST_FIRMWARE_VERSION",
            REQUEST_EXTRA_STATUS => "REQUEST_EXTRA_STATUS",
            _ => "UNKNOWN",
        }
    }
}

/// Response codes (first payload byte of an inbound frame)
pub mod status_code {
    pub const SYSTEM: u8 = 0x69;
    pub const INPUT_MENU: u8 = 0x6A;
    pub const SPEAKER_MENU: u8 = 0x6B;
    pub const SOFTWARE_VERSION: u8 = 0x73;
    pub const FIRMWARE_VERSION: u8 = 0x66;
    pub const EXTRA: u8 = 0x78;

    /// Get human-readable name for a response code
    pub fn name(code: u8) -> &'static str {
        match code {
            SYSTEM => "SYSTEM_STATUS",
            INPUT_MENU => "INPUT_MENU_STATUS",
            SPEAKER_MENU => "SPEAKER_MENU_STATUS",
            SOFTWARE_VERSION => "SOFTWARE_VERSION",
            FIRMWARE_VERSION => "FIRMWARE_VERSION",
            EXTRA => "EXTRA_STATUS",
            _ => "UNKNOWN",
        }
    }
}

/// Link timing constants
///
/// The device tolerates very little on this port: commands that arrive
/// too close together, or that start without the attention byte after
/// the link has been idle, are silently discarded by its receiver.
pub mod timing {
    /// Queue pump tick period (ms)
    pub const TICK_MS: u64 = 25;
    /// Minimum gap between one command fully draining and the next
    /// starting (ms)
    pub const MIN_COMMAND_GAP_MS: u64 = 105;
    /// Idle threshold beyond which the device needs extra time to wake
    /// before the real frame registers (ms)
    pub const IDLE_THRESHOLD_MS: u64 = 200;
    /// Extra pause after the attention byte when the link was idle (ms)
    pub const WAKE_PAUSE_MS: u64 = 25;
    /// Debounce for the derived audio-status broadcast (ms)
    pub const VOLUME_SYNC_DEBOUNCE_MS: u64 = 1000;
}

/// Volume range constants
pub mod volume {
    /// Maximum volume level
    pub const MAX: u8 = 99;
    /// Level byte the device reassigns to an unrelated function.
    /// Increment/decrement skip it; explicit sets reject it.
    pub const RESERVED_STEP: u8 = 10;
}
