//! Fixed-layout synthetic input event records.
//!
//! The system input service is shared among all input devices, and events
//! posted to it use a fixed legacy layout: an event kind, a location, a set
//! of device-independent modifier flags, and a kind-specific data payload.
//! Auxiliary control buttons (volume, brightness, media keys) travel as a
//! "system defined" event whose payload packs the button code, direction,
//! and repeat flag into a single 32-bit word.
//!
//! The numeric values here match the service's wire constants and must not
//! be renumbered.

/// Version tag carried by every event data payload.
pub const DATA_VERSION: u32 = 2;

/// Post option: apply the event's modifier flags globally instead of to a
/// single device.
pub const SET_GLOBAL_FLAGS: u32 = 0x0000_0001;

/// Payload subtype marking an auxiliary control button inside a
/// [`EventKind::SystemDefined`] event.
pub const AUX_CONTROL_BUTTONS_SUBTYPE: u16 = 8;

/// Event kind tag understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventKind {
    KeyDown = 10,
    KeyUp = 11,
    FlagsChanged = 12,
    SystemDefined = 14,
}

/// Which request-API variant a key post targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKeyKind {
    /// A regular keyboard key.
    Key,
    /// An auxiliary control button (volume, brightness, media keys).
    AuxControlButton,
}

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

impl KeyDirection {
    /// The event kind corresponding to this direction.
    pub fn event_kind(self) -> EventKind {
        match self {
            KeyDirection::Down => EventKind::KeyDown,
            KeyDirection::Up => EventKind::KeyUp,
        }
    }
}

/// Selector for a boolean modifier-lock flag maintained by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LockSelector {
    CapsLock = 1,
    NumLock = 2,
}

/// Device-independent modifier flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierFlags(pub u32);

impl ModifierFlags {
    pub const NONE: ModifierFlags = ModifierFlags(0);
    pub const CAPS_LOCK: ModifierFlags = ModifierFlags(0x0001_0000);
    pub const SHIFT: ModifierFlags = ModifierFlags(0x0002_0000);
    pub const CONTROL: ModifierFlags = ModifierFlags(0x0004_0000);
    pub const OPTION: ModifierFlags = ModifierFlags(0x0008_0000);
    pub const COMMAND: ModifierFlags = ModifierFlags(0x0010_0000);
    pub const NUMERIC_PAD: ModifierFlags = ModifierFlags(0x0020_0000);
    pub const HELP: ModifierFlags = ModifierFlags(0x0040_0000);
    pub const SECONDARY_FN: ModifierFlags = ModifierFlags(0x0080_0000);

    /// Returns `true` if every flag in `other` is set in `self`.
    pub fn contains(self, other: ModifierFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ModifierFlags {
    type Output = ModifierFlags;

    fn bitor(self, rhs: ModifierFlags) -> ModifierFlags {
        ModifierFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ModifierFlags {
    fn bitor_assign(&mut self, rhs: ModifierFlags) {
        self.0 |= rhs.0;
    }
}

/// Screen location carried by the event. Synthetic posts use the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

/// Key payload of a [`EventKind::KeyDown`] / [`EventKind::KeyUp`] event.
///
/// All character fields stay zero for synthetic posts; the service resolves
/// characters from the key code itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyData {
    pub key_code: u8,
    pub char_code: u8,
    pub char_set: u16,
    pub orig_char_code: u8,
    pub orig_char_set: u16,
    pub keyboard_type: u16,
    pub repeat: bool,
}

/// Kind-specific event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventData {
    /// No payload (flags-changed events).
    None,
    /// Regular key payload.
    Key(KeyData),
    /// System-defined compound payload.
    Compound { subtype: u16, word: u32 },
}

/// A complete fixed-layout event record as handed to the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub location: Point,
    pub flags: ModifierFlags,
    /// Post options; see [`SET_GLOBAL_FLAGS`].
    pub options: u32,
    pub data_version: u32,
    pub data: EventData,
}

/// Builds a key-down/up event record for a regular keyboard key.
pub fn key_event(
    key_code: u8,
    direction: KeyDirection,
    flags: ModifierFlags,
    repeat: bool,
) -> EventRecord {
    EventRecord {
        kind: direction.event_kind(),
        location: Point::default(),
        flags,
        options: 0,
        data_version: DATA_VERSION,
        data: EventData::Key(KeyData {
            key_code,
            repeat,
            ..KeyData::default()
        }),
    }
}

/// Builds an auxiliary-control-button event record.
///
/// The payload word packs `(key_code << 16) | (direction kind << 8) | repeat`.
pub fn aux_control_button_event(
    key_code: u8,
    direction: KeyDirection,
    flags: ModifierFlags,
    repeat: bool,
) -> EventRecord {
    let word = (u32::from(key_code) << 16)
        | ((direction.event_kind() as u32) << 8)
        | u32::from(repeat);

    EventRecord {
        kind: EventKind::SystemDefined,
        location: Point::default(),
        flags,
        options: 0,
        data_version: DATA_VERSION,
        data: EventData::Compound {
            subtype: AUX_CONTROL_BUTTONS_SUBTYPE,
            word,
        },
    }
}

/// Builds a flags-changed event that applies `flags` globally.
pub fn modifier_flags_event(flags: ModifierFlags) -> EventRecord {
    EventRecord {
        kind: EventKind::FlagsChanged,
        location: Point::default(),
        flags,
        options: SET_GLOBAL_FLAGS,
        data_version: DATA_VERSION,
        data: EventData::None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
