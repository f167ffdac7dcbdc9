//! Fixed sizes and constants shared by the emitter and the decoder.
//!
//! `CHANNEL_MAX`/`POLY_MAX`/`NOTE_MAX` are spec-fixed (MIDI itself has 16
//! channels), unlike the donor's `util::dimension` markers which describe
//! caller-chosen vector lengths; these are plain `pub const`s rather than
//! `Dimension` marker types for that reason.

/// The type of pitch, measured in equally tempered semitones with a
/// fractional part.
pub type Semitones = f64;

/// Number of MIDI channels.
pub const CHANNEL_MAX: u8 = 16;

/// Number of polyphony groups a caller may use.
pub const POLY_MAX: u8 = 16;

/// Number of distinct MIDI note numbers.
pub const NOTE_MAX: usize = 128;

/// Center value of a 14-bit MIDI pitch bend.
pub const BEND_CENTER: u16 = 8192;

/// Largest representable 14-bit MIDI pitch bend value.
pub const BEND_MAX: u16 = 16383;

/// A `last_bend` value that can never be produced by [`crate::pitch`], used
/// to force a channel's or finger's next bend update to actually be sent
/// rather than suppressed as a no-op repeat.
pub const IMPOSSIBLE_BEND: u16 = u16::MAX;
