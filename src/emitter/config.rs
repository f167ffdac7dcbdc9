//! Emitter configuration: the caller-tunable knobs, clamped to sane ranges
//! on boot the way `config/mod.rs` validates a loaded tuning configuration
//! before it is handed to a backend.

use serde::{Deserialize, Serialize};

use crate::constants::CHANNEL_MAX;

/// Caller-tunable emitter settings.
///
/// `channel_base`/`channel_span` carve out the window of MIDI channels the
/// allocator is allowed to hand out (so a host application can reserve the
/// remaining channels for other instruments). `bend_semis` is the pitch
/// bend range, in semitones, that the channel's RPN bend-range message
/// declares and that [`crate::pitch::PitchMapper`] assumes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmitterConfig {
    pub channel_base: u8,
    pub channel_span: u8,
    pub bend_semis: u8,
    pub suppress_bends: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            channel_base: 0,
            channel_span: CHANNEL_MAX,
            bend_semis: 2,
            suppress_bends: false,
        }
    }
}

impl EmitterConfig {
    /// Clamps every field to a range the rest of the emitter can safely
    /// assume, in place of failing boot outright on a bad configuration.
    pub fn clamped(mut self) -> Self {
        self.channel_span = self.channel_span.clamp(1, CHANNEL_MAX);
        if self.channel_base >= CHANNEL_MAX {
            self.channel_base = CHANNEL_MAX - 1;
        }
        if self.channel_base + self.channel_span > CHANNEL_MAX {
            self.channel_span = CHANNEL_MAX - self.channel_base;
        }
        self.bend_semis = self.bend_semis.clamp(1, 24);
        self
    }
}
