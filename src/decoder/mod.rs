//! Decodes a raw MIDI byte stream back into discrete events.
//!
//! The teacher never decodes (it only emits), so this module has no direct
//! precedent in `carlhammann-adaptuner`; its status/data-byte dispatch
//! follows the shape of `other_examples`' MIDI message decoders, built as a
//! push (`put_byte`) state machine per finger of state rather than a single
//! parse call, and carried per [`Decoder`] instance rather than in process
//! globals (deliberately reentrant, unlike a single shared decoder state).
//!
//! Deliberately does not support running status: every message is expected
//! to begin with its own status byte.

use midi_msg::Channel;

use crate::{
    capabilities::{Diagnostics, NullDiagnostics},
    constants::{BEND_CENTER, CHANNEL_MAX},
};

/// What a caller receives for each semantically complete decoded message.
///
/// `NoteOn`, `NoteOff`, `PitchBend` and `ChannelPressure` all carry the
/// reconstructed fractional pitch and normalized volume for the channel
/// they arrived on, per the note/bend/volume reconstruction every such
/// message triggers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecodedEvent {
    NoteOn { channel: Channel, note: u8, velocity: u8, pitch: f64, volume: f64 },
    NoteOff { channel: Channel, note: u8, velocity: u8, pitch: f64, volume: f64 },
    PitchBend { channel: Channel, bend: u16, pitch: f64, volume: f64 },
    ChannelPressure { channel: Channel, pressure: u8, pitch: f64, volume: f64 },
    ControlChange { channel: Channel, control: u8, value: u8 },
    /// CC 11 (expression), singled out from other control changes the way
    /// pitch and volume are singled out from other note-on data.
    Expression { channel: Channel, value: u8 },
    /// A bend-range RPN (parameter 0/0) data-entry value arrived.
    BendRangeChanged { channel: Channel, semitones: u8 },
    /// The note-tie NRPN marker (parameter 1223 = 9·128 + 71) arrived,
    /// carrying the tied note number as its data-entry value.
    NoteTie { channel: Channel, note: u8 },
}

/// Receives decoded events as the decoder assembles them.
pub trait RawEngine {
    fn on_event(&mut self, event: DecodedEvent);
}

/// Per-channel RPN/NRPN parameter-select state plus the note/velocity/bend
/// triple that pitch reconstruction reads back. `last_bend` starts at
/// [`BEND_CENTER`] rather than 0 since an unbent channel must reconstruct
/// to exactly its last note, not a semitone below it.
#[derive(Clone, Copy)]
struct ChannelState {
    param_msb: u8,
    param_lsb: u8,
    is_nrpn: bool,
    last_note: u8,
    last_velocity: u8,
    last_bend: u16,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self { param_msb: 0, param_lsb: 0, is_nrpn: false, last_note: 0, last_velocity: 0, last_bend: BEND_CENTER }
    }
}

fn reconstruct_pitch(bend_semis: u8, note: u8, bend: u16) -> f64 {
    note as f64 + bend_semis as f64 * (bend as f64 - BEND_CENTER as f64) / BEND_CENTER as f64
}

fn reconstruct_volume(velocity: u8) -> f64 {
    velocity as f64 / 127.0
}

/// A per-instance MIDI byte-stream decoder. Each instance owns its own
/// running status and RPN/NRPN parameter-select state, so that decoding two
/// independent streams never requires resetting shared state between them.
pub struct Decoder<E: RawEngine, D: Diagnostics = NullDiagnostics> {
    status: u8,
    pending: Option<u8>,
    channel_state: [ChannelState; CHANNEL_MAX as usize],
    bend_semis: u8,
    engine: E,
    diagnostics: D,
}

impl<E: RawEngine> Decoder<E, NullDiagnostics> {
    /// Builds a decoder with no diagnostic reporting: unrecognized status
    /// bytes are dropped silently. Use [`Decoder::with_diagnostics`] to
    /// observe them.
    pub fn new(engine: E) -> Self {
        Self::with_diagnostics(engine, NullDiagnostics)
    }
}

impl<E: RawEngine, D: Diagnostics> Decoder<E, D> {
    /// Builds a decoder that reports unrecognized status bytes to
    /// `diagnostics`.
    pub fn with_diagnostics(engine: E, diagnostics: D) -> Self {
        Self {
            status: 0,
            pending: None,
            channel_state: [ChannelState::default(); CHANNEL_MAX as usize],
            bend_semis: 2,
            engine,
            diagnostics,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Feeds one raw MIDI byte into the decoder. Status bytes are latched;
    /// data bytes are accumulated until the current message's arity is
    /// satisfied, at which point a [`DecodedEvent`] is dispatched to the
    /// engine.
    pub fn put_byte(&mut self, byte: u8) {
        if byte & 0x80 != 0 {
            let message_type = byte & 0xF0;
            if byte < 0xF0 && !matches!(message_type, 0x80 | 0x90 | 0xB0 | 0xD0 | 0xE0) {
                self.diagnostics.log(&format!("unrecognized status byte 0x{byte:02X}"));
            }
            self.status = if byte < 0xF0 { byte } else { 0 };
            self.pending = None;
            return;
        }

        if self.status == 0 {
            return;
        }

        let message_type = self.status & 0xF0;
        let channel_idx = self.status & 0x0F;
        let channel = Channel::from_u8(channel_idx);

        match message_type {
            0x80 | 0x90 | 0xB0 | 0xE0 => match self.pending.take() {
                None => self.pending = Some(byte),
                Some(data1) => self.dispatch_two_byte(message_type, channel, channel_idx, data1, byte),
            },
            0xD0 => {
                let state = &mut self.channel_state[channel_idx as usize];
                let pitch = reconstruct_pitch(self.bend_semis, state.last_note, state.last_bend);
                let volume = reconstruct_volume(state.last_velocity);
                self.engine.on_event(DecodedEvent::ChannelPressure { channel, pressure: byte, pitch, volume });
            }
            _ => {}
        }
    }

    fn dispatch_two_byte(&mut self, message_type: u8, channel: Channel, channel_idx: u8, data1: u8, data2: u8) {
        let state = &mut self.channel_state[channel_idx as usize];
        match message_type {
            0x80 => {
                state.last_note = data1;
                state.last_velocity = data2;
                let pitch = reconstruct_pitch(self.bend_semis, state.last_note, state.last_bend);
                let volume = reconstruct_volume(state.last_velocity);
                self.engine.on_event(DecodedEvent::NoteOff { channel, note: data1, velocity: data2, pitch, volume });
            }
            0x90 => {
                state.last_note = data1;
                state.last_velocity = data2;
                let pitch = reconstruct_pitch(self.bend_semis, state.last_note, state.last_bend);
                let volume = reconstruct_volume(state.last_velocity);
                if data2 == 0 {
                    self.engine.on_event(DecodedEvent::NoteOff { channel, note: data1, velocity: 0, pitch, volume });
                } else {
                    self.engine.on_event(DecodedEvent::NoteOn {
                        channel,
                        note: data1,
                        velocity: data2,
                        pitch,
                        volume,
                    });
                }
            }
            0xE0 => {
                let bend = (data2 as u16) << 7 | data1 as u16;
                state.last_bend = bend;
                let pitch = reconstruct_pitch(self.bend_semis, state.last_note, bend);
                let volume = reconstruct_volume(state.last_velocity);
                self.engine.on_event(DecodedEvent::PitchBend { channel, bend, pitch, volume });
            }
            0xB0 => self.handle_control_change(channel, channel_idx, data1, data2),
            _ => {}
        }
    }

    fn handle_control_change(&mut self, channel: Channel, channel_idx: u8, control: u8, value: u8) {
        self.engine.on_event(DecodedEvent::ControlChange { channel, control, value });

        let state = &mut self.channel_state[channel_idx as usize];
        match control {
            101 => {
                state.param_msb = value;
                state.is_nrpn = false;
            }
            100 => {
                state.param_lsb = value;
                state.is_nrpn = false;
            }
            99 => {
                state.param_msb = value;
                state.is_nrpn = true;
            }
            98 => {
                state.param_lsb = value;
                state.is_nrpn = true;
            }
            6 => {
                if state.is_nrpn && state.param_msb == 9 && state.param_lsb == 71 {
                    self.engine.on_event(DecodedEvent::NoteTie { channel, note: value });
                } else if !state.is_nrpn && state.param_msb == 0 && state.param_lsb == 0 {
                    self.bend_semis = value;
                    self.engine.on_event(DecodedEvent::BendRangeChanged { channel, semitones: value });
                }
            }
            11 => self.engine.on_event(DecodedEvent::Expression { channel, value }),
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct RecordingEngine {
        events: Vec<DecodedEvent>,
    }

    impl RawEngine for RecordingEngine {
        fn on_event(&mut self, event: DecodedEvent) {
            self.events.push(event);
        }
    }

    #[derive(Default)]
    struct RecordingDiagnostics {
        logs: Vec<String>,
    }

    impl Diagnostics for RecordingDiagnostics {
        fn fail(&mut self, _message: &str) {}
        fn log(&mut self, message: &str) {
            self.logs.push(message.to_string());
        }
        fn passed(&mut self) {}
    }

    fn feed<D: Diagnostics>(decoder: &mut Decoder<RecordingEngine, D>, bytes: &[u8]) {
        for &b in bytes {
            decoder.put_byte(b);
        }
    }

    #[test]
    fn decodes_note_on_and_off_with_reconstructed_pitch_and_volume() {
        let mut d = Decoder::new(RecordingEngine::default());
        feed(&mut d, &[0x90, 60, 100, 0x80, 60, 0]);
        assert_eq!(
            d.engine().events,
            vec![
                DecodedEvent::NoteOn { channel: Channel::Ch1, note: 60, velocity: 100, pitch: 60.0, volume: 100.0 / 127.0 },
                DecodedEvent::NoteOff { channel: Channel::Ch1, note: 60, velocity: 0, pitch: 60.0, volume: 0.0 },
            ]
        );
    }

    #[test]
    fn note_on_with_zero_velocity_is_a_note_off() {
        let mut d = Decoder::new(RecordingEngine::default());
        feed(&mut d, &[0x90, 60, 0]);
        assert_eq!(
            d.engine().events,
            vec![DecodedEvent::NoteOff { channel: Channel::Ch1, note: 60, velocity: 0, pitch: 60.0, volume: 0.0 }]
        );
    }

    #[test]
    fn decodes_pitch_bend_as_14_bit_value() {
        let mut d = Decoder::new(RecordingEngine::default());
        feed(&mut d, &[0xE0, 0x00, 0x40]);
        assert_eq!(
            d.engine().events,
            vec![DecodedEvent::PitchBend { channel: Channel::Ch1, bend: 8192, pitch: 0.0, volume: 0.0 }]
        );
    }

    /// Scenario: note-on at 60 followed by a bend to 10240 with a 2-semitone
    /// range reconstructs to `60 + 2*(10240-8192)/8192`.
    #[test]
    fn reconstructs_pitch_after_bend_following_note_on() {
        let mut d = Decoder::new(RecordingEngine::default());
        feed(&mut d, &[0x90, 0x3C, 0x40, 0xE0, 0x00, 0x50]);
        assert_eq!(
            d.engine().events,
            vec![
                DecodedEvent::NoteOn { channel: Channel::Ch1, note: 60, velocity: 0x40, pitch: 60.0, volume: 0x40 as f64 / 127.0 },
                DecodedEvent::PitchBend {
                    channel: Channel::Ch1,
                    bend: 10240,
                    pitch: 60.0 + 2.0 * (10240.0 - 8192.0) / 8192.0,
                    volume: 0x40 as f64 / 127.0,
                },
            ]
        );
    }

    #[test]
    fn recognizes_bend_range_rpn_and_uses_it_for_reconstruction() {
        let mut d = Decoder::new(RecordingEngine::default());
        feed(&mut d, &[0xB0, 101, 0, 0xB0, 100, 0, 0xB0, 6, 4, 0xB0, 38, 0]);
        assert!(d
            .engine()
            .events
            .contains(&DecodedEvent::BendRangeChanged { channel: Channel::Ch1, semitones: 4 }));
        assert_eq!(d.bend_semis, 4);
    }

    #[test]
    fn recognizes_note_tie_marker() {
        let mut d = Decoder::new(RecordingEngine::default());
        feed(&mut d, &[0xB0, 99, 9, 0xB0, 98, 71, 0xB0, 6, 60]);
        assert!(d.engine().events.contains(&DecodedEvent::NoteTie { channel: Channel::Ch1, note: 60 }));
    }

    #[test]
    fn recognizes_expression_cc() {
        let mut d = Decoder::new(RecordingEngine::default());
        feed(&mut d, &[0xB0, 11, 100]);
        assert!(d.engine().events.contains(&DecodedEvent::Expression { channel: Channel::Ch1, value: 100 }));
    }

    #[test]
    fn running_status_is_not_supported() {
        let mut d = Decoder::new(RecordingEngine::default());
        feed(&mut d, &[0x90, 60, 100, 61, 100]);
        assert_eq!(
            d.engine().events,
            vec![DecodedEvent::NoteOn { channel: Channel::Ch1, note: 60, velocity: 100, pitch: 60.0, volume: 100.0 / 127.0 }]
        );
    }

    #[test]
    fn logs_unrecognized_status_byte() {
        let mut d = Decoder::with_diagnostics(RecordingEngine::default(), RecordingDiagnostics::default());
        d.put_byte(0xA0);
        assert!(d.diagnostics.logs.iter().any(|m| m.contains("0xA0")));
    }

    #[test]
    fn default_decoder_silently_drops_unrecognized_status_byte() {
        let mut d = Decoder::new(RecordingEngine::default());
        d.put_byte(0xA0);
        assert!(d.engine().events.is_empty());
    }
}
