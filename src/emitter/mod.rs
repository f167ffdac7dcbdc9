//! The emitter: turns a caller's per-finger gestures (`begin_down`,
//! `end_down`, `move_finger`, `up`, `express`) into a MIDI byte stream,
//! juggling a fixed set of channels via [`crate::channel::ChannelAllocator`]
//! and legato/suppression via [`crate::polygroup::PolyGroupManager`].
//!
//! Grounded on `backend/pitchbend16.rs`'s `handle_msg` match arms and its
//! `MidiMsg::ChannelVoice { .. }.to_midi()` emission style, generalized
//! from "one message enum dispatched by an actor thread" to an explicit,
//! synchronous gesture call surface with no thread or channel of its own.

mod config;

pub use config::EmitterConfig;

use midi_msg::{Channel, ChannelVoiceMsg, ControlChange, MidiMsg};

use crate::{
    capabilities::{ByteSink, Capabilities, Diagnostics, DefaultAllocator, SlotAllocator},
    channel::ChannelAllocator,
    constants::{Semitones, BEND_CENTER, CHANNEL_MAX, IMPOSSIBLE_BEND, NOTE_MAX, POLY_MAX},
    finger::{FingerId, FingerSlot, Legato},
    pitch::PitchMapper,
    polygroup::PolyGroupManager,
};

fn velocity_to_midi(v: f64) -> u8 {
    (v * 127.0).round().clamp(1.0, 127.0) as u8
}

/// The emitter. Owns every finger/channel/polyphony-group slot, plus the
/// capabilities it was constructed with.
pub struct Emitter<S, D, A = DefaultAllocator>
where
    S: ByteSink,
    D: Diagnostics,
    A: SlotAllocator,
{
    config: EmitterConfig,
    fingers: Box<[FingerSlot]>,
    channels: ChannelAllocator,
    poly: PolyGroupManager,
    note_channel_down_count: [[u16; CHANNEL_MAX as usize]; NOTE_MAX],
    note_channel_down_raw_balance: [[i32; CHANNEL_MAX as usize]; NOTE_MAX],
    fingers_down_count: usize,
    booted: bool,
    sink: S,
    diagnostics: D,
    allocator: A,
}

impl<S, D, A> Emitter<S, D, A>
where
    S: ByteSink,
    D: Diagnostics,
    A: SlotAllocator,
{
    /// Builds an emitter for up to `finger_max` simultaneous fingers. Does
    /// not boot; call [`Emitter::boot`] before any gesture.
    pub fn new(finger_max: usize, config: EmitterConfig, capabilities: Capabilities<S, D, A>) -> Self {
        let Capabilities { sink, diagnostics, mut allocator } = capabilities;
        let fingers = allocator.alloc_finger_slots(finger_max);
        let config = config.clamped();
        Self {
            channels: ChannelAllocator::new(finger_max, config.channel_base, config.channel_span),
            poly: PolyGroupManager::new(),
            note_channel_down_count: [[0; CHANNEL_MAX as usize]; NOTE_MAX],
            note_channel_down_raw_balance: [[0; CHANNEL_MAX as usize]; NOTE_MAX],
            fingers_down_count: 0,
            booted: false,
            fingers,
            config,
            sink,
            diagnostics,
            allocator,
        }
    }

    /// Resets all bookkeeping (but not configuration or capabilities) and
    /// emits the bend-range RPN sequence on every channel in the
    /// configured window. Must be called once before any gesture, and is
    /// called again by [`Emitter::self_test`]'s recovery path.
    pub fn boot(&mut self) {
        for f in self.fingers.iter_mut() {
            *f = FingerSlot::empty();
        }
        self.config = self.config.clamped();
        self.channels.reset(self.config.channel_base, self.config.channel_span);
        self.poly.reset();
        self.note_channel_down_count = [[0; CHANNEL_MAX as usize]; NOTE_MAX];
        self.note_channel_down_raw_balance = [[0; CHANNEL_MAX as usize]; NOTE_MAX];
        self.fingers_down_count = 0;
        self.booted = true;
        self.emit_bend_range_on_every_channel();
    }

    /// Changes the pitch bend range and re-emits the RPN sequence on every
    /// channel in the configured window.
    pub fn set_bend_semis(&mut self, bend_semis: u8) {
        self.config.bend_semis = bend_semis.clamp(1, 24);
        self.emit_bend_range_on_every_channel();
    }

    /// Always emits, even when `suppress_bends` is set: that flag only
    /// gates the per-gesture pitch-bend/aftertouch CCs, not the boot-time
    /// RPN handshake a downstream synth needs to interpret those CCs'
    /// range correctly once bends resume.
    fn emit_bend_range_on_every_channel(&mut self) {
        let base = self.config.channel_base;
        let span = self.config.channel_span;
        let bend_semis = self.config.bend_semis;
        for i in 0..span {
            let channel = Channel::from_u8(base + i);
            self.emit_bend_range_rpn(channel, bend_semis);
        }
    }

    /// Marks `finger` as down and allocates it a channel.
    pub fn begin_down(&mut self, finger: FingerId) {
        if !self.precondition_booted() {
            return;
        }
        if !self.precondition_finger_in_range(finger) {
            return;
        }
        if self.fingers[finger].is_on {
            self.diagnostics.fail(&format!("begin_down: finger {finger} already down"));
            return;
        }

        self.fingers[finger].is_on = true;
        self.fingers_down_count += 1;
        let channel = self.channels.alloc(&mut self.fingers, finger, &mut self.diagnostics);
        self.fingers[finger].channel = channel;
    }

    /// Supplies the pitch, polyphony group and velocity for a finger that
    /// was already claimed by `begin_down`, emitting its note-on (and any
    /// legato note-off it displaces).
    pub fn end_down(&mut self, finger: FingerId, fnote: Semitones, poly_group: u8, velocity: f64, legato: Legato) {
        if !self.precondition_booted() || !self.precondition_finger_in_range(finger) {
            return;
        }
        if !self.fingers[finger].is_on {
            self.diagnostics.fail(&format!("end_down: finger {finger} not down"));
            return;
        }
        if poly_group >= POLY_MAX {
            self.diagnostics.fail(&format!("end_down: poly group {poly_group} out of range"));
            return;
        }
        if !(-0.5..127.5).contains(&fnote) {
            self.diagnostics.fail(&format!("end_down: fnote {fnote} out of range"));
            return;
        }

        let (note, bend) = PitchMapper::fresh(self.config.bend_semis, fnote);
        let channel = self.fingers[finger].channel;
        let channel_idx = channel as usize;
        let vel = velocity_to_midi(velocity);

        self.fingers[finger].poly_group = Some(poly_group);
        self.fingers[finger].note = note;
        self.fingers[finger].bend = bend;
        self.fingers[finger].velocity = vel;

        self.note_channel_down_count[note as usize][channel_idx] += 1;

        let finger_turning_off = self.poly.link(&mut self.fingers, finger);

        if self.note_channel_down_count[note as usize][channel_idx] > 1 {
            self.emit_note_off(note, channel);
            self.note_channel_down_raw_balance[note as usize][channel_idx] -= 1;
        }

        self.update_channel_bend(finger);

        if let Some(prior) = finger_turning_off {
            if legato == Legato::TieAndOff {
                let prior_channel = self.fingers[prior].channel;
                let prior_channel_idx = prior_channel as usize;
                let prior_note = self.fingers[prior].note;
                self.emit_note_tie(prior_channel, prior_note);
                self.emit_note_off(prior_note, prior_channel);
                self.note_channel_down_raw_balance[prior_note as usize][prior_channel_idx] -= 1;
            }
        }

        self.emit_note_on(note, channel, vel);
        self.note_channel_down_raw_balance[note as usize][channel_idx] += 1;
        if self.note_channel_down_raw_balance[note as usize][channel_idx] > 1 {
            self.diagnostics
                .log(&format!("note {note} channel {channel_idx} balance exceeds 1"));
        }
    }

    /// Updates a held finger's pitch and pressure. If the new pitch still
    /// fits the current note's bend window the note is kept and only its
    /// bend/aftertouch change; otherwise the finger is retriggered onto a
    /// freshly mapped note via an internal tie/up/begin_down/end_down.
    pub fn move_finger(&mut self, finger: FingerId, fnote: Semitones, velocity: f64, poly_group: u8) -> Semitones {
        if !self.precondition_booted() || !self.precondition_finger_in_range(finger) {
            return fnote;
        }
        if !self.fingers[finger].is_on {
            self.diagnostics.fail(&format!("move_finger: finger {finger} not down"));
            return fnote;
        }
        if poly_group < POLY_MAX {
            self.fingers[finger].visiting_poly_group = Some(poly_group);
        } else {
            self.diagnostics.fail(&format!("move_finger: poly group {poly_group} out of range"));
        }

        let old_note = self.fingers[finger].note;
        let (new_note, new_bend) = PitchMapper::incremental(self.config.bend_semis, old_note, fnote);
        let pressure = velocity_to_midi(velocity);

        if new_note == old_note {
            self.fingers[finger].bend = new_bend;
            self.update_channel_bend(finger);
            self.fingers[finger].velocity = pressure;
            self.update_channel_aftertouch(finger, pressure);
        } else {
            let existing_poly_group = self.fingers[finger].poly_group.unwrap_or(poly_group);
            let channel = self.fingers[finger].channel;
            self.emit_note_tie(channel, old_note);
            self.up(finger, Legato::Tie);
            self.begin_down(finger);
            self.end_down(finger, fnote, existing_poly_group, velocity, Legato::Tie);
        }

        fnote
    }

    /// Ends a finger's gesture, freeing its channel and, if it was the
    /// leader of its polyphony group, promoting and re-sounding the next
    /// member.
    pub fn up(&mut self, finger: FingerId, legato: Legato) {
        if !self.precondition_booted() || !self.precondition_finger_in_range(finger) {
            return;
        }
        if !self.fingers[finger].is_on {
            self.diagnostics.fail(&format!("up: finger {finger} not down"));
            return;
        }

        let channel = self.fingers[finger].channel;
        let channel_idx = channel as usize;
        let note = self.fingers[finger].note;
        let was_unsuppressed = !self.fingers[finger].is_suppressed;

        let promoted = self.poly.unlink(&mut self.fingers, finger);

        self.note_channel_down_count[note as usize][channel_idx] -= 1;

        if was_unsuppressed && self.note_channel_down_count[note as usize][channel_idx] == 0 {
            if legato.is_legato() && promoted.is_some() {
                self.emit_note_tie(channel, note);
            }
            self.emit_note_off(note, channel);
            self.note_channel_down_raw_balance[note as usize][channel_idx] -= 1;
        }

        if let Some(p) = promoted {
            let promoted_channel = self.fingers[p].channel;
            let promoted_idx = promoted_channel as usize;
            self.channels.slots[promoted_idx].last_bend = IMPOSSIBLE_BEND;
            let velocity = self.fingers[finger].velocity;
            self.fingers[p].velocity = velocity;
            let promoted_note = self.fingers[p].note;
            self.emit_note_on(promoted_note, promoted_channel, velocity);
            self.note_channel_down_raw_balance[promoted_note as usize][promoted_idx] += 1;
        }

        self.channels.free(&mut self.fingers, finger, &mut self.diagnostics);
        self.fingers[finger] = FingerSlot::empty();
        self.fingers_down_count -= 1;

        if self.fingers_down_count == 0 {
            self.self_test();
        }
    }

    /// Emits a single MIDI CC for a caller-defined continuous controller,
    /// not otherwise interpreted by the emitter.
    pub fn express(&mut self, finger: FingerId, key: u8, val: f64) {
        if !self.precondition_booted() || !self.precondition_finger_in_range(finger) {
            return;
        }
        if !self.fingers[finger].is_on {
            self.diagnostics.fail(&format!("express: finger {finger} not down"));
            return;
        }

        let channel = self.fingers[finger].channel;
        let control = key % 127;
        let raw = (val * 127.0).round() as i64;
        let value = raw.rem_euclid(127) as u8;
        self.emit_cc(channel, control, value);
    }

    /// Signals the sink that the current burst of bytes is complete.
    pub fn flush(&mut self) {
        self.sink.flush();
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    pub fn channel_occupancy(&self, channel: Channel) -> u32 {
        self.channels.slots[channel as usize].use_count
    }

    /// Returns the channel's last pitch bend as a ratio in `[-1, +1)`
    /// rather than the raw 14-bit value, per the configuration surface's
    /// bend query. A channel that has never received a bend reads as no
    /// deviation rather than exposing the `IMPOSSIBLE_BEND` sentinel.
    pub fn channel_bend(&self, channel: Channel) -> f64 {
        let raw = self.channels.slots[channel as usize].last_bend;
        let raw = if raw == IMPOSSIBLE_BEND { BEND_CENTER } else { raw };
        (raw as f64 - BEND_CENTER as f64) / BEND_CENTER as f64
    }

    pub fn channel_aftertouch(&self, channel: Channel) -> u8 {
        self.channels.slots[channel as usize].last_aftertouch
    }

    fn precondition_booted(&mut self) -> bool {
        if !self.booted {
            self.diagnostics.fail("gesture called before boot");
            return false;
        }
        true
    }

    fn precondition_finger_in_range(&mut self, finger: FingerId) -> bool {
        if finger >= self.fingers.len() {
            self.diagnostics.fail(&format!("finger {finger} out of range"));
            return false;
        }
        true
    }

    fn update_channel_bend(&mut self, finger: FingerId) {
        let channel = self.fingers[finger].channel;
        let idx = channel as usize;
        if self.channels.slots[idx].current_finger_in_channel == Some(finger) {
            let bend = self.fingers[finger].bend;
            if self.channels.slots[idx].last_bend != bend {
                self.emit_pitch_bend(channel, bend);
                self.channels.slots[idx].last_bend = bend;
            }
        }
    }

    fn update_channel_aftertouch(&mut self, finger: FingerId, pressure: u8) {
        let channel = self.fingers[finger].channel;
        let idx = channel as usize;
        if self.channels.slots[idx].current_finger_in_channel == Some(finger) {
            if self.channels.slots[idx].last_aftertouch != pressure {
                self.emit_channel_pressure(channel, pressure);
                self.channels.slots[idx].last_aftertouch = pressure;
            }
        }
    }

    /// Opportunistically verifies the universal invariants whenever the
    /// last finger has lifted; on failure, sweeps every (note, channel)
    /// with a note-off and reboots rather than leaving anything stuck on.
    fn self_test(&mut self) {
        let mut ok = true;

        for c in &self.channels.slots {
            if c.use_count != 0 || c.current_finger_in_channel.is_some() {
                ok = false;
            }
        }
        for g in &self.poly.slots {
            if g.current_finger_in_poly_group.is_some() {
                ok = false;
            }
        }
        for row in &self.note_channel_down_count {
            if row.iter().any(|&v| v != 0) {
                ok = false;
            }
        }
        for row in &self.note_channel_down_raw_balance {
            if row.iter().any(|&v| v != 0) {
                ok = false;
            }
        }
        for f in self.fingers.iter() {
            if f.is_on
                || f.is_suppressed
                || f.poly_group.is_some()
                || f.next_in_channel.is_some()
                || f.prev_in_channel.is_some()
                || f.next_in_poly_group.is_some()
                || f.prev_in_poly_group.is_some()
            {
                ok = false;
            }
        }

        if ok {
            self.diagnostics.passed();
            return;
        }

        self.diagnostics.fail("self-test failed with no fingers down");
        let base = self.config.channel_base;
        let span = self.config.channel_span;
        for note in 0..NOTE_MAX as u8 {
            for i in 0..span {
                self.emit_note_off(note, Channel::from_u8(base + i));
            }
        }
        self.sink.flush();
        self.boot();
    }

    fn send_midi_msg(&mut self, msg: MidiMsg) {
        for byte in msg.to_midi() {
            self.sink.put_byte(byte);
        }
    }

    fn emit_note_on(&mut self, note: u8, channel: Channel, velocity: u8) {
        self.send_midi_msg(MidiMsg::ChannelVoice { channel, msg: ChannelVoiceMsg::NoteOn { note, velocity } });
    }

    fn emit_note_off(&mut self, note: u8, channel: Channel) {
        self.send_midi_msg(MidiMsg::ChannelVoice {
            channel,
            msg: ChannelVoiceMsg::NoteOff { note, velocity: 0 },
        });
    }

    fn emit_pitch_bend(&mut self, channel: Channel, bend: u16) {
        self.send_midi_msg(MidiMsg::ChannelVoice { channel, msg: ChannelVoiceMsg::PitchBend { bend } });
    }

    fn emit_cc(&mut self, channel: Channel, control: u8, value: u8) {
        self.send_midi_msg(MidiMsg::ChannelVoice {
            channel,
            msg: ChannelVoiceMsg::ControlChange { control: ControlChange::CC { control, value } },
        });
    }

    fn emit_channel_pressure(&mut self, channel: Channel, pressure: u8) {
        self.send_midi_msg(MidiMsg::ChannelVoice { channel, msg: ChannelVoiceMsg::ChannelPressure { pressure } });
    }

    /// Emits a note-tie marker: a non-registered parameter number of
    /// 1223 (9·128 + 71, sent MSB then LSB via CC 99/98) with the tied
    /// note number as its data-entry value (CC 6), and no RPN-reset tail
    /// (synths interpret that tail inconsistently after a note-tie).
    /// Signals that the note-off/note-on pair immediately following it is
    /// a continuous-gesture retrigger rather than an independent
    /// rearticulation.
    fn emit_note_tie(&mut self, channel: Channel, note: u8) {
        self.emit_cc(channel, 99, 9);
        self.emit_cc(channel, 98, 71);
        self.emit_cc(channel, 6, note);
    }

    fn emit_bend_range_rpn(&mut self, channel: Channel, bend_semis: u8) {
        self.emit_cc(channel, 101, 0);
        self.emit_cc(channel, 100, 0);
        self.emit_cc(channel, 6, bend_semis);
        self.emit_cc(channel, 38, 0);
        self.emit_cc(channel, 101, 127);
        self.emit_cc(channel, 100, 127);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct VecSink {
        bytes: Vec<u8>,
    }

    impl ByteSink for VecSink {
        fn put_byte(&mut self, byte: u8) {
            self.bytes.push(byte);
        }
        fn flush(&mut self) {}
    }

    #[derive(Default)]
    struct RecordingDiagnostics {
        failures: Vec<String>,
        passes: u32,
    }

    impl Diagnostics for RecordingDiagnostics {
        fn fail(&mut self, message: &str) {
            self.failures.push(message.to_string());
        }
        fn log(&mut self, _message: &str) {}
        fn passed(&mut self) {
            self.passes += 1;
        }
    }

    fn new_emitter(finger_max: usize) -> Emitter<VecSink, RecordingDiagnostics> {
        let capabilities = Capabilities::new(VecSink::default(), RecordingDiagnostics::default());
        Emitter::new(finger_max, EmitterConfig::default(), capabilities)
    }

    #[test]
    fn boot_emits_bend_range_rpn_on_every_channel() {
        let mut e = new_emitter(4);
        e.boot();
        // 6 CC bytes * 2 bytes each = 12 bytes per channel, 16 channels.
        assert_eq!(e.sink.bytes.len(), 12 * 16);
        assert_eq!(&e.sink.bytes[0..2], &[0xB0, 101]);
    }

    #[test]
    fn begin_and_end_down_emits_note_on() {
        let mut e = new_emitter(4);
        e.boot();
        e.sink.bytes.clear();

        e.begin_down(0);
        e.end_down(0, 60.0, 0, 1.0, Legato::None);

        let tail = &e.sink.bytes[e.sink.bytes.len() - 3..];
        assert_eq!(tail, &[0x90, 60, 127]);
        assert!(e.diagnostics.failures.is_empty());
    }

    #[test]
    fn up_emits_note_off_and_frees_channel() {
        let mut e = new_emitter(4);
        e.boot();
        e.begin_down(0);
        e.end_down(0, 60.0, 0, 1.0, Legato::None);
        let channel = e.fingers[0].channel;

        e.up(0, Legato::None);

        assert_eq!(e.channel_occupancy(channel), 0);
        assert!(!e.fingers[0].is_on);
        assert_eq!(e.diagnostics.passes, 1);
    }

    #[test]
    fn poly_group_suppresses_older_finger_then_promotes_on_up() {
        let mut e = new_emitter(4);
        e.boot();

        e.begin_down(0);
        e.end_down(0, 60.0, 0, 1.0, Legato::None);
        e.begin_down(1);
        e.end_down(1, 62.0, 0, 1.0, Legato::None);

        assert!(e.fingers[0].is_suppressed);
        assert!(!e.fingers[1].is_suppressed);

        e.up(1, Legato::None);

        assert!(!e.fingers[0].is_suppressed);
        assert!(e.fingers[0].is_on);
    }

    #[test]
    fn move_past_bend_window_retriggers_onto_new_note() {
        let mut e = new_emitter(4);
        e.boot();
        e.begin_down(0);
        e.end_down(0, 60.0, 0, 1.0, Legato::None);

        e.move_finger(0, 63.0, 1.0, 0);

        assert_eq!(e.fingers[0].note, 63);
        assert!(e.diagnostics.failures.is_empty());
    }

    #[test]
    fn boot_emits_bend_range_rpn_even_with_suppress_bends() {
        let capabilities = Capabilities::new(VecSink::default(), RecordingDiagnostics::default());
        let config = EmitterConfig { suppress_bends: true, ..EmitterConfig::default() };
        let mut e = Emitter::new(4, config, capabilities);
        e.boot();
        assert_eq!(e.sink.bytes.len(), 12 * 16);
        assert_eq!(&e.sink.bytes[0..2], &[0xB0, 101]);
    }

    #[test]
    fn channel_bend_reads_as_no_deviation_before_any_bend() {
        let e = new_emitter(4);
        assert_eq!(e.channel_bend(Channel::Ch1), 0.0);
    }

    #[test]
    fn channel_bend_reports_ratio_in_expected_range() {
        let mut e = new_emitter(4);
        e.boot();
        e.begin_down(0);
        e.end_down(0, 60.0, 0, 1.0, Legato::None);
        e.move_finger(0, 60.25, 1.0, 0);

        let channel = e.fingers[0].channel;
        let bend = e.channel_bend(channel);
        assert!(bend > 0.0 && bend < 1.0, "expected bend ratio in (0, 1), got {bend}");
    }

    #[test]
    fn move_finger_fails_on_out_of_range_poly_group() {
        let mut e = new_emitter(4);
        e.boot();
        e.begin_down(0);
        e.end_down(0, 60.0, 0, 1.0, Legato::None);

        e.move_finger(0, 60.25, 1.0, POLY_MAX);

        assert!(e.diagnostics.failures.iter().any(|m| m.contains("poly group")));
    }

    #[test]
    fn self_test_passes_when_all_fingers_are_up() {
        let mut e = new_emitter(4);
        e.boot();
        e.begin_down(0);
        e.end_down(0, 60.0, 0, 1.0, Legato::None);
        e.up(0, Legato::None);

        assert_eq!(e.diagnostics.passes, 1);
        assert!(e.diagnostics.failures.is_empty());
    }
}
