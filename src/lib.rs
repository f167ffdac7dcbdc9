//! Deterministic, per-note MIDI channel juggling for polyphonic pitch
//! bend: an [`emitter::Emitter`] that turns per-finger gestures into a
//! MIDI byte stream across a fixed set of channels, and a [`decoder`] that
//! turns a MIDI byte stream back into events.
pub mod capabilities;
pub mod channel;
pub mod constants;
pub mod decoder;
pub mod emitter;
pub mod finger;
pub mod pitch;
pub mod polygroup;

#[cfg(test)]
mod integration_test {
    use std::{cell::RefCell, rc::Rc};

    use crate::{
        capabilities::{ByteSink, Capabilities, Diagnostics},
        decoder::{DecodedEvent, Decoder, RawEngine},
        emitter::{Emitter, EmitterConfig},
        finger::Legato,
    };

    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl ByteSink for SharedSink {
        fn put_byte(&mut self, byte: u8) {
            self.0.borrow_mut().push(byte);
        }
        fn flush(&mut self) {}
    }

    struct PanicOnFail;

    impl Diagnostics for PanicOnFail {
        fn fail(&mut self, message: &str) {
            panic!("unexpected emitter failure: {message}");
        }
        fn log(&mut self, _message: &str) {}
        fn passed(&mut self) {}
    }

    #[derive(Default)]
    struct PitchTrackingEngine {
        note_on_seen: bool,
        reconstructed_pitch: Option<f64>,
    }

    impl RawEngine for PitchTrackingEngine {
        fn on_event(&mut self, event: DecodedEvent) {
            match event {
                DecodedEvent::NoteOn { .. } => self.note_on_seen = true,
                DecodedEvent::PitchBend { pitch, .. } => self.reconstructed_pitch = Some(pitch),
                _ => {}
            }
        }
    }

    /// Feeds the bytes the emitter produces for a single-finger gesture
    /// straight into the decoder and checks the reconstructed pitch lands
    /// within a fraction of a bend unit of the value the gesture requested.
    #[test]
    fn decoded_pitch_matches_requested_fnote_within_tolerance() {
        let bend_semis = 2u8;
        let config = EmitterConfig { channel_base: 0, channel_span: 1, bend_semis, suppress_bends: true };
        let sink = SharedSink::default();
        let capabilities = Capabilities::new(sink.clone(), PanicOnFail);
        let mut emitter = Emitter::new(1, config, capabilities);
        emitter.boot();

        let requested_fnote = 60.3;
        emitter.begin_down(0);
        emitter.end_down(0, requested_fnote, 0, 1.0, Legato::None);
        emitter.flush();

        let mut decoder = Decoder::new(PitchTrackingEngine::default());
        for &byte in sink.0.borrow().iter() {
            decoder.put_byte(byte);
        }

        assert!(decoder.engine().note_on_seen, "decoder should have seen a note-on");
        let reconstructed = decoder
            .engine()
            .reconstructed_pitch
            .expect("decoder should have reconstructed a pitch after the bend");

        assert!(
            (reconstructed - requested_fnote).abs() <= bend_semis as f64 / 8192.0,
            "reconstructed pitch {reconstructed} too far from requested {requested_fnote}"
        );
    }
}
