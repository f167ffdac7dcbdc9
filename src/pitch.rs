//! Mapping a fractional pitch (in semitones) to a MIDI note number plus a
//! 14-bit pitch bend, and back.
//!
//! Grounded on `backend/pitchbend16.rs`'s free functions `bend_from_semitones`
//! / `semitones_from_bend`, generalized with an explicit "incremental from an
//! existing note" mode the teacher's backend inlines into its `Retune`
//! handling rather than factoring out.

use crate::constants::{Semitones, BEND_CENTER, BEND_MAX};

/// Rounds a fractional note to the nearest integer note, rounding exact
/// halves up rather than away from zero (`-0.5` rounds to `0`, matching the
/// boundary behavior of the `[0, 128)` note range).
fn round_note(fnote: Semitones) -> u8 {
    (fnote + 0.5).floor() as u8
}

fn bend_for_offset(bend_semis: u8, offset: Semitones) -> u16 {
    let bend = BEND_CENTER as Semitones + offset * BEND_CENTER as Semitones / bend_semis as Semitones;
    bend.round().clamp(0.0, BEND_MAX as Semitones) as u16
}

/// Stateless note/bend mapping. Carries no data of its own; every method
/// takes the current bend range (`bend_semis`) as a parameter since it is a
/// per-emitter, runtime-configurable quantity.
pub struct PitchMapper;

impl PitchMapper {
    /// Maps a fractional pitch to the nearest MIDI note and the bend that
    /// reaches `fnote` from it, with no prior note to anchor to.
    pub fn fresh(bend_semis: u8, fnote: Semitones) -> (u8, u16) {
        let note = round_note(fnote);
        let offset = fnote - note as Semitones;
        (note, bend_for_offset(bend_semis, offset))
    }

    /// Maps a fractional pitch relative to an already-sounding note. If the
    /// resulting bend still fits the channel's `[0, 2·BEND_CENTER)` bend
    /// range, the existing note is kept and only the bend changes;
    /// otherwise a fresh mapping is computed and the caller is expected to
    /// detect the note change and retrigger.
    pub fn incremental(bend_semis: u8, existing_note: u8, fnote: Semitones) -> (u8, u16) {
        let offset = fnote - existing_note as Semitones;
        let bend = BEND_CENTER as Semitones + offset * BEND_CENTER as Semitones / bend_semis as Semitones;
        if bend >= 0.0 && bend < 2.0 * BEND_CENTER as Semitones {
            (existing_note, bend.round() as u16)
        } else {
            Self::fresh(bend_semis, fnote)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fresh_maps_integer_pitch_to_center_bend() {
        let (note, bend) = PitchMapper::fresh(2, 60.0);
        assert_eq!(note, 60);
        assert_eq!(bend, BEND_CENTER);
    }

    #[test]
    fn fresh_rounds_negative_half_up() {
        let (note, _) = PitchMapper::fresh(2, -0.5);
        assert_eq!(note, 0);
    }

    #[test]
    fn fresh_rounds_positive_half_up() {
        let (note, _) = PitchMapper::fresh(2, 60.5);
        assert_eq!(note, 61);
    }

    #[test]
    fn incremental_keeps_note_within_bend_window() {
        let (note, bend) = PitchMapper::incremental(2, 60, 60.25);
        assert_eq!(note, 60);
        assert!(bend > BEND_CENTER);
    }

    #[test]
    fn incremental_retriggers_past_bend_window() {
        let (note, _bend) = PitchMapper::incremental(2, 60, 63.0);
        assert_ne!(note, 60);
        assert_eq!(note, 63);
    }

    #[test]
    fn round_trip_is_approximately_stable() {
        let bend_semis = 2;
        let (note, bend) = PitchMapper::fresh(bend_semis, 64.3);
        let recovered = note as Semitones
            + (bend as Semitones - BEND_CENTER as Semitones) * bend_semis as Semitones
                / BEND_CENTER as Semitones;
        assert_relative_eq!(recovered, 64.3, epsilon = 1e-3);
    }
}
