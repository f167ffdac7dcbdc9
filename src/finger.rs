//! The finger slot: one entry per simultaneously trackable touch/gesture.

use midi_msg::Channel;

use crate::constants::BEND_CENTER;

/// Index into the emitter's finger table. Callers choose their own
/// finger IDs by picking an unused index below `finger_max`.
pub type FingerId = usize;

/// The three-way legato mode a caller may request on `end_down`/`up`/
/// `move_finger`'s internal retrigger.
///
/// Mirrors the source protocol's `legato` integer (`0`, `1`, `2`): `None` is
/// `0`, `Tie` is `1` (used internally by the retrigger protocol itself),
/// `TieAndOff` is `2` (a caller-requested legato transition that also
/// terminates the finger it displaces as leader of its polyphony group).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Legato {
    #[default]
    None,
    Tie,
    TieAndOff,
}

impl Legato {
    pub fn is_legato(self) -> bool {
        self != Legato::None
    }
}

/// Per-finger bookkeeping: what it's currently sounding as, and its
/// position in the two intrusive linked lists (per-channel, per-polyphony-
/// group) that the allocator and the polyphony manager thread through this
/// table.
#[derive(Clone, Copy, Debug)]
pub struct FingerSlot {
    /// Whether `begin_down` has been called for this finger without a
    /// matching `up`.
    pub is_on: bool,

    /// Set while a newer finger in the same polyphony group has taken over
    /// audibility; a suppressed finger's `up` never emits a note-off.
    pub is_suppressed: bool,

    /// The MIDI channel this finger was allocated.
    pub channel: Channel,

    /// The MIDI note number this finger is currently mapped to.
    pub note: u8,

    /// The 14-bit pitch bend value last computed for this finger.
    pub bend: u16,

    /// The finger's current velocity/pressure, on the 1..=127 MIDI scale.
    pub velocity: u8,

    /// The polyphony group this finger belongs to, set at `end_down` and
    /// cleared at `up`.
    pub poly_group: Option<u8>,

    /// Informational only: the polyphony group most recently passed to
    /// `move_finger`, which need not equal `poly_group`. Does not affect
    /// membership.
    pub visiting_poly_group: Option<u8>,

    /// Doubly linked per-channel list, ordered newest (leader) to oldest.
    pub next_in_channel: Option<FingerId>,
    pub prev_in_channel: Option<FingerId>,

    /// Doubly linked per-polyphony-group list, ordered newest (leader,
    /// unsuppressed) to oldest (suppressed).
    pub next_in_poly_group: Option<FingerId>,
    pub prev_in_poly_group: Option<FingerId>,
}

impl FingerSlot {
    pub const fn empty() -> Self {
        Self {
            is_on: false,
            is_suppressed: false,
            channel: Channel::Ch1,
            note: 0,
            bend: BEND_CENTER,
            velocity: 1,
            poly_group: None,
            visiting_poly_group: None,
            next_in_channel: None,
            prev_in_channel: None,
            next_in_poly_group: None,
            prev_in_poly_group: None,
        }
    }
}
