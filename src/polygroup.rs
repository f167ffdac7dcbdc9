//! Polyphony-group legato/suppression bookkeeping.
//!
//! Within a polyphony group, only the most recently linked finger is
//! audible (unsuppressed); older members are kept suppressed so that a
//! caller layering several fingers onto the same musical voice hears only
//! the latest one, while still being able to fall back to an older finger
//! when the newest one lifts. Grounded on `hashmaptree.rs`'s leader/sibling
//! promotion pattern (`Option<K>` links), specialized here to a flat
//! stack-of-fingers list rather than a tree.

use crate::{
    constants::POLY_MAX,
    finger::{FingerId, FingerSlot},
};

#[derive(Clone, Copy, Debug)]
pub struct PolyGroupSlot {
    /// The most recently linked, currently unsuppressed finger in this
    /// group, if any finger is currently a member.
    pub current_finger_in_poly_group: Option<FingerId>,
}

impl PolyGroupSlot {
    pub const fn empty() -> Self {
        Self { current_finger_in_poly_group: None }
    }
}

pub struct PolyGroupManager {
    pub slots: [PolyGroupSlot; POLY_MAX as usize],
}

impl PolyGroupManager {
    pub fn new() -> Self {
        Self { slots: [PolyGroupSlot::empty(); POLY_MAX as usize] }
    }

    pub fn reset(&mut self) {
        self.slots = [PolyGroupSlot::empty(); POLY_MAX as usize];
    }

    /// Makes `finger` the new leader of its `poly_group`, suppressing the
    /// previous leader (if any) and returning it as the finger that just
    /// turned off audibly.
    pub fn link(&mut self, fingers: &mut [FingerSlot], finger: FingerId) -> Option<FingerId> {
        let group = fingers[finger]
            .poly_group
            .expect("link: finger must have a poly group assigned") as usize;

        let old_leader = self.slots[group].current_finger_in_poly_group;
        fingers[finger].prev_in_poly_group = old_leader;
        fingers[finger].next_in_poly_group = None;
        if let Some(old) = old_leader {
            fingers[old].next_in_poly_group = Some(finger);
            fingers[old].is_suppressed = true;
        }
        fingers[finger].is_suppressed = false;
        self.slots[group].current_finger_in_poly_group = Some(finger);

        old_leader
    }

    /// Removes `finger` from its polyphony group's list. If it was the
    /// leader, promotes the next-older member to leader (clearing its
    /// suppressed flag) and returns it.
    pub fn unlink(&mut self, fingers: &mut [FingerSlot], finger: FingerId) -> Option<FingerId> {
        let group = fingers[finger]
            .poly_group
            .expect("unlink: finger must have a poly group assigned") as usize;

        let prev = fingers[finger].prev_in_poly_group;
        let next = fingers[finger].next_in_poly_group;
        if let Some(p) = prev {
            fingers[p].next_in_poly_group = next;
        }
        if let Some(n) = next {
            fingers[n].prev_in_poly_group = prev;
        }

        let mut promoted = None;
        if self.slots[group].current_finger_in_poly_group == Some(finger) {
            self.slots[group].current_finger_in_poly_group = prev;
            if let Some(p) = prev {
                fingers[p].is_suppressed = false;
                promoted = Some(p);
            }
        }

        fingers[finger].prev_in_poly_group = None;
        fingers[finger].next_in_poly_group = None;
        promoted
    }
}

impl Default for PolyGroupManager {
    fn default() -> Self {
        Self::new()
    }
}
