//! Least-loaded, round-robin MIDI channel allocation.
//!
//! Grounded on `backend/pitchbend16.rs`'s `usage: [u8; 16]` linear scan for
//! channel selection, extended with the intrusive per-channel finger list
//! (`hashmaptree.rs`'s `Option<K>` sibling-link idiom, here flattened to a
//! single doubly linked list per channel) needed to promote an older finger
//! to bend-authority when the current leader frees its channel.

use midi_msg::Channel;

use crate::{
    capabilities::Diagnostics,
    constants::{CHANNEL_MAX, IMPOSSIBLE_BEND},
    finger::{FingerId, FingerSlot},
};

#[derive(Clone, Copy, Debug)]
pub struct ChannelSlot {
    /// The bend last sent on this channel, or [`IMPOSSIBLE_BEND`] to force
    /// the next update through regardless of value.
    pub last_bend: u16,

    /// The channel pressure (aftertouch) value last sent on this channel.
    pub last_aftertouch: u8,

    /// The finger currently authoritative for this channel's bend and
    /// aftertouch (the most recently allocated finger still on it).
    pub current_finger_in_channel: Option<FingerId>,

    /// How many fingers are currently allocated to this channel.
    pub use_count: u32,
}

impl ChannelSlot {
    pub const fn empty() -> Self {
        Self {
            last_bend: IMPOSSIBLE_BEND,
            last_aftertouch: 0,
            current_finger_in_channel: None,
            use_count: 0,
        }
    }
}

/// Allocates MIDI channels to fingers by least-use, round-robin from the
/// channel following the last one handed out, within a caller-configured
/// `[channel_base, channel_base + channel_span)` window.
pub struct ChannelAllocator {
    pub slots: [ChannelSlot; CHANNEL_MAX as usize],
    channel_base: u8,
    channel_span: u8,
    last_allocated_channel: u8,
    finger_max: usize,
}

fn candidate_channel(base: u8, span: u8, last: u8, s: u8) -> u8 {
    let base = base as i64;
    let span = span as i64;
    let last = last as i64;
    let s = s as i64;
    let offset = (last + 1 + s - base).rem_euclid(span);
    (base + offset) as u8
}

impl ChannelAllocator {
    pub fn new(finger_max: usize, channel_base: u8, channel_span: u8) -> Self {
        Self {
            slots: [ChannelSlot::empty(); CHANNEL_MAX as usize],
            channel_base,
            channel_span,
            last_allocated_channel: channel_base,
            finger_max,
        }
    }

    /// Resets all channel bookkeeping and re-applies a (possibly new)
    /// base/span window. Used by boot and by reconfiguration.
    pub fn reset(&mut self, channel_base: u8, channel_span: u8) {
        self.slots = [ChannelSlot::empty(); CHANNEL_MAX as usize];
        self.channel_base = channel_base;
        self.channel_span = channel_span;
        self.last_allocated_channel = channel_base;
    }

    /// Allocates the least-loaded channel in the configured window,
    /// breaking ties by cycling past the previously allocated channel, and
    /// links `finger` onto that channel's list as its new leader.
    pub fn alloc(
        &mut self,
        fingers: &mut [FingerSlot],
        finger: FingerId,
        diagnostics: &mut impl Diagnostics,
    ) -> Channel {
        let base = self.channel_base;
        let span = self.channel_span.max(1);
        let last = self.last_allocated_channel;

        let mut chosen = None;
        for k in 0..=self.finger_max as u32 {
            for s in 0..span {
                let candidate = candidate_channel(base, span, last, s);
                if self.slots[candidate as usize].use_count == k {
                    chosen = Some(candidate);
                    break;
                }
            }
            if chosen.is_some() {
                break;
            }
        }

        let channel_num = match chosen {
            Some(c) => c,
            None => {
                diagnostics.fail("channel allocator found no candidate within its window");
                base
            }
        };

        self.last_allocated_channel = channel_num;
        self.slots[channel_num as usize].use_count += 1;
        self.link_into_channel(fingers, channel_num as usize, finger);

        Channel::from_u8(channel_num)
    }

    fn link_into_channel(&mut self, fingers: &mut [FingerSlot], channel_idx: usize, finger: FingerId) {
        let old_leader = self.slots[channel_idx].current_finger_in_channel;
        fingers[finger].prev_in_channel = old_leader;
        fingers[finger].next_in_channel = None;
        if let Some(old) = old_leader {
            fingers[old].next_in_channel = Some(finger);
        }
        self.slots[channel_idx].current_finger_in_channel = Some(finger);
    }

    /// Unlinks `finger` from its channel's list, decrements the channel's
    /// use count, and promotes the next-older finger to leader if `finger`
    /// was the leader, forcing that finger's bend/aftertouch to be resent.
    pub fn free(
        &mut self,
        fingers: &mut [FingerSlot],
        finger: FingerId,
        diagnostics: &mut impl Diagnostics,
    ) {
        let channel_idx = fingers[finger].channel as usize;

        if self.slots[channel_idx].use_count == 0 {
            diagnostics.fail(&format!("channel {channel_idx} use_count would go negative on free"));
        } else {
            self.slots[channel_idx].use_count -= 1;
        }

        let prev = fingers[finger].prev_in_channel;
        let next = fingers[finger].next_in_channel;
        if let Some(p) = prev {
            fingers[p].next_in_channel = next;
        }
        if let Some(n) = next {
            fingers[n].prev_in_channel = prev;
        }

        if self.slots[channel_idx].current_finger_in_channel == Some(finger) {
            self.slots[channel_idx].current_finger_in_channel = prev;
            if prev.is_some() {
                self.slots[channel_idx].last_bend = IMPOSSIBLE_BEND;
            }
        }

        fingers[finger].prev_in_channel = None;
        fingers[finger].next_in_channel = None;
    }
}
