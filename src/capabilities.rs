//! Capability injection: the only way the emitter and decoder ever touch
//! the outside world.
//!
//! Everything in this module is a trait plus a small struct that bundles
//! trait objects/impls together, mirroring how the teacher's `BackendState`
//! never opens a MIDI port itself but is handed `to_ui`/`midi_out` senders
//! at call time. Here the equivalent senders are bundled once, at
//! construction, since the emitter owns no thread of its own.

use crate::finger::FingerSlot;

/// Where emitted MIDI bytes go.
pub trait ByteSink {
    /// Accepts one outgoing MIDI byte.
    fn put_byte(&mut self, byte: u8);

    /// Signals that a logically complete burst of bytes has been written
    /// (e.g. after a gesture has finished emitting its messages).
    fn flush(&mut self);
}

/// Diagnostic reporting: fatal assertion failures, informational logging,
/// and a "self-test passed" signal.
pub trait Diagnostics {
    /// Reports a violated invariant. Does not unwind; callers continue
    /// operating in whatever the gesture's recovery path dictates.
    fn fail(&mut self, message: &str);

    /// Reports a non-fatal, informational condition (e.g. a balance
    /// counter that exceeded its expected range).
    fn log(&mut self, message: &str);

    /// Reports that the opportunistic self-test found no inconsistency.
    fn passed(&mut self);
}

/// Produces the backing storage for the finger-slot table.
///
/// Everything else ([`crate::channel::ChannelAllocator`],
/// [`crate::polygroup::PolyGroupManager`], the note/channel matrices) is
/// sized by spec-fixed constants and needs no injected allocator; only the
/// finger table's length is caller-chosen (`finger_max`).
pub trait SlotAllocator {
    fn alloc_finger_slots(&mut self, finger_max: usize) -> Box<[FingerSlot]>;
}

/// The allocator used when a caller has no reason to supply their own:
/// a plain heap `Vec` turned into a boxed slice.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultAllocator;

impl SlotAllocator for DefaultAllocator {
    fn alloc_finger_slots(&mut self, finger_max: usize) -> Box<[FingerSlot]> {
        vec![FingerSlot::empty(); finger_max].into_boxed_slice()
    }
}

/// A [`Diagnostics`] that discards everything: the default for callers
/// (e.g. [`crate::decoder::Decoder`]) who have no diagnostic sink to give.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn fail(&mut self, _message: &str) {}
    fn log(&mut self, _message: &str) {}
    fn passed(&mut self) {}
}

/// Bundles the three capabilities an [`crate::emitter::Emitter`] needs at
/// construction time.
pub struct Capabilities<S, D, A = DefaultAllocator>
where
    S: ByteSink,
    D: Diagnostics,
    A: SlotAllocator,
{
    pub sink: S,
    pub diagnostics: D,
    pub allocator: A,
}

impl<S, D> Capabilities<S, D, DefaultAllocator>
where
    S: ByteSink,
    D: Diagnostics,
{
    /// Bundles a sink and a diagnostics channel with the default allocator.
    pub fn new(sink: S, diagnostics: D) -> Self {
        Self { sink, diagnostics, allocator: DefaultAllocator }
    }
}

impl<S, D, A> Capabilities<S, D, A>
where
    S: ByteSink,
    D: Diagnostics,
    A: SlotAllocator,
{
    /// Bundles a sink, a diagnostics channel, and a caller-supplied
    /// allocator.
    pub fn with_allocator(sink: S, diagnostics: D, allocator: A) -> Self {
        Self { sink, diagnostics, allocator }
    }
}
