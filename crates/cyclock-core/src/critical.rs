//! Critical sections against the overflow interrupt.
//!
//! The counter state is written both from the alarm handler and from
//! foreground readers. Every read-compare-update runs while the interrupt
//! is masked, and the mask is restored when the [`CriticalSection`] guard
//! drops, on every exit path.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

/// Interrupt state saved by [`InterruptMask::mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskState {
    /// Whether the interrupt was already masked before this call.
    pub was_masked: bool,
}

/// Ability to hold off the interrupt that services the counter.
///
/// Masking nests: `mask` returns the previous state and `restore` puts it
/// back, so an inner critical section does not unmask an outer one.
pub trait InterruptMask: Send + Sync + 'static {
    /// Mask the interrupt and return the prior state.
    fn mask(&self) -> MaskState;

    /// Restore the state returned by the matching [`InterruptMask::mask`].
    fn restore(&self, previous: MaskState);
}

/// RAII guard for a masked region.
///
/// Not `Send`: the mask has to be restored by the context that took it.
#[must_use = "the interrupt is unmasked as soon as the guard is dropped"]
pub struct CriticalSection<'a, M: InterruptMask + ?Sized> {
    mask: &'a M,
    previous: MaskState,
    _not_send: PhantomData<*const ()>,
}

impl<'a, M: InterruptMask + ?Sized> CriticalSection<'a, M> {
    /// Mask the interrupt until the returned guard is dropped.
    pub fn enter(mask: &'a M) -> Self {
        let previous = mask.mask();
        Self {
            mask,
            previous,
            _not_send: PhantomData,
        }
    }

    /// Whether this guard is nested inside another critical section.
    pub fn is_nested(&self) -> bool {
        self.previous.was_masked
    }
}

impl<M: InterruptMask + ?Sized> Drop for CriticalSection<'_, M> {
    fn drop(&mut self) {
        self.mask.restore(self.previous);
    }
}

impl<M: InterruptMask + ?Sized> std::fmt::Debug for CriticalSection<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriticalSection")
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}

/// Run `f` with the interrupt masked.
pub fn masked<M, R>(mask: &M, f: impl FnOnce(&CriticalSection<'_, M>) -> R) -> R
where
    M: InterruptMask + ?Sized,
{
    let cs = CriticalSection::enter(mask);
    f(&cs)
}

/// Interrupt mask backed by the `critical-section` implementation linked
/// into the binary.
///
/// On target that is whatever the HAL registers (PRIMASK save/restore on
/// Cortex-M). Hosted builds with the `hosted` feature get the crate's `std`
/// implementation, a process-wide reentrant lock.
///
/// Nesting is counted here: only the outermost `mask` keeps its restore
/// state, so guards may be dropped in any order.
#[derive(Default)]
pub struct GlobalInterruptMask {
    depth: AtomicU32,
    outer: Mutex<Option<critical_section::RestoreState>>,
}

impl GlobalInterruptMask {
    /// Create an unmasked mask.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Acquire)
    }
}

#[allow(unsafe_code)]
impl InterruptMask for GlobalInterruptMask {
    fn mask(&self) -> MaskState {
        // SAFETY: every acquire is paired with exactly one release. Nested
        // acquires are released immediately, which is the reverse order and
        // leaves the outer section in place.
        let state = unsafe { critical_section::acquire() };
        let depth = self.depth.fetch_add(1, Ordering::AcqRel);
        if depth == 0 {
            *self.outer.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
        } else {
            // SAFETY: `state` came from the acquire just above.
            unsafe { critical_section::release(state) };
        }
        MaskState {
            was_masked: depth > 0,
        }
    }

    fn restore(&self, _previous: MaskState) {
        if self.depth.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let outer = self
            .outer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(state) = outer {
            // SAFETY: restore state of the outermost acquire, released last.
            unsafe { critical_section::release(state) };
        }
    }
}

impl std::fmt::Debug for GlobalInterruptMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalInterruptMask")
            .field("depth", &self.depth())
            .finish()
    }
}
