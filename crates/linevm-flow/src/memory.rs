//! Host-supplied memory contract. The flow engine never inspects a
//! [`MemoryState`]'s contents — it only creates, resets, and hands it off
//! across calls and returns through the hooks on [`MemoryModel`].

/// Per-frame storage. Hosts own the shape; the engine only needs a default
/// value to construct and a way to clear it back to that default.
pub trait MemoryState: Default {
    fn reset(&mut self);
}

/// Factory and cross-frame hooks for a host's [`MemoryState`] type.
pub trait MemoryModel {
    type State: MemoryState;

    /// A fresh state for a newly pushed call frame.
    fn new_state(&self) -> Self::State;

    /// Invoked when `callee` is pushed beneath `caller` (i.e. `caller` calls
    /// a module). Typical use: copy inputs from caller into callee.
    fn on_call(&self, caller: &mut Self::State, callee: &mut Self::State);

    /// Invoked when `returning` is popped back to `caller`. Typical use:
    /// copy outputs from the returning frame into the caller.
    fn on_return(&self, returning: &mut Self::State, caller: &mut Self::State);

    /// Reset any state shared across all frames (not per-frame memory).
    fn reset_global(&mut self);
}
