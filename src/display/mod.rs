//! Frame buffering and presentation surface
//!
//! The playback core talks to the screen through the narrow [`DisplaySurface`]
//! capability set; the windowing and GPU plumbing behind it lives in
//! [`window`].

mod frame_ring;
pub mod window;

pub use frame_ring::{FrameRing, ReadSlot, RingConsumer, RingProducer, WriteSlot};
pub use window::WindowSurface;

use crate::error::PlayerError;

/// Event drained from the surface's input queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The user asked to close the surface.
    Closed,
    /// The surface was resized to the given physical dimensions.
    Resized(u32, u32),
    /// Nothing pending.
    None,
}

/// Where decoded frames end up.
///
/// Implementations own the window and its event queue; the presentation loop
/// only pumps events, pushes pixels and flips.
pub trait DisplaySurface {
    /// Drain one pending event, `SurfaceEvent::None` when the queue is empty.
    fn poll_event(&mut self) -> SurfaceEvent;

    fn is_open(&self) -> bool;

    /// React to a size change of the underlying window.
    fn resize(&mut self, width: u32, height: u32);

    /// Upload one RGBA frame at the configured output resolution.
    fn update(&mut self, pixels: &[u8]) -> Result<(), PlayerError>;

    /// Flip the last uploaded frame onto the screen.
    fn present(&mut self) -> Result<(), PlayerError>;

    /// Close the surface; `is_open` reports `false` afterwards.
    fn close(&mut self);
}
