//! GPU plumbing shared by the effects.
//!
//! - `context` owns the wgpu instance/device/swapchain wiring, picks the MSAA
//!   sample count and rebuilds the swapchain when the window resizes.
//! - `layer` is an effect's drawing surface: an offscreen colour texture plus
//!   optional MSAA and depth attachments, sized in physical pixels.
//! - `compositor` blends every layer over the page background with its fade
//!   opacity and writes the swapchain image.

mod compositor;
mod context;
mod layer;

pub use compositor::{CompositeLayer, Compositor};
pub use context::{GpuContext, GpuDevice, LAYER_FORMAT};
pub use layer::{LayerOptions, LayerSurface, DEPTH_FORMAT};
