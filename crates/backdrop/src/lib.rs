//! Animated hero backgrounds rendered with `wgpu`.
//!
//! Two effects share one render loop:
//!
//! ```text
//!   neonx CLI
//!       │ BackdropConfig
//!       ▼
//!   WindowRuntime ──▶ Stage ──▶ EffectHost<LaserFlowPanel>     ─┐
//!       │                  └──▶ EffectHost<ParticleFieldScene> ─┤ LayerSurface
//!       │                                                       ▼
//!       └──── winit events ──▶ EventHub          Compositor ──▶ swapchain
//! ```
//!
//! Every effect goes through the same lifecycle (see [`lifecycle`]): it is
//! mounted into a measured container, renders once per frame token handed out
//! by the [`schedule::FrameScheduler`], reacts to pointer and resize events
//! published on the [`events::EventHub`], fades in after mounting and releases
//! its GPU resources on unmount. The stage composites each effect's offscreen
//! layer over the page background in stacking order.

mod compile;
pub mod events;
pub mod gpu;
pub mod laser_flow;
pub mod lifecycle;
pub mod particle_field;
pub mod pointer;
pub mod runtime;
pub mod schedule;
pub mod stage;
pub mod timeline;
pub mod types;
pub mod window;

pub use events::{EventHub, HostEvent, PointerEvent};
pub use laser_flow::LaserFlowPanel;
pub use lifecycle::{Effect, EffectHost, FrameOutcome, HostEnvironment, HostOptions, Reconfigure};
pub use particle_field::ParticleFieldScene;
pub use runtime::ClockPolicy;
pub use schedule::{FrameScheduler, FrameToken};
pub use stage::{GpuLayerFactory, Stage};
pub use timeline::FadeCurve;
pub use types::{Antialiasing, Container, GpuPowerPreference, SurfaceSize};
pub use window::{PreviewOptions, StageCommand, WindowRuntime};
