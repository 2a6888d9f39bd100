//! The laser panel: one fullscreen fragment program drawing two horizontal
//! light beams with noise wisps, a flowing sine band and soft fog.
//!
//! All knobs are uniforms, so configuration changes never rebuild GPU state.

mod field;
mod shader;
mod uniforms;

use std::time::Duration;

use anyhow::{bail, Result};
use effectconfig::LaserFlowConfig;

use crate::gpu::{GpuDevice, LayerOptions, LayerSurface};
use crate::lifecycle::{Effect, FrameInput, PointerSample, Reconfigure};
use crate::pointer::{container_tilt, laser_smoothing_factor, PointerState};
use crate::types::{PixelRatioPolicy, SurfaceSize};

pub use field::{beams, fbm, shade};
pub use uniforms::LaserFlowUniforms;

pub struct LaserFlowPanel {
    config: LaserFlowConfig,
    uniforms: LaserFlowUniforms,
    pointer: PointerState,
}

pub struct LaserFlowResources {
    layer: LayerSurface,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl LaserFlowResources {
    pub fn layer(&self) -> &LayerSurface {
        &self.layer
    }
}

impl LaserFlowPanel {
    pub fn new(config: LaserFlowConfig) -> Self {
        let uniforms = LaserFlowUniforms::from_config(&config, [1.0, 1.0]);
        Self {
            config,
            uniforms,
            pointer: PointerState::new(),
        }
    }

    pub fn config(&self) -> &LaserFlowConfig {
        &self.config
    }

    pub fn uniforms(&self) -> &LaserFlowUniforms {
        &self.uniforms
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    pub(crate) fn apply_surface(&mut self, surface: SurfaceSize) {
        self.uniforms.set_resolution(surface.resolution());
    }

    /// Uniforms for the next draw; non-finite values fail the frame.
    fn frame_uniforms(&self) -> Result<&LaserFlowUniforms> {
        if !self.uniforms.is_finite() {
            bail!("laser flow uniforms are not finite");
        }
        Ok(&self.uniforms)
    }
}

impl Effect for LaserFlowPanel {
    type Device = GpuDevice;
    type Resources = LaserFlowResources;
    type Config = LaserFlowConfig;

    fn label(&self) -> &'static str {
        "laser_flow"
    }

    fn pixel_ratio(&self) -> PixelRatioPolicy {
        PixelRatioPolicy {
            fixed: self.config.dpr,
            cap: self.config.device_pixel_ratio_cap,
        }
    }

    fn fade_in(&self) -> Duration {
        self.config.fade_in
    }

    fn initialize(&mut self, gpu: &GpuDevice, surface: SurfaceSize) -> Result<LaserFlowResources> {
        self.pointer.reset();
        self.uniforms = LaserFlowUniforms::from_config(&self.config, surface.resolution());

        let layer = LayerSurface::new(
            gpu,
            surface,
            LayerOptions {
                label: "laser flow layer",
                multisample: false,
                depth: false,
            },
        );

        let uniform_layout = shader::create_bind_group_layout(&gpu.device);
        let pipeline = shader::create_pipeline(gpu, &uniform_layout);
        let uniform_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("laser flow uniforms"),
            size: std::mem::size_of::<LaserFlowUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("laser flow bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Ok(LaserFlowResources {
            layer,
            pipeline,
            uniform_buffer,
            bind_group,
        })
    }

    fn pointer_moved(&mut self, sample: &PointerSample) {
        self.pointer.set_target(container_tilt(
            &sample.event,
            &sample.container,
            self.config.mouse_tilt_strength,
        ));
    }

    fn resize(&mut self, gpu: &GpuDevice, resources: &mut LaserFlowResources, surface: SurfaceSize) {
        self.apply_surface(surface);
        resources.layer.resize(gpu, surface);
    }

    fn tick(&mut self, frame: &FrameInput) {
        let mouse = self
            .pointer
            .step(laser_smoothing_factor(self.config.mouse_smooth_time));
        self.uniforms.set_time(frame.elapsed());
        self.uniforms.set_pointer(mouse);
    }

    fn render(&mut self, gpu: &GpuDevice, resources: &mut LaserFlowResources) -> Result<()> {
        let Some(attachment) = resources.layer.color_attachment() else {
            bail!("laser flow layer was released");
        };
        let uniforms = self.frame_uniforms()?;
        gpu.queue
            .write_buffer(&resources.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("laser flow encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("laser flow pass"),
                color_attachments: &[Some(attachment)],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&resources.pipeline);
            pass.set_bind_group(0, &resources.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        gpu.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn reconfigure(&mut self, config: LaserFlowConfig) -> Reconfigure {
        self.uniforms.apply_config(&config);
        self.config = config;
        Reconfigure::InPlace
    }

    fn dispose(&mut self, _gpu: &GpuDevice, mut resources: LaserFlowResources) {
        resources.layer.release();
        resources.uniform_buffer.destroy();
    }
}
