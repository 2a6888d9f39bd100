use crate::types::SurfaceSize;

use super::context::GpuDevice;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// What a layer needs besides its colour texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerOptions {
    pub label: &'static str,
    pub multisample: bool,
    pub depth: bool,
}

struct Attachment {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Attachment {
    fn new(
        device: &wgpu::Device,
        label: &str,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        sample_count: u32,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

struct Targets {
    color: Attachment,
    msaa: Option<Attachment>,
    depth: Option<Attachment>,
}

/// An effect's drawing surface: a transparent texture the compositor blends
/// over the page.
pub struct LayerSurface {
    options: LayerOptions,
    format: wgpu::TextureFormat,
    sample_count: u32,
    size: (u32, u32),
    targets: Option<Targets>,
}

impl LayerSurface {
    pub fn new(gpu: &GpuDevice, surface: SurfaceSize, options: LayerOptions) -> Self {
        let sample_count = if options.multisample {
            gpu.sample_count.max(1)
        } else {
            1
        };
        let size = surface.physical();
        let targets = Some(Self::allocate(
            &gpu.device,
            options,
            gpu.layer_format,
            sample_count,
            size,
        ));
        tracing::debug!(
            layer = options.label,
            width = size.0,
            height = size.1,
            sample_count,
            "layer surface allocated"
        );
        Self {
            options,
            format: gpu.layer_format,
            sample_count,
            size,
            targets,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        options: LayerOptions,
        format: wgpu::TextureFormat,
        sample_count: u32,
        size: (u32, u32),
    ) -> Targets {
        let color = Attachment::new(
            device,
            options.label,
            size,
            format,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let msaa = (sample_count > 1).then(|| {
            Attachment::new(
                device,
                "layer msaa target",
                size,
                format,
                sample_count,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
        });
        let depth = options.depth.then(|| {
            Attachment::new(
                device,
                "layer depth",
                size,
                DEPTH_FORMAT,
                sample_count,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
        });
        Targets { color, msaa, depth }
    }

    /// Reallocates when the physical size changed. Same size is a no-op.
    pub fn resize(&mut self, gpu: &GpuDevice, surface: SurfaceSize) {
        let size = surface.physical();
        if size == self.size || self.targets.is_none() {
            return;
        }
        self.destroy_targets();
        self.targets = Some(Self::allocate(
            &gpu.device,
            self.options,
            self.format,
            self.sample_count,
            size,
        ));
        self.size = size;
        tracing::debug!(
            layer = self.options.label,
            width = size.0,
            height = size.1,
            "layer surface resized"
        );
    }

    /// Destroys the GPU textures. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if self.targets.is_none() {
            return;
        }
        self.destroy_targets();
        tracing::debug!(layer = self.options.label, "layer surface released");
    }

    fn destroy_targets(&mut self) {
        if let Some(targets) = self.targets.take() {
            targets.color.texture.destroy();
            if let Some(msaa) = targets.msaa {
                msaa.texture.destroy();
            }
            if let Some(depth) = targets.depth {
                depth.texture.destroy();
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.targets.is_none()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Resolved colour the compositor samples.
    pub fn view(&self) -> Option<&wgpu::TextureView> {
        self.targets.as_ref().map(|targets| &targets.color.view)
    }

    /// Colour attachment cleared to transparent, resolving MSAA if enabled.
    pub fn color_attachment(&self) -> Option<wgpu::RenderPassColorAttachment<'_>> {
        let targets = self.targets.as_ref()?;
        let (view, resolve_target) = match &targets.msaa {
            Some(msaa) => (&msaa.view, Some(&targets.color.view)),
            None => (&targets.color.view, None),
        };
        Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })
    }

    pub fn depth_attachment(&self) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
        let depth = self.targets.as_ref()?.depth.as_ref()?;
        Some(wgpu::RenderPassDepthStencilAttachment {
            view: &depth.view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Discard,
            }),
            stencil_ops: None,
        })
    }
}

impl Drop for LayerSurface {
    fn drop(&mut self) {
        self.release();
    }
}
