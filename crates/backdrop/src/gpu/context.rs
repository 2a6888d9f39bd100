use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::TextureFormatFeatureFlags;
use winit::dpi::PhysicalSize;

use crate::types::{AdapterProfile, Antialiasing, GpuPowerPreference};

/// Format of every effect layer texture.
pub const LAYER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Device handles shared with the effects.
#[derive(Clone, Debug)]
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub layer_format: wgpu::TextureFormat,
    /// MSAA sample count for layers that ask for anti-aliasing.
    pub sample_count: u32,
}

/// Instance, adapter, device and the window swapchain.
pub struct GpuContext {
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    gpu: GpuDevice,
    config: wgpu::SurfaceConfiguration,
    formats: SurfaceFormats,
    size: PhysicalSize<u32>,
    adapter_profile: AdapterProfile,
}

impl GpuContext {
    pub fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        antialiasing: Antialiasing,
        gpu_power: GpuPowerPreference,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        // The caller keeps the window alive for as long as this context.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let power_preference = match gpu_power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let limits = adapter.limits();
        let adapter_profile = AdapterProfile::from_wgpu(&adapter.get_info(), &limits);
        let is_software = adapter_profile.is_software();
        tracing::info!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            is_software,
            "selected GPU adapter"
        );

        let max_dimension = limits.max_texture_dimension_2d;
        let requested_width = initial_size.width.max(1);
        let requested_height = initial_size.height.max(1);
        if requested_width > max_dimension || requested_height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested surface is {requested_width}x{requested_height}"
            );
        }

        let surface_caps = surface.get_capabilities(&adapter);
        let view_formats_supported = adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::SURFACE_VIEW_FORMATS);
        let formats = select_surface_formats(&surface_caps.formats, view_formats_supported)
            .context("surface reports no supported formats")?;
        if formats.storage.is_srgb() {
            if formats.view.is_srgb() {
                tracing::warn!(
                    surface_format = ?formats.storage,
                    "sRGB-only surface without view reinterpretation; compositor linearises layers"
                );
            } else {
                tracing::debug!(
                    surface_format = ?formats.storage,
                    view_format = ?formats.view,
                    "sRGB-only surface; compositing through its non-sRGB view"
                );
            }
        }

        let format_features = adapter.get_texture_format_features(LAYER_FORMAT);
        let mut sample_count = select_sample_count(
            antialiasing,
            &format_features.flags.supported_sample_counts(),
        );
        if sample_count > 1
            && !format_features
                .flags
                .contains(TextureFormatFeatureFlags::MULTISAMPLE_RESOLVE)
        {
            tracing::warn!("layer format does not support MSAA resolve; disabling MSAA");
            sample_count = 1;
        }
        if is_software && sample_count > 1 {
            tracing::warn!(
                sample_count,
                "software rasterizer detected; disabling MSAA for performance"
            );
            sample_count = 1;
        }

        let mut required_features = wgpu::Features::empty();
        if sample_count > 4 {
            required_features |= wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("neonx device"),
            required_features,
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| surface_caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let size = PhysicalSize::new(requested_width, requested_height);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: formats.storage,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: formats.view_formats(),
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        tracing::debug!(?formats, ?present_mode, sample_count, "surface configured");

        Ok(Self {
            _instance: instance,
            surface,
            gpu: GpuDevice {
                device,
                queue,
                layer_format: LAYER_FORMAT,
                sample_count,
            },
            config,
            formats,
            size,
            adapter_profile,
        })
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.adapter_profile
    }

    /// Format the compositor renders into; see [`GpuContext::target_view`].
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.formats.view
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.gpu.device, &self.config);
    }

    /// Reconfigures the swapchain at its current size after `Lost`/`Outdated`.
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.gpu.device, &self.config);
    }

    pub fn acquire(&self) -> Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        self.surface.get_current_texture()
    }

    /// View of an acquired frame in [`GpuContext::surface_format`].
    pub fn target_view(&self, frame: &wgpu::SurfaceTexture) -> wgpu::TextureView {
        frame.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("swapchain view"),
            format: Some(self.formats.view),
            ..Default::default()
        })
    }
}

/// Swapchain storage format and the format it is rendered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SurfaceFormats {
    pub storage: wgpu::TextureFormat,
    pub view: wgpu::TextureFormat,
}

impl SurfaceFormats {
    fn view_formats(&self) -> Vec<wgpu::TextureFormat> {
        if self.view == self.storage {
            Vec::new()
        } else {
            vec![self.view]
        }
    }
}

/// Layers hold display-encoded values, so the compositor must not write into
/// an sRGB view. A non-sRGB format wins; an sRGB-only surface is viewed
/// without its sRGB suffix when the backend can reinterpret surface formats.
pub(crate) fn select_surface_formats(
    formats: &[wgpu::TextureFormat],
    view_formats_supported: bool,
) -> Option<SurfaceFormats> {
    if let Some(format) = formats.iter().copied().find(|format| !format.is_srgb()) {
        return Some(SurfaceFormats {
            storage: format,
            view: format,
        });
    }
    let storage = formats.first().copied()?;
    let view = if view_formats_supported {
        storage.remove_srgb_suffix()
    } else {
        storage
    };
    Some(SurfaceFormats { storage, view })
}

/// Picks an MSAA sample count from what the format supports.
pub(crate) fn select_sample_count(antialiasing: Antialiasing, supported: &[u32]) -> u32 {
    let mut supported = supported.to_vec();
    if !supported.contains(&1) {
        supported.push(1);
    }
    supported.sort_unstable();
    supported.dedup();

    match antialiasing {
        Antialiasing::Auto => supported.last().copied().unwrap_or(1).min(4),
        Antialiasing::Off => 1,
        Antialiasing::Samples(requested) => {
            if supported.contains(&requested) {
                requested
            } else {
                let fallback = supported
                    .iter()
                    .copied()
                    .filter(|&count| count <= requested)
                    .max()
                    .unwrap_or(1);
                tracing::warn!(
                    requested,
                    fallback,
                    ?supported,
                    "requested MSAA sample count not supported; falling back"
                );
                fallback
            }
        }
    }
}
