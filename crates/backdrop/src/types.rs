use std::cell::Cell;
use std::rc::Rc;

use effectconfig::{AntialiasSetting, PowerSetting};

/// Measured rectangle of a mount container, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerMetrics {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
}

/// Element an effect is mounted into.
///
/// The window owns the measurements and updates them before publishing a
/// resize; effects only read them when they mount or consume that resize.
#[derive(Debug)]
pub struct Container {
    metrics: Cell<ContainerMetrics>,
}

impl Container {
    pub fn new(width: f64, height: f64, device_pixel_ratio: f64) -> Rc<Self> {
        Rc::new(Self {
            metrics: Cell::new(ContainerMetrics {
                x: 0.0,
                y: 0.0,
                width,
                height,
                device_pixel_ratio,
            }),
        })
    }

    pub fn measure(&self) -> ContainerMetrics {
        self.metrics.get()
    }

    pub fn set_size(&self, width: f64, height: f64) {
        let mut metrics = self.metrics.get();
        metrics.width = width;
        metrics.height = height;
        self.metrics.set(metrics);
    }

    #[cfg(test)]
    pub fn set_origin(&self, x: f64, y: f64) {
        let mut metrics = self.metrics.get();
        metrics.x = x;
        metrics.y = y;
        self.metrics.set(metrics);
    }

    pub fn set_device_pixel_ratio(&self, ratio: f64) {
        let mut metrics = self.metrics.get();
        metrics.device_pixel_ratio = ratio;
        self.metrics.set(metrics);
    }
}

/// Pixel-ratio choice of one effect: a fixed override, or the display ratio
/// capped to bound fill cost on dense screens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRatioPolicy {
    pub fixed: Option<f64>,
    pub cap: f64,
}

impl PixelRatioPolicy {
    pub fn capped(cap: f64) -> Self {
        Self { fixed: None, cap }
    }

    pub fn resolve(&self, device_pixel_ratio: f64) -> f64 {
        let ratio = match self.fixed {
            Some(fixed) => fixed,
            None => device_pixel_ratio.min(self.cap),
        };
        if ratio.is_finite() && ratio > 0.0 {
            ratio
        } else {
            1.0
        }
    }
}

/// Size of an effect's drawing surface.
///
/// Shader resolution and camera aspect use the logical size; the backing
/// texture uses the physical one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub logical_width: f32,
    pub logical_height: f32,
    pub pixel_ratio: f32,
    pub physical_width: u32,
    pub physical_height: u32,
}

impl SurfaceSize {
    pub fn new(logical_width: f64, logical_height: f64, pixel_ratio: f64) -> Self {
        let width = if logical_width.is_finite() {
            logical_width.max(1.0)
        } else {
            1.0
        };
        let height = if logical_height.is_finite() {
            logical_height.max(1.0)
        } else {
            1.0
        };
        Self {
            logical_width: width as f32,
            logical_height: height as f32,
            pixel_ratio: pixel_ratio as f32,
            physical_width: ((width * pixel_ratio).floor() as u32).max(1),
            physical_height: ((height * pixel_ratio).floor() as u32).max(1),
        }
    }

    pub fn measure(container: &ContainerMetrics, policy: PixelRatioPolicy) -> Self {
        Self::new(
            container.width,
            container.height,
            policy.resolve(container.device_pixel_ratio),
        )
    }

    pub fn aspect(&self) -> f32 {
        self.logical_width / self.logical_height
    }

    pub fn resolution(&self) -> [f32; 2] {
        [self.logical_width, self.logical_height]
    }

    pub fn physical(&self) -> (u32, u32) {
        (self.physical_width, self.physical_height)
    }
}

/// Anti-aliasing policy for layers that ask for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Antialiasing {
    /// Pick the highest sample count supported by the layer format.
    #[default]
    Auto,
    Off,
    /// Request a specific MSAA sample count (clamped to what the device supports).
    Samples(u32),
}

impl From<AntialiasSetting> for Antialiasing {
    fn from(setting: AntialiasSetting) -> Self {
        match setting.samples() {
            None => Antialiasing::Auto,
            Some(1) => Antialiasing::Off,
            Some(samples) => Antialiasing::Samples(samples),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

impl From<PowerSetting> for GpuPowerPreference {
    fn from(setting: PowerSetting) -> Self {
        match setting {
            PowerSetting::Low => GpuPowerPreference::Low,
            PowerSetting::High => GpuPowerPreference::High,
        }
    }
}

/// What we learned about the adapter we ended up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    pub fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
            || self.name.to_ascii_lowercase().contains("llvmpipe")
    }
}
