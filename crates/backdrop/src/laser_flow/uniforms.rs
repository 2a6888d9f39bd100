use bytemuck::{Pod, Zeroable};
use effectconfig::LaserFlowConfig;

/// Uniform block of the laser fragment program (std140, 96 bytes).
///
/// Field order matches `LaserFlow` in the GLSL source; keep them in sync.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LaserFlowUniforms {
    pub resolution: [f32; 2],
    pub mouse: [f32; 2],
    /// Linear-light base colour.
    pub color: [f32; 3],
    pub time: f32,
    pub horizontal_beam_offset: f32,
    pub vertical_beam_offset: f32,
    pub flow_speed: f32,
    pub wisp_density: f32,
    pub wisp_speed: f32,
    pub wisp_intensity: f32,
    pub fog_intensity: f32,
    pub vertical_sizing: f32,
    pub horizontal_sizing: f32,
    pub flow_strength: f32,
    pub decay: f32,
    pub falloff_start: f32,
    pub fog_fall_speed: f32,
    pub _pad: [f32; 3],
}

impl LaserFlowUniforms {
    pub fn from_config(config: &LaserFlowConfig, resolution: [f32; 2]) -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.set_resolution(resolution);
        uniforms.apply_config(config);
        uniforms
    }

    /// Updates every uniform that comes from configuration. Time, pointer and
    /// resolution are left untouched.
    pub fn apply_config(&mut self, config: &LaserFlowConfig) {
        self.color = config.color.to_linear_f32();
        self.horizontal_beam_offset = config.horizontal_beam_offset;
        self.vertical_beam_offset = config.vertical_beam_offset;
        self.flow_speed = config.flow_speed;
        self.wisp_density = config.wisp_density;
        self.wisp_speed = config.wisp_speed;
        self.wisp_intensity = config.wisp_intensity;
        self.fog_intensity = config.fog_intensity;
        self.vertical_sizing = config.vertical_sizing;
        self.horizontal_sizing = config.horizontal_sizing;
        self.flow_strength = config.flow_strength;
        self.decay = config.decay;
        self.falloff_start = config.falloff_start;
        self.fog_fall_speed = config.fog_fall_speed;
    }

    pub fn set_resolution(&mut self, resolution: [f32; 2]) {
        self.resolution = [resolution[0].max(1.0), resolution[1].max(1.0)];
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    pub fn set_pointer(&mut self, mouse: [f32; 2]) {
        self.mouse = mouse;
    }

    pub fn is_finite(&self) -> bool {
        bytemuck::cast_slice::<Self, f32>(std::slice::from_ref(self))
            .iter()
            .all(|value| value.is_finite())
    }
}
