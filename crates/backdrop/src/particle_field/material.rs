use effectconfig::{ParticleFieldConfig, Rgb};
use glam::Vec3;

/// Metallic-look surface parameters. Colours are linear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardMaterial {
    pub color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
}

impl StandardMaterial {
    fn preset(color: Rgb, metalness: f32, roughness: f32, glow: f32, emissive_intensity: f32) -> Self {
        let color = Vec3::from(color.to_linear_f32());
        Self {
            color,
            metalness,
            roughness,
            emissive: color * glow,
            emissive_intensity,
        }
    }

    pub fn primary(color: Rgb) -> Self {
        Self::preset(color, 0.85, 0.2, 0.15, 0.6)
    }

    pub fn accent(color: Rgb) -> Self {
        Self::preset(color, 0.8, 0.3, 0.12, 0.5)
    }

    pub fn coin(color: Rgb) -> Self {
        Self::preset(color, 0.95, 0.25, 0.06, 0.4)
    }
}

/// Flat colour, no lighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicMaterial {
    pub color: Vec3,
    pub opacity: f32,
}

pub const LINE_BASE_OPACITY: f32 = 0.25;

/// Shimmer of the node network lines at `elapsed` seconds.
pub fn line_opacity(elapsed: f32) -> f32 {
    0.18 + 0.07 * (0.5 + 0.5 * (elapsed * 1.5).sin())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialSet {
    pub primary: StandardMaterial,
    pub accent: StandardMaterial,
    pub coin: StandardMaterial,
    pub node: BasicMaterial,
    pub line: BasicMaterial,
}

impl MaterialSet {
    pub fn from_config(config: &ParticleFieldConfig) -> Self {
        Self {
            primary: StandardMaterial::primary(config.primary_color),
            accent: StandardMaterial::accent(config.accent_color),
            coin: StandardMaterial::coin(config.coin_color),
            node: BasicMaterial {
                color: Vec3::ONE,
                opacity: 1.0,
            },
            line: BasicMaterial {
                color: Vec3::from(config.accent_color.to_linear_f32()),
                opacity: LINE_BASE_OPACITY,
            },
        }
    }
}

/// Hemisphere fill, one directional key light and exponential-squared fog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneLighting {
    pub sky: Vec3,
    pub ground: Vec3,
    pub hemisphere_intensity: f32,
    pub key_color: Vec3,
    pub key_intensity: f32,
    pub key_position: Vec3,
    pub fog_color: Vec3,
    pub fog_density: f32,
}

impl Default for SceneLighting {
    fn default() -> Self {
        Self {
            sky: Vec3::from(Rgb::from_hex(0x99ccff).to_linear_f32()),
            ground: Vec3::from(Rgb::from_hex(0x0b1020).to_linear_f32()),
            hemisphere_intensity: 0.8,
            key_color: Vec3::ONE,
            key_intensity: 0.8,
            key_position: Vec3::new(3.0, 4.0, 2.0),
            fog_color: Vec3::from(Rgb::from_hex(0x05070a).to_linear_f32()),
            fog_density: 0.015,
        }
    }
}

impl SceneLighting {
    /// Unit vector pointing from the scene toward the key light.
    pub fn key_direction(&self) -> Vec3 {
        self.key_position.normalize_or_zero()
    }

    pub fn fog_factor(&self, depth: f32) -> f32 {
        let density = self.fog_density * depth;
        (1.0 - (-density * density).exp()).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_derive_emissive_from_base_colour() {
        let materials = MaterialSet::from_config(&ParticleFieldConfig::default());
        let primary = materials.primary;
        assert_eq!(primary.metalness, 0.85);
        assert_eq!(primary.roughness, 0.2);
        assert_eq!(primary.emissive, primary.color * 0.15);
        assert_eq!(materials.accent.emissive_intensity, 0.5);
        assert_eq!(materials.coin.metalness, 0.95);
        assert_eq!(materials.coin.emissive, materials.coin.color * 0.06);
        assert_eq!(materials.line.color, materials.accent.color);
        assert_eq!(materials.node.color, Vec3::ONE);
    }

    #[test]
    fn line_opacity_pulses_between_bounds() {
        assert!((line_opacity(0.0) - 0.215).abs() < 1e-6);
        let mut lowest = f32::MAX;
        let mut highest = f32::MIN;
        for step in 0..1000 {
            let value = line_opacity(step as f32 * 0.01);
            lowest = lowest.min(value);
            highest = highest.max(value);
        }
        assert!(lowest >= 0.18 - 1e-6 && highest <= 0.25 + 1e-6);
        assert!(highest - lowest > 0.06);
    }

    #[test]
    fn fog_is_faint_at_scene_depth() {
        let lighting = SceneLighting::default();
        assert_eq!(lighting.fog_factor(0.0), 0.0);
        assert!(lighting.fog_factor(8.0) < 0.02);
        assert!(lighting.fog_factor(1000.0) > 0.99);
        assert!((lighting.key_direction().length() - 1.0).abs() < 1e-6);
    }
}
