//! CPU evaluation of the laser fragment program.
//!
//! Mirrors `LASER_FLOW_FRAGMENT_GLSL` line for line so the numeric behaviour
//! (beam falloff, noise octaves, alpha range) can be checked without a GPU.

use glam::{Mat2, Vec2, Vec3};

use super::uniforms::LaserFlowUniforms;

pub fn hash(p: Vec2) -> f32 {
    fract(p.dot(Vec2::new(127.1, 311.7)).sin() * 43758.547)
}

/// Value noise with smoothstep interpolation.
pub fn noise(p: Vec2) -> f32 {
    let i = p.floor();
    let f = p - i;
    let a = hash(i);
    let b = hash(i + Vec2::new(1.0, 0.0));
    let c = hash(i + Vec2::new(0.0, 1.0));
    let d = hash(i + Vec2::new(1.0, 1.0));
    let u = f * f * (Vec2::splat(3.0) - 2.0 * f);
    mix(a, b, u.x) + (c - a) * u.y * (1.0 - u.x) + (d - b) * u.x * u.y
}

pub const FBM_OCTAVES: usize = 5;

/// Five octaves, halving amplitude, rotating and scaling the domain each time.
pub fn fbm(mut p: Vec2) -> f32 {
    let m = Mat2::from_cols(Vec2::new(1.6, 1.2), Vec2::new(-1.2, 1.6));
    let mut f = 0.0;
    let mut a = 0.5;
    for _ in 0..FBM_OCTAVES {
        f += a * noise(p);
        p = m * p;
        a *= 0.5;
    }
    f
}

/// The two horizontal beams at vertical position `y`.
pub fn beams(y: f32, uniforms: &LaserFlowUniforms) -> (f32, f32) {
    let sizing = uniforms.horizontal_sizing;
    let beam = (-((y + uniforms.vertical_beam_offset).abs() / sizing).powf(uniforms.decay)).exp();
    let beam2 =
        (-((y - uniforms.vertical_beam_offset).abs() / (sizing * 1.2)).powf(uniforms.decay)).exp();
    (beam, beam2)
}

/// Colour and alpha of the pixel at `uv` (origin bottom-left).
pub fn shade(uv: Vec2, uniforms: &LaserFlowUniforms) -> [f32; 4] {
    let [width, height] = uniforms.resolution;
    let mut p = uv - Vec2::splat(0.5);
    p.x *= width / height;
    p.x += uniforms.mouse[0] * 0.05;
    p.y += uniforms.mouse[1] * 0.03;

    let t = uniforms.time * uniforms.flow_speed;

    let (beam, beam2) = beams(p.y, uniforms);

    let wisp_uv = Vec2::new(
        p.x * uniforms.vertical_sizing + t * uniforms.wisp_speed,
        p.y * uniforms.vertical_sizing,
    );
    let wisps = fbm(wisp_uv * uniforms.wisp_density);

    let flow = ((p.x + uniforms.horizontal_beam_offset + t) * 6.2831).sin() * uniforms.flow_strength;

    let intensity = beam + beam2 + wisps * uniforms.wisp_intensity + flow;

    let fog = smoothstep(uniforms.falloff_start, 0.0, p.length()) * uniforms.fog_intensity;
    let vertical_fog = smoothstep(-0.2, 0.8, uv.y + (t * uniforms.fog_fall_speed).sin() * 0.02)
        * uniforms.fog_intensity
        * 0.6;

    let final_intensity = intensity.max(0.0) + fog + vertical_fog;

    let mut color = Vec3::from(uniforms.color) * final_intensity;
    color.x += 0.03 * (t * 1.7 + p.y * 6.0).sin();
    color.z += 0.02 * (t * 1.1 + p.x * 5.0).cos();
    let color = color.max(Vec3::ZERO).powf(0.85);

    [color.x, color.y, color.z, final_intensity.clamp(0.0, 1.0)]
}

/// GLSL `fract` (`x - floor(x)`); `f32::fract` truncates toward zero instead.
fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// GLSL `smoothstep`, including reversed edges.
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use effectconfig::LaserFlowConfig;

    fn uniforms(config: &LaserFlowConfig) -> LaserFlowUniforms {
        LaserFlowUniforms::from_config(config, [800.0, 600.0])
    }

    #[test]
    fn alpha_stays_in_unit_range_and_colour_is_finite() {
        let mut u = uniforms(&LaserFlowConfig::default());
        for time in [0.0_f32, 1.7, 42.0] {
            u.set_time(time);
            u.set_pointer([0.01, -0.01]);
            for ix in 0..=16 {
                for iy in 0..=16 {
                    let uv = Vec2::new(ix as f32 / 16.0, iy as f32 / 16.0);
                    let [r, g, b, a] = shade(uv, &u);
                    assert!((0.0..=1.0).contains(&a), "alpha {a} at {uv:?}");
                    assert!(r.is_finite() && g.is_finite() && b.is_finite());
                    assert!(r >= 0.0 && g >= 0.0 && b >= 0.0);
                }
            }
        }
    }

    #[test]
    fn beam_peaks_at_its_offset() {
        let config = LaserFlowConfig {
            vertical_beam_offset: 0.2,
            ..LaserFlowConfig::default()
        };
        let u = uniforms(&config);
        let (beam, _) = beams(-0.2, &u);
        assert!((beam - 1.0).abs() < 1e-6);
        let (_, beam2) = beams(0.2, &u);
        assert!((beam2 - 1.0).abs() < 1e-6);
        let (far, _) = beams(0.4, &u);
        assert!(far < beam);
    }

    #[test]
    fn beam_follows_stretched_exponential() {
        let u = uniforms(&LaserFlowConfig::default());
        let (beam, beam2) = beams(0.25, &u);
        let expected = (-(0.25_f32 / 0.5).powf(1.1)).exp();
        let expected2 = (-(0.25_f32 / 0.6).powf(1.1)).exp();
        assert!((beam - expected).abs() < 1e-6);
        assert!((beam2 - expected2).abs() < 1e-6);
    }

    #[test]
    fn fbm_is_bounded_by_amplitude_sum() {
        for ix in 0..40 {
            for iy in 0..40 {
                let value = fbm(Vec2::new(ix as f32 * 0.37 - 7.0, iy as f32 * 0.53 - 3.0));
                assert!((0.0..0.96875 + 1e-5).contains(&value));
            }
        }
    }

    #[test]
    fn noise_interpolates_lattice_hashes() {
        let corner = Vec2::new(3.0, -2.0);
        assert!((noise(corner) - hash(corner)).abs() < 1e-6);
        assert!((0.0..1.0).contains(&hash(Vec2::new(0.5, 0.25))));
    }

    #[test]
    fn without_wisps_flow_or_fog_alpha_is_the_beam_sum() {
        let config = LaserFlowConfig {
            wisp_intensity: 0.0,
            flow_strength: 0.0,
            fog_intensity: 0.0,
            ..LaserFlowConfig::default()
        };
        let u = uniforms(&config);
        let [_, _, _, alpha] = shade(Vec2::new(0.5, 0.9), &u);
        let (beam, beam2) = beams(0.4, &u);
        assert!((alpha - (beam + beam2).min(1.0)).abs() < 1e-5);
    }

    #[test]
    fn pointer_tilt_shifts_the_field() {
        let config = LaserFlowConfig {
            wisp_intensity: 0.0,
            flow_strength: 0.0,
            fog_intensity: 0.0,
            ..LaserFlowConfig::default()
        };
        let mut u = uniforms(&config);
        let uv = Vec2::new(0.5, 0.95);
        let still = shade(uv, &u);
        u.set_pointer([0.0, 1.0]);
        let tilted = shade(uv, &u);
        assert!(tilted[3] < still[3]);
    }
}
