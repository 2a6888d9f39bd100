//! Procedural layout and per-frame animation of the particle scene.
//!
//! Everything here is plain data: generation draws from a caller-provided
//! random source once per mount, and [`SceneObjectGroup::advance`] mutates
//! the owned transforms each frame.

use std::f32::consts::{FRAC_PI_2, PI};

use effectconfig::ParticleFieldConfig;
use glam::{EulerRot, Mat4, Quat, Vec3};
use rand::Rng;

use crate::pointer::{PointerState, PARALLAX_SMOOTHING};

use super::material::{line_opacity, LINE_BASE_OPACITY};

/// Object counts for one density value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneCounts {
    pub chains: usize,
    pub coins: usize,
    pub nodes: usize,
}

impl SceneCounts {
    pub fn for_density(density: f64) -> Self {
        let density = if density.is_finite() {
            density.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            chains: (3.0 + 4.0 * density).floor() as usize,
            coins: (6.0 + 8.0 * density).floor() as usize,
            nodes: (60.0 + 80.0 * density).floor() as usize,
        }
    }
}

/// Position, XYZ Euler rotation and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

/// Two interlocked rings. The first lies flat, the second stands upright and
/// is shifted half a link to the side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainLink {
    pub transform: Transform,
}

impl ChainLink {
    pub fn ring_transforms() -> [Transform; 2] {
        [
            Transform {
                rotation: Vec3::new(FRAC_PI_2, 0.0, 0.0),
                ..Transform::default()
            },
            Transform {
                position: Vec3::new(0.5, 0.0, 0.0),
                rotation: Vec3::new(0.0, FRAC_PI_2, 0.0),
                ..Transform::default()
            },
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coin {
    pub transform: Transform,
    pub radius: f32,
    pub thickness: f32,
}

impl Coin {
    /// Maps the unit cylinder onto this coin's disk.
    pub fn shape(&self) -> Mat4 {
        Mat4::from_scale(Vec3::new(self.radius, self.thickness, self.radius))
    }
}

/// Node indices joined by one line segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePair {
    pub from: usize,
    pub to: usize,
}

pub const LINE_STRIDE: std::ops::RangeInclusive<usize> = 2..=4;
pub const LINE_STEP: std::ops::RangeInclusive<usize> = 3..=12;

/// Whole-scene offset that trails the pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParallaxRoot {
    pointer: PointerState,
    pub transform: Transform,
}

impl ParallaxRoot {
    pub fn follow(&mut self, target: [f32; 2]) {
        self.pointer.set_target(target);
    }

    pub fn step(&mut self) {
        let [x, y] = self.pointer.step(PARALLAX_SMOOTHING);
        self.transform.position.x = x * 0.25;
        self.transform.position.y = -y * 0.15;
        self.transform.rotation.y = x * 0.1;
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObjectGroup {
    pub counts: SceneCounts,
    pub chains: Vec<ChainLink>,
    pub coins: Vec<Coin>,
    pub nodes: Vec<Vec3>,
    pub lines: Vec<LinePair>,
    pub root: ParallaxRoot,
    pub line_opacity: f32,
}

impl SceneObjectGroup {
    pub fn generate<R: Rng + ?Sized>(config: &ParticleFieldConfig, rng: &mut R) -> Self {
        let counts = SceneCounts::for_density(config.density);

        let chains = (0..counts.chains)
            .map(|_| {
                let scale = 0.7 + rng.gen::<f32>() * 0.8;
                let position = Vec3::new(
                    (rng.gen::<f32>() - 0.5) * 4.5,
                    (rng.gen::<f32>() - 0.2) * 2.4,
                    -0.8 - rng.gen::<f32>() * 1.8,
                );
                let rotation = Vec3::new(
                    rng.gen::<f32>() * 1.5,
                    rng.gen::<f32>() * 1.5,
                    rng.gen::<f32>() * 1.5,
                );
                ChainLink {
                    transform: Transform {
                        position,
                        rotation,
                        scale: Vec3::splat(scale),
                    },
                }
            })
            .collect();

        let coins = (0..counts.coins)
            .map(|_| {
                let radius = 0.12 + rng.gen::<f32>() * 0.22;
                let thickness = 0.06 + rng.gen::<f32>() * 0.06;
                let position = Vec3::new(
                    (rng.gen::<f32>() - 0.5) * 6.0,
                    (rng.gen::<f32>() - 0.3) * 3.2,
                    -0.6 - rng.gen::<f32>() * 2.2,
                );
                let rotation = Vec3::new(
                    rng.gen::<f32>() * PI,
                    rng.gen::<f32>() * PI,
                    rng.gen::<f32>() * PI,
                );
                Coin {
                    transform: Transform {
                        position,
                        rotation,
                        ..Transform::default()
                    },
                    radius,
                    thickness,
                }
            })
            .collect();

        let nodes: Vec<Vec3> = (0..counts.nodes)
            .map(|_| {
                Vec3::new(
                    (rng.gen::<f32>() - 0.5) * 7.0,
                    (rng.gen::<f32>() - 0.25) * 3.8,
                    -1.2 - rng.gen::<f32>() * 3.5,
                )
            })
            .collect();

        let lines = connect_nodes(counts.nodes, rng);

        Self {
            counts,
            chains,
            coins,
            nodes,
            lines,
            root: ParallaxRoot::default(),
            line_opacity: LINE_BASE_OPACITY,
        }
    }

    /// Points the parallax at a viewport-normalised pointer position.
    pub fn follow_pointer(&mut self, target: [f32; 2]) {
        self.root.follow(target);
    }

    /// One frame of animation. Chain spin and coin bob are per-frame
    /// increments, so they accumulate with the frame count.
    pub fn advance(&mut self, elapsed: f32) {
        self.root.step();

        for (i, chain) in self.chains.iter_mut().enumerate() {
            let i = i as f32;
            chain.transform.rotation.x += 0.002 + i * 0.0002;
            chain.transform.rotation.y -= 0.003 + i * 0.0001;
        }

        for (i, coin) in self.coins.iter_mut().enumerate() {
            coin.transform.rotation.y += 0.02;
            coin.transform.position.y += (elapsed * 1.2 + i as f32).sin() * 0.002;
        }

        self.line_opacity = line_opacity(elapsed);
    }

    /// Endpoints of every line segment in root space.
    pub fn line_segments(&self) -> Vec<[Vec3; 2]> {
        self.lines
            .iter()
            .filter_map(|pair| Some([*self.nodes.get(pair.from)?, *self.nodes.get(pair.to)?]))
            .collect()
    }
}

/// Joins node `i` to `(i + step) % count`, walking `i` by a random stride.
fn connect_nodes<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<LinePair> {
    let mut lines = Vec::new();
    if count == 0 {
        return lines;
    }
    let mut i = 0;
    while i < count {
        let step = rng.gen_range(LINE_STEP);
        lines.push(LinePair {
            from: i,
            to: (i + step) % count,
        });
        i += rng.gen_range(LINE_STRIDE);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(density: f64) -> ParticleFieldConfig {
        ParticleFieldConfig {
            density,
            ..ParticleFieldConfig::default()
        }
    }

    fn generate(density: f64, seed: u64) -> SceneObjectGroup {
        SceneObjectGroup::generate(&config(density), &mut StdRng::seed_from_u64(seed))
    }

    #[test]
    fn zero_density_yields_minimum_counts() {
        let scene = generate(0.0, 1);
        assert_eq!(scene.chains.len(), 3);
        assert_eq!(scene.coins.len(), 6);
        assert_eq!(scene.nodes.len(), 60);
    }

    #[test]
    fn counts_follow_density_and_never_decrease() {
        assert_eq!(
            SceneCounts::for_density(0.8),
            SceneCounts {
                chains: 6,
                coins: 12,
                nodes: 124
            }
        );
        assert_eq!(
            SceneCounts::for_density(1.0),
            SceneCounts {
                chains: 7,
                coins: 14,
                nodes: 140
            }
        );
        let mut previous = SceneCounts::for_density(0.0);
        for step in 1..=100 {
            let counts = SceneCounts::for_density(step as f64 / 100.0);
            assert!(counts.chains >= previous.chains);
            assert!(counts.coins >= previous.coins);
            assert!(counts.nodes >= previous.nodes);
            previous = counts;
        }
    }

    #[test]
    fn line_pairs_use_valid_steps_and_strides() {
        for seed in 0..20 {
            let scene = generate(0.8, seed);
            let count = scene.nodes.len();
            assert!(!scene.lines.is_empty());
            assert_eq!(scene.lines[0].from, 0);
            for pair in &scene.lines {
                assert!(pair.from < count && pair.to < count);
                let step = (pair.to + count - pair.from) % count;
                assert!(LINE_STEP.contains(&step), "step {step}");
            }
            for window in scene.lines.windows(2) {
                let stride = window[1].from - window[0].from;
                assert!(LINE_STRIDE.contains(&stride), "stride {stride}");
            }
            assert_eq!(scene.line_segments().len(), scene.lines.len());
        }
    }

    fn within(value: f32, low: f32, high: f32) -> bool {
        const SLACK: f32 = 1e-5;
        value >= low - SLACK && value <= high + SLACK
    }

    #[test]
    fn objects_stay_inside_their_bounds() {
        let scene = generate(1.0, 7);
        for chain in &scene.chains {
            let t = chain.transform;
            assert!(within(t.scale.x, 0.7, 1.5));
            assert!(within(t.position.x, -2.25, 2.25));
            assert!(within(t.position.y, -0.48, 1.92));
            assert!(within(t.position.z, -2.6, -0.8));
            assert!(within(t.rotation.x, 0.0, 1.5));
        }
        for coin in &scene.coins {
            assert!(within(coin.radius, 0.12, 0.34));
            assert!(within(coin.thickness, 0.06, 0.12));
            assert!(within(coin.transform.position.x, -3.0, 3.0));
            assert!(within(coin.transform.position.z, -2.8, -0.6));
        }
        for node in &scene.nodes {
            assert!(within(node.x, -3.5, 3.5));
            assert!(within(node.y, -0.95, 2.85));
            assert!(within(node.z, -4.7, -1.2));
        }
    }

    #[test]
    fn same_seed_same_layout() {
        assert_eq!(generate(0.5, 42), generate(0.5, 42));
        assert_ne!(generate(0.5, 42).nodes, generate(0.5, 43).nodes);
    }

    #[test]
    fn advance_spins_chains_by_index() {
        let mut scene = generate(0.0, 3);
        let before: Vec<Vec3> = scene.chains.iter().map(|c| c.transform.rotation).collect();
        scene.advance(0.0);
        for (i, (chain, start)) in scene.chains.iter().zip(&before).enumerate() {
            let i = i as f32;
            let delta = chain.transform.rotation - *start;
            assert!((delta.x - (0.002 + i * 0.0002)).abs() < 1e-6);
            assert!((delta.y + (0.003 + i * 0.0001)).abs() < 1e-6);
            assert_eq!(delta.z, 0.0);
        }
    }

    #[test]
    fn advance_spins_and_bobs_coins() {
        let mut scene = generate(0.0, 3);
        let before = scene.coins.clone();
        scene.advance(1.0);
        for (i, (coin, start)) in scene.coins.iter().zip(&before).enumerate() {
            let spin = coin.transform.rotation.y - start.transform.rotation.y;
            assert!((spin - 0.02).abs() < 1e-6);
            let bob = coin.transform.position.y - start.transform.position.y;
            assert!((bob - (1.2 + i as f32).sin() * 0.002).abs() < 1e-6);
        }
        assert!((scene.line_opacity - line_opacity(1.0)).abs() < 1e-7);
    }

    #[test]
    fn parallax_trails_pointer_without_overshoot() {
        let mut scene = generate(0.0, 3);
        scene.follow_pointer([1.0, -1.0]);
        let mut last = 0.0;
        for _ in 0..200 {
            scene.advance(0.0);
            let x = scene.root.transform.position.x;
            assert!(x >= last && x <= 0.25);
            last = x;
        }
        let root = scene.root.transform;
        assert!((root.position.x - 0.25).abs() < 1e-3);
        assert!((root.position.y - 0.15).abs() < 1e-3);
        assert!((root.rotation.y - 0.1).abs() < 1e-3);
    }

    #[test]
    fn ring_transforms_interlock() {
        let [a, b] = ChainLink::ring_transforms();
        let a_normal = a.matrix().transform_vector3(Vec3::Z);
        let b_normal = b.matrix().transform_vector3(Vec3::Z);
        assert!(a_normal.dot(b_normal).abs() < 1e-6);
        assert_eq!(b.position.x, 0.5);
    }
}
