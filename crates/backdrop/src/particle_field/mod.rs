//! The particle scene: floating chain links, coins and a sparse node network
//! drifting with a pointer parallax.
//!
//! Colour and density changes regenerate the whole scene; the layout is drawn
//! from a seeded `StdRng` when a seed is configured and from entropy
//! otherwise.

mod camera;
mod geometry;
mod material;
mod renderer;
mod scene;
mod uniforms;

use std::time::Duration;

use anyhow::{bail, Result};
use effectconfig::ParticleFieldConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::gpu::{GpuDevice, LayerOptions, LayerSurface};
use crate::lifecycle::{Effect, FrameInput, PointerSample, Reconfigure};
use crate::pointer::viewport_offset;
use crate::types::{PixelRatioPolicy, SurfaceSize};

pub use camera::PerspectiveCamera;
pub use geometry::{cylinder, sphere, torus, MeshData, Vertex};
pub use material::{line_opacity, BasicMaterial, MaterialSet, SceneLighting, StandardMaterial};
pub use renderer::SceneRenderer;
pub use scene::{ChainLink, Coin, LinePair, ParallaxRoot, SceneCounts, SceneObjectGroup, Transform};
pub use uniforms::{DrawList, DrawUniforms, FrameUniforms, MeshKind};

pub struct ParticleFieldScene {
    config: ParticleFieldConfig,
    camera: PerspectiveCamera,
    materials: MaterialSet,
    lighting: SceneLighting,
    scene: Option<SceneObjectGroup>,
}

pub struct ParticleFieldResources {
    layer: LayerSurface,
    renderer: SceneRenderer,
}

impl ParticleFieldResources {
    pub fn layer(&self) -> &LayerSurface {
        &self.layer
    }
}

impl ParticleFieldScene {
    pub fn new(config: ParticleFieldConfig) -> Self {
        let materials = MaterialSet::from_config(&config);
        Self {
            config,
            camera: PerspectiveCamera::default(),
            materials,
            lighting: SceneLighting::default(),
            scene: None,
        }
    }

    pub fn config(&self) -> &ParticleFieldConfig {
        &self.config
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn scene(&self) -> Option<&SceneObjectGroup> {
        self.scene.as_ref()
    }

    /// Generates a fresh layout and fits the camera to `surface`.
    pub(crate) fn build_scene(&mut self, surface: SurfaceSize) -> &SceneObjectGroup {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.materials = MaterialSet::from_config(&self.config);
        self.apply_surface(surface);
        let scene = SceneObjectGroup::generate(&self.config, &mut rng);
        tracing::debug!(
            chains = scene.chains.len(),
            coins = scene.coins.len(),
            nodes = scene.nodes.len(),
            lines = scene.lines.len(),
            "particle scene generated"
        );
        self.scene.insert(scene)
    }

    pub(crate) fn apply_surface(&mut self, surface: SurfaceSize) {
        self.camera.set_aspect(surface.aspect());
    }

    /// Frame and draw blocks for the current state, if a scene exists.
    pub fn prepare_frame(&self) -> Option<(FrameUniforms, DrawList)> {
        let scene = self.scene.as_ref()?;
        Some((
            FrameUniforms::new(&self.camera, &self.lighting),
            DrawList::build(scene, &self.materials),
        ))
    }
}

impl Effect for ParticleFieldScene {
    type Device = GpuDevice;
    type Resources = ParticleFieldResources;
    type Config = ParticleFieldConfig;

    fn label(&self) -> &'static str {
        "particle_field"
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

    fn initialize(&mut self, gpu: &GpuDevice, surface: SurfaceSize) -> Result<ParticleFieldResources> {
        let layer = LayerSurface::new(
            gpu,
            surface,
            LayerOptions {
                label: "particle field layer",
                multisample: true,
                depth: true,
            },
        );
        let scene = self.build_scene(surface);
        let renderer = SceneRenderer::new(gpu, &layer, scene);
        Ok(ParticleFieldResources { layer, renderer })
    }

    fn pointer_moved(&mut self, sample: &PointerSample) {
        if let Some(scene) = self.scene.as_mut() {
            scene.follow_pointer(viewport_offset(&sample.event));
        }
    }

    fn resize(
        &mut self,
        gpu: &GpuDevice,
        resources: &mut ParticleFieldResources,
        surface: SurfaceSize,
    ) {
        self.apply_surface(surface);
        resources.layer.resize(gpu, surface);
    }

    fn tick(&mut self, frame: &FrameInput) {
        if let Some(scene) = self.scene.as_mut() {
            scene.advance(frame.elapsed());
        }
    }

    fn render(&mut self, gpu: &GpuDevice, resources: &mut ParticleFieldResources) -> Result<()> {
        let Some((frame, list)) = self.prepare_frame() else {
            bail!("particle scene was not generated");
        };
        if !resources
            .renderer
            .draw(gpu, &resources.layer, &frame, &list)
        {
            bail!("particle field layer was released");
        }
        Ok(())
    }

    fn reconfigure(&mut self, config: ParticleFieldConfig) -> Reconfigure {
        let rebuild = self.config.requires_rebuild(&config);
        self.config = config;
        if rebuild {
            Reconfigure::Rebuild
        } else {
            Reconfigure::InPlace
        }
    }

    fn dispose(&mut self, _gpu: &GpuDevice, mut resources: ParticleFieldResources) {
        resources.renderer.release();
        resources.layer.release();
        self.scene = None;
    }

    fn updates_while_hidden(&self) -> bool {
        false
    }
}
