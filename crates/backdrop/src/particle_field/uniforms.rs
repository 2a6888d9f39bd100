use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::camera::PerspectiveCamera;
use super::material::{BasicMaterial, MaterialSet, SceneLighting, StandardMaterial};
use super::scene::{ChainLink, SceneObjectGroup};

/// Per-frame block (`Frame` in the scene shaders, std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub camera: [f32; 4],
    /// Sky colour, hemisphere intensity in `w`.
    pub sky: [f32; 4],
    pub ground: [f32; 4],
    /// Direction toward the key light, intensity in `w`.
    pub light_dir: [f32; 4],
    pub light_color: [f32; 4],
    /// Fog colour, exp² density in `w`.
    pub fog: [f32; 4],
}

impl FrameUniforms {
    pub fn new(camera: &PerspectiveCamera, lighting: &SceneLighting) -> Self {
        Self {
            view: camera.view().to_cols_array_2d(),
            projection: camera.projection().to_cols_array_2d(),
            camera: camera.position.extend(1.0).to_array(),
            sky: lighting.sky.extend(lighting.hemisphere_intensity).to_array(),
            ground: lighting.ground.extend(0.0).to_array(),
            light_dir: lighting
                .key_direction()
                .extend(lighting.key_intensity)
                .to_array(),
            light_color: lighting.key_color.extend(1.0).to_array(),
            fog: lighting.fog_color.extend(lighting.fog_density).to_array(),
        }
    }
}

/// Per-draw block (`Draw` in the scene shaders), bound with a dynamic offset.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    /// Base colour, opacity in `w`.
    pub color: [f32; 4],
    /// Emissive colour, intensity in `w`.
    pub emissive: [f32; 4],
    /// Metalness, roughness, unlit flag.
    pub params: [f32; 4],
}

impl DrawUniforms {
    pub fn lit(model: Mat4, material: &StandardMaterial) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            color: material.color.extend(1.0).to_array(),
            emissive: material
                .emissive
                .extend(material.emissive_intensity)
                .to_array(),
            params: [material.metalness, material.roughness, 0.0, 0.0],
        }
    }

    pub fn unlit(model: Mat4, material: &BasicMaterial) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            color: material.color.extend(material.opacity).to_array(),
            emissive: [0.0; 4],
            params: [0.0, 1.0, 1.0, 0.0],
        }
    }

    pub fn opacity(&self) -> f32 {
        self.color[3]
    }
}

/// Rounds the draw block up to the device's dynamic-offset alignment.
pub fn draw_stride(min_alignment: u32) -> u64 {
    let size = std::mem::size_of::<DrawUniforms>() as u64;
    let align = u64::from(min_alignment.max(1));
    size.div_ceil(align) * align
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshKind {
    Ring,
    Coin,
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub mesh: MeshKind,
    pub uniforms: DrawUniforms,
}

/// Everything one frame draws, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawList {
    pub items: Vec<DrawItem>,
    pub lines: DrawUniforms,
}

impl DrawList {
    pub fn build(scene: &SceneObjectGroup, materials: &MaterialSet) -> Self {
        let root = scene.root.transform.matrix();
        let [ring_a, ring_b] = ChainLink::ring_transforms();
        let (ring_a, ring_b) = (ring_a.matrix(), ring_b.matrix());

        let mut items = Vec::with_capacity(Self::capacity_for(scene));
        for chain in &scene.chains {
            let chain_matrix = root * chain.transform.matrix();
            items.push(DrawItem {
                mesh: MeshKind::Ring,
                uniforms: DrawUniforms::lit(chain_matrix * ring_a, &materials.primary),
            });
            items.push(DrawItem {
                mesh: MeshKind::Ring,
                uniforms: DrawUniforms::lit(chain_matrix * ring_b, &materials.accent),
            });
        }
        for coin in &scene.coins {
            let model = root * coin.transform.matrix() * coin.shape();
            items.push(DrawItem {
                mesh: MeshKind::Coin,
                uniforms: DrawUniforms::lit(model, &materials.coin),
            });
        }
        for node in &scene.nodes {
            let model = root * Mat4::from_translation(*node);
            items.push(DrawItem {
                mesh: MeshKind::Node,
                uniforms: DrawUniforms::unlit(model, &materials.node),
            });
        }

        let line_material = BasicMaterial {
            opacity: scene.line_opacity,
            ..materials.line
        };
        Self {
            items,
            lines: DrawUniforms::unlit(root, &line_material),
        }
    }

    /// Draw slots a scene needs: two rings per chain, one per coin and node.
    pub fn capacity_for(scene: &SceneObjectGroup) -> usize {
        scene.chains.len() * 2 + scene.coins.len() + scene.nodes.len()
    }

    /// Slot of the line draw, after every mesh draw.
    pub fn line_slot(&self) -> usize {
        self.items.len()
    }
}

/// Line endpoints flattened into vertices, normals zeroed.
pub fn line_vertices(scene: &SceneObjectGroup) -> Vec<super::geometry::Vertex> {
    scene
        .line_segments()
        .into_iter()
        .flatten()
        .map(|position| super::geometry::Vertex {
            position: position.to_array(),
            normal: Vec3::ZERO.to_array(),
        })
        .collect()
}
