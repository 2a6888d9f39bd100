use std::num::NonZeroU64;

use wgpu::naga::ShaderStage;
use wgpu::util::DeviceExt;

use crate::compile::compile_glsl;
use crate::gpu::{GpuDevice, LayerSurface, DEPTH_FORMAT};

use super::geometry::{self, MeshData, Vertex};
use super::scene::SceneObjectGroup;
use super::uniforms::{draw_stride, line_vertices, DrawList, DrawUniforms, FrameUniforms, MeshKind};

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, label: &str, mesh: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }

    fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}

struct Buffers {
    ring: GpuMesh,
    coin: GpuMesh,
    node: GpuMesh,
    lines: Option<wgpu::Buffer>,
    line_vertex_count: u32,
    frame: wgpu::Buffer,
    draws: wgpu::Buffer,
}

/// GPU side of the particle scene: shared meshes, per-draw uniform slots and
/// the two pipelines (lit/unlit triangles, translucent lines).
pub struct SceneRenderer {
    mesh_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    frame_bind_group: wgpu::BindGroup,
    draw_bind_group: wgpu::BindGroup,
    draw_stride: u64,
    draw_slots: usize,
    buffers: Option<Buffers>,
}

impl SceneRenderer {
    pub fn new(gpu: &GpuDevice, layer: &LayerSurface, scene: &SceneObjectGroup) -> Self {
        let device = &gpu.device;

        let ring = GpuMesh::upload(device, "chain ring mesh", &geometry::torus(0.35, 0.1, 16, 64));
        let coin = GpuMesh::upload(device, "coin mesh", &geometry::cylinder(1.0, 1.0, 1.0, 48));
        let node = GpuMesh::upload(device, "node mesh", &geometry::sphere(0.02, 8, 8));

        let line_data = line_vertices(scene);
        let lines = (!line_data.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("node lines"),
                contents: bytemuck::cast_slice(&line_data),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let frame = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene frame uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // One slot per mesh draw plus the line draw.
        let draw_slots = DrawList::capacity_for(scene) + 1;
        let stride = draw_stride(device.limits().min_uniform_buffer_offset_alignment);
        let draws = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene draw uniforms"),
            size: stride * draw_slots as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene frame layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let draw_size = NonZeroU64::new(std::mem::size_of::<DrawUniforms>() as u64);
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene draw layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: draw_size,
                },
                count: None,
            }],
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene frame bind group"),
            layout: &frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame.as_entire_binding(),
            }],
        });
        let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene draw bind group"),
            layout: &draw_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &draws,
                    offset: 0,
                    size: draw_size,
                }),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene pipeline layout"),
            bind_group_layouts: &[&frame_layout, &draw_layout],
            push_constant_ranges: &[],
        });
        let vertex_module = compile_glsl(device, "scene vertex", SCENE_VERTEX_GLSL, ShaderStage::Vertex);
        let fragment_module = compile_glsl(
            device,
            "scene fragment",
            SCENE_FRAGMENT_GLSL,
            ShaderStage::Fragment,
        );
        let build = |label: &str, topology: wgpu::PrimitiveTopology, depth_write_enabled: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some("main"),
                    buffers: &[Vertex::layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: layer.sample_count(),
                    ..Default::default()
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: layer.format(),
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        };
        let mesh_pipeline = build("scene mesh pipeline", wgpu::PrimitiveTopology::TriangleList, true);
        let line_pipeline = build("scene line pipeline", wgpu::PrimitiveTopology::LineList, false);

        tracing::debug!(
            draws = draw_slots,
            lines = line_data.len() / 2,
            samples = layer.sample_count(),
            "particle scene uploaded"
        );

        Self {
            mesh_pipeline,
            line_pipeline,
            frame_bind_group,
            draw_bind_group,
            draw_stride: stride,
            draw_slots,
            buffers: Some(Buffers {
                ring,
                coin,
                node,
                line_vertex_count: line_data.len() as u32,
                lines,
                frame,
                draws,
            }),
        }
    }

    /// Records one frame into `layer`. Returns false when there was nothing
    /// to draw into.
    pub fn draw(
        &self,
        gpu: &GpuDevice,
        layer: &LayerSurface,
        frame: &FrameUniforms,
        list: &DrawList,
    ) -> bool {
        let Some(buffers) = self.buffers.as_ref() else {
            return false;
        };
        let (Some(color), Some(depth)) = (layer.color_attachment(), layer.depth_attachment()) else {
            return false;
        };

        let slots = list.items.len().min(self.draw_slots - 1);
        let stride = self.draw_stride as usize;
        let mut staging = vec![0u8; stride * (slots + 1)];
        for (slot, item) in list.items.iter().take(slots).enumerate() {
            let offset = slot * stride;
            staging[offset..offset + std::mem::size_of::<DrawUniforms>()]
                .copy_from_slice(bytemuck::bytes_of(&item.uniforms));
        }
        let line_offset = slots * stride;
        staging[line_offset..line_offset + std::mem::size_of::<DrawUniforms>()]
            .copy_from_slice(bytemuck::bytes_of(&list.lines));

        gpu.queue
            .write_buffer(&buffers.frame, 0, bytemuck::bytes_of(frame));
        gpu.queue.write_buffer(&buffers.draws, 0, &staging);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("particle scene encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("particle scene pass"),
                color_attachments: &[Some(color)],
                depth_stencil_attachment: Some(depth),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.mesh_pipeline);
            pass.set_bind_group(0, &self.frame_bind_group, &[]);

            let mut bound = None;
            for (slot, item) in list.items.iter().take(slots).enumerate() {
                let mesh = match item.mesh {
                    MeshKind::Ring => &buffers.ring,
                    MeshKind::Coin => &buffers.coin,
                    MeshKind::Node => &buffers.node,
                };
                if bound != Some(item.mesh) {
                    pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    bound = Some(item.mesh);
                }
                pass.set_bind_group(1, &self.draw_bind_group, &[(slot * stride) as u32]);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }

            if let Some(lines) = buffers.lines.as_ref() {
                pass.set_pipeline(&self.line_pipeline);
                pass.set_vertex_buffer(0, lines.slice(..));
                pass.set_bind_group(1, &self.draw_bind_group, &[line_offset as u32]);
                pass.draw(0..buffers.line_vertex_count, 0..1);
            }
        }
        gpu.queue.submit(Some(encoder.finish()));
        true
    }

    /// Destroys every buffer. Releasing twice is a no-op.
    pub fn release(&mut self) {
        let Some(buffers) = self.buffers.take() else {
            return;
        };
        buffers.ring.destroy();
        buffers.coin.destroy();
        buffers.node.destroy();
        if let Some(lines) = buffers.lines {
            lines.destroy();
        }
        buffers.frame.destroy();
        buffers.draws.destroy();
        tracing::debug!("particle scene buffers released");
    }

    pub fn is_released(&self) -> bool {
        self.buffers.is_none()
    }
}

impl Drop for SceneRenderer {
    fn drop(&mut self) {
        self.release();
    }
}

pub(crate) const SCENE_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_normal;

layout(location = 0) out vec3 v_world;
layout(location = 1) out vec3 v_normal;
layout(location = 2) out float v_fog_depth;

layout(std140, set = 0, binding = 0) uniform Frame {
    mat4 u_view;
    mat4 u_projection;
    vec4 u_camera;
    vec4 u_sky;
    vec4 u_ground;
    vec4 u_light_dir;
    vec4 u_light_color;
    vec4 u_fog;
};

layout(std140, set = 1, binding = 0) uniform Draw {
    mat4 u_model;
    mat4 u_normal_matrix;
    vec4 u_color;
    vec4 u_emissive;
    vec4 u_params;
};

void main() {
    vec4 world = u_model * vec4(a_position, 1.0);
    vec4 view = u_view * world;
    v_world = world.xyz;
    v_normal = (u_normal_matrix * vec4(a_normal, 0.0)).xyz;
    v_fog_depth = -view.z;
    gl_Position = u_projection * view;
}
";

pub(crate) const SCENE_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec3 v_world;
layout(location = 1) in vec3 v_normal;
layout(location = 2) in float v_fog_depth;

layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Frame {
    mat4 u_view;
    mat4 u_projection;
    vec4 u_camera;
    vec4 u_sky;
    vec4 u_ground;
    vec4 u_light_dir;
    vec4 u_light_color;
    vec4 u_fog;
};

layout(std140, set = 1, binding = 0) uniform Draw {
    mat4 u_model;
    mat4 u_normal_matrix;
    vec4 u_color;
    vec4 u_emissive;
    vec4 u_params;
};

const float PI = 3.14159265;

vec3 linear_to_srgb(vec3 c) {
    vec3 lo = c * 12.92;
    vec3 hi = 1.055 * pow(c, vec3(1.0 / 2.4)) - vec3(0.055);
    return mix(lo, hi, step(vec3(0.0031308), c));
}

float distribution_ggx(float n_dot_h, float roughness) {
    float a = roughness * roughness;
    float a2 = a * a;
    float d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * d * d);
}

vec3 fresnel_schlick(float v_dot_h, vec3 f0) {
    return f0 + (vec3(1.0) - f0) * pow(1.0 - v_dot_h, 5.0);
}

vec3 shade_standard(vec3 base) {
    vec3 n = normalize(v_normal);
    vec3 v = normalize(u_camera.xyz - v_world);
    if (dot(n, v) < 0.0) {
        n = -n;
    }
    float metalness = u_params.x;
    float roughness = max(u_params.y, 0.04);
    vec3 diffuse = base * (1.0 - metalness);
    vec3 f0 = mix(vec3(0.04), base, metalness);

    vec3 hemi = mix(u_ground.rgb, u_sky.rgb, 0.5 * n.y + 0.5) * u_sky.w;
    vec3 color = hemi * diffuse + hemi * f0 * (1.0 - roughness) * 0.5;

    vec3 l = normalize(u_light_dir.xyz);
    vec3 h = normalize(l + v);
    float n_dot_l = max(dot(n, l), 0.0);
    float n_dot_h = max(dot(n, h), 0.0);
    float v_dot_h = max(dot(v, h), 0.0);
    vec3 radiance = u_light_color.rgb * u_light_dir.w;
    vec3 specular = fresnel_schlick(v_dot_h, f0) * distribution_ggx(n_dot_h, roughness) * 0.25;
    color += (diffuse + specular * PI) * radiance * n_dot_l;

    return color + u_emissive.rgb * u_emissive.w;
}

void main() {
    vec3 color = u_color.rgb;
    if (u_params.z < 0.5) {
        color = shade_standard(color);
    }

    float fog_amount = u_fog.w * v_fog_depth;
    float fog_factor = clamp(1.0 - exp(-fog_amount * fog_amount), 0.0, 1.0);
    color = mix(color, u_fog.rgb, fog_factor);

    out_color = vec4(linear_to_srgb(max(color, vec3(0.0))), u_color.a);
}
";
