use bytemuck::{Pod, Zeroable};
use effectconfig::Rgb;
use wgpu::naga::ShaderStage;

use crate::compile::{compile_fullscreen_vertex, compile_glsl};

use super::context::GpuDevice;

/// One layer to blend, bottom first.
pub struct CompositeLayer<'a> {
    pub view: &'a wgpu::TextureView,
    pub opacity: f32,
}

#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CompositeUniforms {
    opacity: f32,
    /// Non-zero when the target re-encodes on write.
    linearize: f32,
    _pad: [f32; 2],
}

impl CompositeUniforms {
    fn new(opacity: f32, target_is_srgb: bool) -> Self {
        Self {
            opacity: opacity.clamp(0.0, 1.0),
            linearize: if target_is_srgb { 1.0 } else { 0.0 },
            _pad: [0.0; 2],
        }
    }
}

/// Blends premultiplied layer textures over the page background and writes
/// the result into the swapchain.
pub struct Compositor {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffers: Vec<wgpu::Buffer>,
    background: wgpu::Color,
    target_is_srgb: bool,
}

impl Compositor {
    pub fn new(gpu: &GpuDevice, target_format: wgpu::TextureFormat, background: Rgb) -> Self {
        let device = &gpu.device;
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("composite sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let vertex_module = compile_fullscreen_vertex(device);
        let fragment_module = compile_glsl(
            device,
            "composite fragment",
            COMPOSITE_FRAGMENT_GLSL,
            ShaderStage::Fragment,
        );
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite pipeline layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("composite pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let target_is_srgb = target_format.is_srgb();
        Self {
            pipeline,
            bind_layout,
            sampler,
            uniform_buffers: Vec::new(),
            background: background_color(background, target_is_srgb),
            target_is_srgb,
        }
    }

    pub fn set_background(&mut self, background: Rgb) {
        self.background = background_color(background, self.target_is_srgb);
    }

    /// Records and submits one composite pass into `target`.
    pub fn draw(&mut self, gpu: &GpuDevice, target: &wgpu::TextureView, layers: &[CompositeLayer<'_>]) {
        let device = &gpu.device;
        while self.uniform_buffers.len() < layers.len() {
            self.uniform_buffers
                .push(device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("composite uniforms"),
                    size: std::mem::size_of::<CompositeUniforms>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }));
        }

        let mut bind_groups = Vec::with_capacity(layers.len());
        for (layer, buffer) in layers.iter().zip(&self.uniform_buffers) {
            let uniforms = CompositeUniforms::new(layer.opacity, self.target_is_srgb);
            gpu.queue
                .write_buffer(buffer, 0, bytemuck::bytes_of(&uniforms));
            bind_groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("composite bind group"),
                layout: &self.bind_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(layer.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffer.as_entire_binding(),
                    },
                ],
            }));
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("composite encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.background),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            for bind_group in &bind_groups {
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
        gpu.queue.submit(Some(encoder.finish()));
    }
}

/// Clear colour for the page background in the swapchain's encoding.
pub(crate) fn background_color(background: Rgb, target_is_srgb: bool) -> wgpu::Color {
    let [r, g, b] = if target_is_srgb {
        background.to_linear_f32()
    } else {
        background.to_srgb_f32()
    };
    wgpu::Color {
        r: f64::from(r),
        g: f64::from(g),
        b: f64::from(b),
        a: 1.0,
    }
}

/// Layer textures are premultiplied; the fade scales all four channels.
pub(crate) const COMPOSITE_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D layer_texture;
layout(set = 0, binding = 1) uniform sampler layer_sampler;
layout(std140, set = 0, binding = 2) uniform Composite {
    float opacity;
    float linearize;
};

vec3 srgb_to_linear(vec3 c) {
    vec3 low = c / 12.92;
    vec3 high = pow((c + 0.055) / 1.055, vec3(2.4));
    return mix(high, low, step(c, vec3(0.04045)));
}

void main() {
    vec2 uv = vec2(v_uv.x, 1.0 - v_uv.y);
    vec4 texel = texture(sampler2D(layer_texture, layer_sampler), uv);
    if (linearize > 0.5 && texel.a > 0.0) {
        vec3 straight = clamp(texel.rgb / texel.a, 0.0, 1.0);
        texel.rgb = srgb_to_linear(straight) * texel.a;
    }
    out_color = texel * opacity;
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::tests::assert_valid_glsl;

    #[test]
    fn composite_shader_is_valid() {
        assert_valid_glsl(COMPOSITE_FRAGMENT_GLSL, ShaderStage::Fragment);
    }

    #[test]
    fn srgb_targets_ask_the_shader_to_linearise() {
        let plain = CompositeUniforms::new(1.5, false);
        assert_eq!(plain.opacity, 1.0);
        assert_eq!(plain.linearize, 0.0);
        let srgb = CompositeUniforms::new(0.25, true);
        assert_eq!(srgb.opacity, 0.25);
        assert_eq!(srgb.linearize, 1.0);
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 16);
    }

    #[test]
    fn background_matches_swapchain_encoding() {
        let slate = Rgb::from_hex(0x020617);
        let gamma = background_color(slate, false);
        assert!((gamma.b - 23.0 / 255.0).abs() < 1e-6);
        let linear = background_color(slate, true);
        assert!(linear.b < gamma.b);
        assert_eq!(linear.a, 1.0);
    }
}
