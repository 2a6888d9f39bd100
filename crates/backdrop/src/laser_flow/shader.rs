use wgpu::naga::ShaderStage;

use crate::compile::{compile_fullscreen_vertex, compile_glsl};
use crate::gpu::GpuDevice;

pub(super) fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("laser flow uniform layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

/// Fullscreen triangle with normal alpha blending into a cleared layer, which
/// leaves the layer premultiplied.
pub(super) fn create_pipeline(
    gpu: &GpuDevice,
    uniform_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let device = &gpu.device;
    let vertex_module = compile_fullscreen_vertex(device);
    let fragment_module = compile_glsl(
        device,
        "laser flow fragment",
        LASER_FLOW_FRAGMENT_GLSL,
        ShaderStage::Fragment,
    );
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("laser flow pipeline layout"),
        bind_group_layouts: &[uniform_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("laser flow pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_module,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: gpu.layer_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

pub(crate) const LASER_FLOW_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform LaserFlow {
    vec2 u_resolution;
    vec2 u_mouse;
    vec3 u_color;
    float u_time;
    float u_horizontalBeamOffset;
    float u_verticalBeamOffset;
    float u_flowSpeed;
    float u_wispDensity;
    float u_wispSpeed;
    float u_wispIntensity;
    float u_fogIntensity;
    float u_verticalSizing;
    float u_horizontalSizing;
    float u_flowStrength;
    float u_decay;
    float u_falloffStart;
    float u_fogFallSpeed;
};

float hash(vec2 p) {
    return fract(sin(dot(p, vec2(127.1, 311.7))) * 43758.5453123);
}

float noise(vec2 p) {
    vec2 i = floor(p);
    vec2 f = fract(p);
    float a = hash(i);
    float b = hash(i + vec2(1.0, 0.0));
    float c = hash(i + vec2(0.0, 1.0));
    float d = hash(i + vec2(1.0, 1.0));
    vec2 u = f * f * (vec2(3.0) - 2.0 * f);
    return mix(a, b, u.x) + (c - a) * u.y * (1.0 - u.x) + (d - b) * u.x * u.y;
}

float fbm(vec2 p) {
    float f = 0.0;
    float a = 0.5;
    mat2 m = mat2(1.6, 1.2, -1.2, 1.6);
    for (int i = 0; i < 5; i++) {
        f += a * noise(p);
        p = m * p;
        a *= 0.5;
    }
    return f;
}

void main() {
    vec2 uv = v_uv;

    vec2 p = uv - vec2(0.5);
    p.x *= u_resolution.x / u_resolution.y;

    p.x += u_mouse.x * 0.05;
    p.y += u_mouse.y * 0.03;

    float t = u_time * u_flowSpeed;

    float beam = exp(-pow(abs(p.y + u_verticalBeamOffset) / u_horizontalSizing, u_decay));
    float beam2 = exp(-pow(abs(p.y - u_verticalBeamOffset) / (u_horizontalSizing * 1.2), u_decay));

    vec2 wisp_uv = vec2(p.x * u_verticalSizing + t * u_wispSpeed, p.y * u_verticalSizing);
    float wisps = fbm(wisp_uv * u_wispDensity);

    float flow = sin((p.x + u_horizontalBeamOffset + t) * 6.2831) * u_flowStrength;

    float intensity = beam + beam2 + wisps * u_wispIntensity + flow;

    float dist = length(p);
    float fog = smoothstep(u_falloffStart, 0.0, dist) * u_fogIntensity;
    float vertical_fog = smoothstep(-0.2, 0.8, uv.y + sin(t * u_fogFallSpeed) * 0.02)
        * u_fogIntensity * 0.6;

    float final_intensity = max(0.0, intensity) + fog + vertical_fog;

    vec3 color = u_color * final_intensity;
    color.r += 0.03 * sin(t * 1.7 + p.y * 6.0);
    color.b += 0.02 * cos(t * 1.1 + p.x * 5.0);

    // pow() is undefined below zero; the wobble can dip there in dark areas.
    color = pow(max(color, vec3(0.0)), vec3(0.85));

    out_color = vec4(color, clamp(final_intensity, 0.0, 1.0));
}
";
