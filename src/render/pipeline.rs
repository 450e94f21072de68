//! wgpu plumbing for drawing [`TraceVertex`] batches with `trace.wgsl`.

use super::coverage::{TRACE_SHADER_WGSL, TraceUniforms};
use super::geometry::TraceVertex;
use iced_wgpu::wgpu;
use std::mem::size_of;

impl TraceVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: 8,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: 16,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}

/// Additive accumulation: overlapping passes of the beam brighten.
const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Vertex buffer plus the uniform block for one trace. Each trace binds its
/// own uniforms, so several traces can share a pass.
#[derive(Debug)]
pub struct TraceBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub capacity: wgpu::BufferAddress,
    pub vertex_count: u32,
    label: &'static str,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl TraceBuffer {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &'static str,
        size: wgpu::BufferAddress,
    ) -> Self {
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size_of::<TraceUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });
        let size = size.max(1);
        Self {
            vertex_buffer: vertex_buffer(device, label, size),
            capacity: size,
            vertex_count: 0,
            label,
            uniforms,
            bind_group,
        }
    }

    /// Uploads `vertices` and `uniforms`, growing the vertex buffer to the
    /// next power of two if needed.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        vertices: &[TraceVertex],
        uniforms: &TraceUniforms,
    ) {
        let size = (vertices.len() * size_of::<TraceVertex>()) as wgpu::BufferAddress;
        if size > self.capacity {
            self.capacity = size.next_power_of_two();
            self.vertex_buffer = vertex_buffer(device, self.label, self.capacity);
        }
        self.vertex_count = vertices.len() as u32;
        if !vertices.is_empty() {
            queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(vertices));
        }
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(uniforms));
    }
}

fn vertex_buffer(
    device: &wgpu::Device,
    label: &'static str,
    size: wgpu::BufferAddress,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn uniform_layout_entry() -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size_of::<TraceUniforms>() as u64),
        },
        count: None,
    }
}

#[derive(Debug)]
pub struct TracePipeline {
    pub pipeline: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
}

impl TracePipeline {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let label = "openscope trace";
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(TRACE_SHADER_WGSL.into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[uniform_layout_entry()],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(
                &device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(label),
                    bind_group_layouts: &[&uniform_layout],
                    push_constant_ranges: &[],
                }),
            ),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[TraceVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(ADDITIVE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            uniform_layout,
        }
    }

    /// Allocates the buffers for one trace (a channel, math or XY).
    pub fn trace_buffer(
        &self,
        device: &wgpu::Device,
        label: &'static str,
        size: wgpu::BufferAddress,
    ) -> TraceBuffer {
        TraceBuffer::new(device, &self.uniform_layout, label, size)
    }

    /// Records one trace draw with that trace's own uniforms.
    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, buffer: &'a TraceBuffer) {
        if buffer.vertex_count == 0 {
            return;
        }
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &buffer.bind_group, &[]);
        pass.set_vertex_buffer(0, buffer.vertex_buffer.slice(..));
        pass.draw(0..buffer.vertex_count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn vertex_layout_matches_struct() {
        let layout = TraceVertex::layout();
        assert_eq!(layout.array_stride, size_of::<TraceVertex>() as u64);
        let offsets: Vec<_> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(
            offsets,
            vec![
                offset_of!(TraceVertex, position) as u64,
                offset_of!(TraceVertex, local) as u64,
                offset_of!(TraceVertex, length) as u64,
            ]
        );
        let locations: Vec<_> = layout.attributes.iter().map(|a| a.shader_location).collect();
        assert_eq!(locations, vec![0, 1, 2]);
    }

    #[test]
    fn uniform_binding_covers_the_whole_block() {
        let entry = uniform_layout_entry();
        let wgpu::BindingType::Buffer {
            min_binding_size, ..
        } = entry.ty
        else {
            panic!("uniform entry is not a buffer binding");
        };
        assert_eq!(
            min_binding_size.map(|size| size.get()),
            Some(size_of::<TraceUniforms>() as u64)
        );
        assert!(TRACE_SHADER_WGSL.contains("@group(0) @binding(0)"));
    }

    #[test]
    fn blending_is_additive() {
        for component in [ADDITIVE.color, ADDITIVE.alpha] {
            assert_eq!(component.src_factor, wgpu::BlendFactor::One);
            assert_eq!(component.dst_factor, wgpu::BlendFactor::One);
            assert_eq!(component.operation, wgpu::BlendOperation::Add);
        }
    }
}
