use std::collections::BTreeSet;
use std::sync::Arc;

use cubeview_common::{SurfaceSize, Viewport};
use cubeview_render::reflect::{
    LinkedInterface, ScalarType, StageReflection, UniformVar, link_stages, reflect_stage,
};
use cubeview_render::{
    AttributeLocation, BufferKind, Capability, DeviceError, DeviceResult, DeviceSource, GpuDevice,
    IndexFormat, IndexedDraw, OptionalFeature, ShaderStage, UniformLocation,
};
use wgpu::util::DeviceExt;
use winit::window::Window;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Acquires a wgpu device presenting to `window`.
pub struct WgpuSource {
    window: Arc<Window>,
}

impl WgpuSource {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }
}

impl DeviceSource for WgpuSource {
    type Device = WgpuDevice;

    fn acquire(self, size: SurfaceSize) -> DeviceResult<WgpuDevice> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(self.window.clone())
            .map_err(|e| DeviceError::new(format!("create surface: {e}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DeviceError::new("no compatible GPU adapter"))?;

        let limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits());
        let descriptor = wgpu::DeviceDescriptor {
            label: Some("cubeview_device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: Default::default(),
        };
        let (device, queue) = pollster::block_on(adapter.request_device(&descriptor, None))
            .map_err(|e| DeviceError::new(format!("request device: {e}")))?;

        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            tracing::error!("uncaptured wgpu error: {e}");
        }));

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| DeviceError::new("surface reports no texture formats"))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let info = adapter.get_info();
        tracing::info!(
            "GPU initialized with {} backend on {}, surface format {:?}",
            info.backend.to_str(),
            info.name,
            format
        );

        Ok(WgpuDevice {
            window: self.window,
            surface,
            device,
            queue,
            config,
            downlevel: adapter.get_downlevel_capabilities().flags,
            viewport: size.full_viewport(),
            depth: None,
            blend: false,
            features: BTreeSet::new(),
            next_id: 0,
            active_program: None,
            enabled_attributes: BTreeSet::new(),
        })
    }
}

pub struct WgpuShader {
    module: wgpu::ShaderModule,
    reflection: StageReflection,
}

pub struct WgpuProgram {
    id: u32,
    pipeline: wgpu::RenderPipeline,
    bind_group: Option<wgpu::BindGroup>,
    uniforms: Vec<(UniformVar, wgpu::Buffer)>,
    /// Attribute location bound to each vertex buffer slot.
    slots: Vec<u32>,
    interface: LinkedInterface,
}

impl WgpuProgram {
    fn slot_of(&self, location: AttributeLocation) -> Option<u32> {
        self.slots
            .iter()
            .position(|l| *l == location.0)
            .map(|slot| slot as u32)
    }
}

pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
}

/// wgpu device, queue and surface behind the [`GpuDevice`] seam.
pub struct WgpuDevice {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    downlevel: wgpu::DownlevelFlags,
    viewport: Viewport,
    depth: Option<wgpu::TextureView>,
    blend: bool,
    features: BTreeSet<OptionalFeature>,
    next_id: u32,
    active_program: Option<u32>,
    enabled_attributes: BTreeSet<AttributeLocation>,
}

impl WgpuDevice {
    /// Runs `f` inside an error scope and reports whatever the scope caught.
    fn scoped<T>(
        &self,
        filter: wgpu::ErrorFilter,
        f: impl FnOnce(&wgpu::Device) -> T,
    ) -> DeviceResult<T> {
        self.device.push_error_scope(filter);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(e) => Err(DeviceError::new(e.to_string())),
            None => Ok(value),
        }
    }

    fn create_depth_texture(&self) -> wgpu::TextureView {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: self.config.width,
                height: self.config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bind_uniforms(
        &self,
        uniforms: &[UniformVar],
    ) -> (
        wgpu::BindGroupLayout,
        Option<wgpu::BindGroup>,
        Vec<(UniformVar, wgpu::Buffer)>,
    ) {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = uniforms
            .iter()
            .map(|u| wgpu::BindGroupLayoutEntry {
                binding: u.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("uniform_bind_group_layout"),
                entries: &entries,
            });

        let buffers: Vec<(UniformVar, wgpu::Buffer)> = uniforms
            .iter()
            .map(|u| {
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(u.name.as_str()),
                    size: u64::from(u.size),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (u.clone(), buffer)
            })
            .collect();

        let bind_group = (!buffers.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupEntry> = buffers
                .iter()
                .map(|(u, buffer)| wgpu::BindGroupEntry {
                    binding: u.binding,
                    resource: buffer.as_entire_binding(),
                })
                .collect();
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform_bind_group"),
                layout: &layout,
                entries: &entries,
            })
        });

        (layout, bind_group, buffers)
    }
}

fn vertex_format(components: u32) -> Option<wgpu::VertexFormat> {
    match components {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::U16 => wgpu::IndexFormat::Uint16,
        IndexFormat::U32 => wgpu::IndexFormat::Uint32,
    }
}

fn clear_color(rgba: [f64; 4]) -> wgpu::Color {
    wgpu::Color {
        r: rgba[0],
        g: rgba[1],
        b: rgba[2],
        a: rgba[3],
    }
}

impl GpuDevice for WgpuDevice {
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Buffer = WgpuBuffer;

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn enable(&mut self, capability: Capability) {
        match capability {
            Capability::DepthTest => {
                if self.depth.is_none() {
                    self.depth = Some(self.create_depth_texture());
                }
            }
            Capability::Blend => self.blend = true,
        }
    }

    fn request_feature(&mut self, feature: OptionalFeature) -> bool {
        let supported = match feature {
            OptionalFeature::WideIndices => self
                .downlevel
                .contains(wgpu::DownlevelFlags::FULL_DRAW_INDEX_UINT32),
            // dpdx/dpdy are core WGSL in fragment shaders.
            OptionalFeature::ShaderDerivatives => true,
        };
        if supported {
            self.features.insert(feature);
        }
        supported
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> DeviceResult<WgpuShader> {
        let reflection = reflect_stage(stage, source).map_err(DeviceError::new)?;
        let module = self.scoped(wgpu::ErrorFilter::Validation, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(stage.label()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;
        Ok(WgpuShader { module, reflection })
    }

    fn link_program(
        &mut self,
        vertex: &WgpuShader,
        fragment: &WgpuShader,
    ) -> DeviceResult<WgpuProgram> {
        let interface = link_stages(&vertex.reflection, &fragment.reflection)
            .map_err(DeviceError::new)?;

        let mut attributes = Vec::with_capacity(interface.attributes.len());
        for input in &interface.attributes {
            let format = vertex_format(input.ty.components)
                .filter(|_| input.ty.scalar == ScalarType::Float)
                .ok_or_else(|| {
                    DeviceError::new(format!(
                        "attribute `{}` must be a 32-bit float scalar or vector",
                        input.name
                    ))
                })?;
            attributes.push(wgpu::VertexAttribute {
                format,
                offset: 0,
                shader_location: input.location,
            });
        }
        let layouts: Vec<wgpu::VertexBufferLayout> = attributes
            .iter()
            .map(|a| wgpu::VertexBufferLayout {
                array_stride: a.format.size(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: std::slice::from_ref(a),
            })
            .collect();

        let (bind_group_layout, bind_group, uniforms) = self.bind_uniforms(&interface.uniforms);
        let blend = Some(if self.blend {
            wgpu::BlendState::ALPHA_BLENDING
        } else {
            wgpu::BlendState::REPLACE
        });
        let depth_stencil = self.depth.as_ref().map(|_| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        });
        let target_format = self.config.format;

        let pipeline = self.scoped(wgpu::ErrorFilter::Validation, |device| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("cube_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("cube_pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(vertex.reflection.entry_point.as_str()),
                    compilation_options: Default::default(),
                    buffers: &layouts,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment.module,
                    entry_point: Some(fragment.reflection.entry_point.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil,
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
        })?;

        let slots = interface.attributes.iter().map(|a| a.location).collect();
        Ok(WgpuProgram {
            id: self.allocate_id(),
            pipeline,
            bind_group,
            uniforms,
            slots,
            interface,
        })
    }

    fn use_program(&mut self, program: &WgpuProgram) {
        self.active_program = Some(program.id);
    }

    fn attribute_location(&self, program: &WgpuProgram, name: &str) -> Option<AttributeLocation> {
        program
            .interface
            .attribute(name)
            .map(|a| AttributeLocation(a.location))
    }

    fn enable_attribute(&mut self, location: AttributeLocation) {
        self.enabled_attributes.insert(location);
    }

    fn uniform_location(&self, program: &WgpuProgram, name: &str) -> Option<UniformLocation> {
        program.interface.uniform(name).map(|u| UniformLocation {
            group: u.group,
            binding: u.binding,
        })
    }

    fn create_static_buffer(
        &mut self,
        kind: BufferKind,
        contents: &[u8],
    ) -> DeviceResult<WgpuBuffer> {
        let (label, usage) = match kind {
            BufferKind::Vertex => ("vertex_buffer", wgpu::BufferUsages::VERTEX),
            BufferKind::Index => ("index_buffer", wgpu::BufferUsages::INDEX),
        };
        let buffer = self.scoped(wgpu::ErrorFilter::OutOfMemory, |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            })
        })?;
        Ok(WgpuBuffer { buffer })
    }

    fn write_uniform_mat4(
        &mut self,
        program: &WgpuProgram,
        location: UniformLocation,
        columns: &[f32; 16],
    ) -> DeviceResult<()> {
        let (uniform, buffer) = program
            .uniforms
            .iter()
            .find(|(u, _)| u.group == location.group && u.binding == location.binding)
            .ok_or_else(|| {
                DeviceError::new(format!(
                    "no uniform at group {} binding {}",
                    location.group, location.binding
                ))
            })?;
        if uniform.size != 64 {
            return Err(DeviceError::new(format!(
                "uniform `{}` is {} bytes, not a mat4x4<f32>",
                uniform.name, uniform.size
            )));
        }
        let bytes = bytemuck::cast_slice(columns);
        self.queue.write_buffer(buffer, 0, bytes);
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        program: &WgpuProgram,
        draw: &IndexedDraw<'_, WgpuBuffer>,
    ) -> DeviceResult<()> {
        if self.active_program != Some(program.id) {
            return Err(DeviceError::new("program is not the active program"));
        }
        let wide = OptionalFeature::WideIndices;
        if draw.index_format == IndexFormat::U32 && !self.features.contains(&wide) {
            return Err(DeviceError::new(format!("{wide} not enabled")));
        }
        let mut bindings = Vec::with_capacity(draw.streams.len());
        for stream in draw.streams {
            if !self.enabled_attributes.contains(&stream.location) {
                return Err(DeviceError::new(format!(
                    "attribute at location {} is not enabled",
                    stream.location.0
                )));
            }
            let slot = program.slot_of(stream.location).ok_or_else(|| {
                DeviceError::new(format!(
                    "program has no attribute at location {}",
                    stream.location.0
                ))
            })?;
            bindings.push((slot, &stream.buffer.buffer));
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::warn!("surface lost or outdated, reconfiguring and skipping frame");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timed out, skipping frame");
                return Ok(());
            }
            Err(e) => return Err(DeviceError::new(format!("surface error: {e}"))),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let color_load = match draw.clear.color {
            Some(rgba) => wgpu::LoadOp::Clear(clear_color(rgba)),
            None => wgpu::LoadOp::Load,
        };
        let depth_attachment = self
            .depth
            .as_ref()
            .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: draw
                        .clear
                        .depth
                        .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

        let viewport = self.viewport;
        self.scoped(wgpu::ErrorFilter::Validation, |device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cube_encoder"),
            });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("cube_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: color_load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: depth_attachment,
                    ..Default::default()
                });
                pass.set_viewport(
                    viewport.x as f32,
                    viewport.y as f32,
                    viewport.width as f32,
                    viewport.height as f32,
                    0.0,
                    1.0,
                );
                pass.set_pipeline(&program.pipeline);
                if let Some(bind_group) = &program.bind_group {
                    pass.set_bind_group(0, bind_group, &[]);
                }
                for (slot, buffer) in &bindings {
                    pass.set_vertex_buffer(*slot, buffer.slice(..));
                }
                pass.set_index_buffer(
                    draw.indices.buffer.slice(..),
                    index_format(draw.index_format),
                );
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        })?;

        self.window.pre_present_notify();
        frame.present();
        Ok(())
    }
}
