//! wgpu backend implementation
//!
//! Runs without a window: the default output surface is an offscreen
//! texture of viewport size that can be read back with
//! [`WgpuBackend::read_output`].

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::postprocess::FULLSCREEN_VERTEX_SHADER;
use crate::resources::{Material, MAX_UNIFORM_SLOTS};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const MIPMAP_SHADER: &str = r#"
@group(0) @binding(0) var src_texture: texture_2d<f32>;
@group(0) @binding(1) var src_sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(src_texture, src_sampler, input.uv);
}
"#;

struct GpuTexture {
    texture: wgpu::Texture,
    /// All mip levels, used for sampling
    view: wgpu::TextureView,
    /// Level 0 only, used as a render attachment
    attachment_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    desc: TextureDescriptor,
}

struct CompiledShader {
    label: String,
    module: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    slot_count: usize,
    /// Pipelines keyed by color and depth target formats
    pipelines: HashMap<(Vec<wgpu::TextureFormat>, Option<wgpu::TextureFormat>), wgpu::RenderPipeline>,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,

    width: u32,
    height: u32,
    output: wgpu::Texture,
    output_view: wgpu::TextureView,

    // Resource storage
    textures: HashMap<u64, GpuTexture>,
    framebuffers: HashMap<u64, Vec<(AttachmentPoint, TextureHandle)>>,
    shaders: HashMap<u64, CompiledShader>,
    bound_framebuffer: Option<FramebufferHandle>,

    fallback_view: wgpu::TextureView,
    fallback_sampler: wgpu::Sampler,
    mipmap_module: wgpu::ShaderModule,
    mipmap_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,

    next_texture_id: u64,
    next_framebuffer_id: u64,
    next_shader_id: u64,
}

impl WgpuBackend {
    /// Create a backend with an offscreen output surface of the given size
    pub fn new_headless(width: u32, height: u32) -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async(width, height))
    }

    pub async fn new_headless_async(width: u32, height: u32) -> BackendResult<Self> {
        if width == 0 || height == 0 {
            return Err(BackendError::InitializationFailed(format!(
                "invalid output size {}x{}",
                width, height
            )));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        // 32-bit float targets are only filterable with this feature
        let optional_features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;
        if optional_features.is_empty() {
            log::warn!("Adapter cannot filter 32-bit float textures");
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Compositor Device"),
                    required_features: optional_features,
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let (output, output_view) = Self::create_output(&device, width, height);

        let fallback = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("Fallback Texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[0, 0, 0, 255],
        );
        let fallback_view = fallback.create_view(&wgpu::TextureViewDescriptor::default());
        let fallback_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Fallback Sampler"),
            ..Default::default()
        });

        let mipmap_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mipmap Shader"),
            source: wgpu::ShaderSource::Wgsl(
                format!("{}\n{}", FULLSCREEN_VERTEX_SHADER, MIPMAP_SHADER).into(),
            ),
        });

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            width,
            height,
            output,
            output_view,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            bound_framebuffer: None,
            fallback_view,
            fallback_sampler,
            mipmap_module,
            mipmap_pipelines: HashMap::new(),
            next_texture_id: 1,
            next_framebuffer_id: 1,
            next_shader_id: 1,
        })
    }

    fn create_output(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
        let output = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Output Surface"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = output.create_view(&wgpu::TextureViewDescriptor::default());
        (output, view)
    }

    /// Resize the default output surface. Its previous content is lost.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::warn!("Ignoring resize to {}x{}", width, height);
            return;
        }
        self.output.destroy();
        let (output, view) = Self::create_output(&self.device, width, height);
        self.output = output;
        self.output_view = view;
        self.width = width;
        self.height = height;
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Read the default output surface back as tightly packed RGBA8 rows
    pub fn read_output(&self) -> BackendResult<Vec<u8>> {
        self.read_back(&self.output, self.width, self.height, 4)
    }

    /// Read mip level 0 of an 8-bit RGBA texture back as tightly packed rows
    pub fn read_texture(&self, texture: TextureHandle) -> BackendResult<Vec<u8>> {
        let gpu = self.texture(texture)?;
        if gpu.desc.format.bytes_per_pixel() != 4 || gpu.desc.format.is_depth() {
            return Err(BackendError::DrawFailed(format!(
                "cannot read back {:?} textures",
                gpu.desc.format
            )));
        }
        self.read_back(&gpu.texture, gpu.desc.width, gpu.desc.height, 4)
    }

    fn read_back(
        &self,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
    ) -> BackendResult<Vec<u8>> {
        let unpadded = width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| BackendError::DeviceLost)?
            .map_err(|e| BackendError::DrawFailed(e.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();
        Ok(pixels)
    }

    fn texture(&self, handle: TextureHandle) -> BackendResult<&GpuTexture> {
        lookup_texture(&self.textures, handle)
    }

    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
            TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: WrapMode) -> wgpu::AddressMode {
        match mode {
            WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }

    /// Prepend the vertex stage and the binding prelude to a fragment source
    fn build_shader_source(desc: &ShaderDescriptor) -> BackendResult<String> {
        if desc.uniforms.len() > MAX_UNIFORM_SLOTS {
            return Err(BackendError::ShaderCreationFailed(format!(
                "'{}' declares {} uniforms, at most {} are supported",
                desc.label,
                desc.uniforms.len(),
                MAX_UNIFORM_SLOTS
            )));
        }
        for name in desc.texture_slots.iter().chain(desc.uniforms.iter()) {
            if !is_identifier(name) {
                return Err(BackendError::ShaderCreationFailed(format!(
                    "'{}' is not a valid binding name in '{}'",
                    name, desc.label
                )));
            }
        }

        let mut source = String::from(FULLSCREEN_VERTEX_SHADER);
        source.push_str(&format!(
            "\nstruct Params {{\n    resolution: vec4<f32>,\n    values: array<vec4<f32>, {}>,\n}}\n\n\
             @group(0) @binding(0) var<uniform> params: Params;\n",
            MAX_UNIFORM_SLOTS
        ));
        for (index, slot) in desc.texture_slots.iter().enumerate() {
            let binding = 1 + index * 2;
            source.push_str(&format!(
                "@group(0) @binding({}) var tex_{slot}: texture_2d<f32>;\n\
                 @group(0) @binding({}) var samp_{slot}: sampler;\n\
                 fn sample_{slot}(uv: vec2<f32>) -> vec4<f32> {{\n    return textureSample(tex_{slot}, samp_{slot}, uv);\n}}\n",
                binding,
                binding + 1,
                slot = slot
            ));
        }
        for (index, name) in desc.uniforms.iter().enumerate() {
            source.push_str(&format!(
                "fn u_{}() -> vec4<f32> {{\n    return params.values[{}];\n}}\n",
                name, index
            ));
        }
        source.push('\n');
        source.push_str(&desc.source);
        Ok(source)
    }

    fn validate_wgsl(label: &str, source: &str) -> BackendResult<()> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| {
            BackendError::ShaderCreationFailed(format!("{}: {}", label, e.emit_to_string(source)))
        })?;
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| BackendError::ShaderCreationFailed(format!("{}: {:?}", label, e)))?;
        Ok(())
    }

    fn mipmap_pipeline(&mut self, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        let device = &self.device;
        let module = &self.mipmap_module;
        self.mipmap_pipelines.entry(format).or_insert_with(|| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Mipmap Pipeline"),
                layout: None,
                vertex: wgpu::VertexState {
                    module,
                    entry_point: "vs_main",
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: "fs_main",
                    targets: &[Some(format.into())],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })
    }
}

fn lookup_texture(
    textures: &HashMap<u64, GpuTexture>,
    handle: TextureHandle,
) -> BackendResult<&GpuTexture> {
    textures.get(&handle.0).ok_or(BackendError::InvalidHandle {
        kind: "texture",
        id: handle.0,
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn create_pipeline(
    device: &wgpu::Device,
    shader: &CompiledShader,
    colors: &[wgpu::TextureFormat],
    depth: Option<wgpu::TextureFormat>,
) -> wgpu::RenderPipeline {
    let targets: Vec<Option<wgpu::ColorTargetState>> = colors
        .iter()
        .map(|format| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&shader.label),
        layout: Some(&shader.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader.module,
            entry_point: "vs_main",
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader.module,
            entry_point: "fs_main",
            targets: &targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: depth.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

impl Renderer for WgpuBackend {
    fn viewport_width(&self) -> u32 {
        self.width
    }

    fn viewport_height(&self) -> u32 {
        self.height
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(BackendError::TextureCreationFailed(format!(
                "invalid size {}x{}",
                desc.width, desc.height
            )));
        }

        let mip_level_count = desc.mip_levels.clamp(1, full_mip_chain(desc.width, desc.height));
        let format = Self::convert_texture_format(desc.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let attachment_view = texture.create_view(&wgpu::TextureViewDescriptor {
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        });
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: Self::convert_address_mode(desc.wrap_s),
            address_mode_v: Self::convert_address_mode(desc.wrap_t),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: Self::convert_filter_mode(desc.mag_filter),
            min_filter: Self::convert_filter_mode(desc.min_filter),
            mipmap_filter: if mip_level_count > 1 {
                wgpu::FilterMode::Linear
            } else {
                wgpu::FilterMode::Nearest
            },
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        let mut desc = desc.clone();
        desc.mip_levels = mip_level_count;
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                attachment_view,
                sampler,
                desc,
            },
        );
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture.0) {
            Some(gpu) => gpu.texture.destroy(),
            None => log::warn!("Destroying unknown texture {}", texture.0),
        }
    }

    fn clear_texture(&mut self, texture: TextureHandle, color: [f32; 4]) -> BackendResult<()> {
        let gpu = self.texture(texture)?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear Encoder"),
            });
        {
            let (color_attachments, depth_stencil_attachment) = if gpu.desc.format.is_depth() {
                let stencil_ops = (gpu.desc.format == TextureFormat::Depth24PlusStencil8).then_some(
                    wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    },
                );
                (
                    vec![],
                    Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &gpu.attachment_view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(color[0]),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops,
                    }),
                )
            } else {
                (
                    vec![Some(wgpu::RenderPassColorAttachment {
                        view: &gpu.attachment_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color {
                                r: color[0] as f64,
                                g: color[1] as f64,
                                b: color[2] as f64,
                                a: color[3] as f64,
                            }),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    None,
                )
            };
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) -> BackendResult<()> {
        let (mip_levels, format) = {
            let gpu = self.texture(texture)?;
            (gpu.desc.mip_levels, gpu.desc.format)
        };
        if mip_levels <= 1 {
            return Ok(());
        }
        if format.is_depth() {
            return Err(BackendError::DrawFailed(
                "cannot generate mipmaps for depth textures".into(),
            ));
        }

        let wgpu_format = Self::convert_texture_format(format);
        self.mipmap_pipeline(wgpu_format);
        let pipeline = &self.mipmap_pipelines[&wgpu_format];
        let layout = pipeline.get_bind_group_layout(0);
        let gpu = self.texture(texture)?;

        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mipmap Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let views: Vec<wgpu::TextureView> = (0..mip_levels)
            .map(|level| {
                gpu.texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Mip View"),
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mipmap Encoder"),
            });
        for level in 1..mip_levels as usize {
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Mipmap Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&views[level - 1]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            });
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mipmap Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &views[level],
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn create_framebuffer(&mut self) -> BackendResult<FramebufferHandle> {
        let id = self.next_framebuffer_id;
        self.next_framebuffer_id += 1;
        self.framebuffers.insert(id, Vec::new());
        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.framebuffers.remove(&framebuffer.0).is_none() {
            log::warn!("Destroying unknown framebuffer {}", framebuffer.0);
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: TextureHandle,
        attachment: AttachmentPoint,
    ) -> BackendResult<()> {
        let format = self.texture(texture)?.desc.format;
        if format.is_depth() != (attachment == AttachmentPoint::Depth) {
            return Err(BackendError::FramebufferCreationFailed(format!(
                "{:?} texture cannot be attached to {}",
                format, attachment
            )));
        }
        let attachments =
            self.framebuffers
                .get_mut(&framebuffer.0)
                .ok_or(BackendError::InvalidHandle {
                    kind: "framebuffer",
                    id: framebuffer.0,
                })?;
        attachments.retain(|(point, _)| *point != attachment);
        attachments.push((attachment, texture));
        Ok(())
    }

    fn detach_all(&mut self, framebuffer: FramebufferHandle) {
        if let Some(attachments) = self.framebuffers.get_mut(&framebuffer.0) {
            attachments.clear();
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.bound_framebuffer = Some(framebuffer);
    }

    fn unbind_framebuffer(&mut self) {
        self.bound_framebuffer = None;
    }

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<ShaderHandle> {
        let source = Self::build_shader_source(desc)?;
        Self::validate_wgsl(&desc.label, &source)?;

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for index in 0..desc.texture_slots.len() as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + index * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 + index * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&desc.label),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let id = self.next_shader_id;
        self.next_shader_id += 1;
        self.shaders.insert(
            id,
            CompiledShader {
                label: desc.label.clone(),
                module,
                layout,
                pipeline_layout,
                slot_count: desc.texture_slots.len(),
                pipelines: HashMap::new(),
            },
        );
        log::debug!("Compiled shader '{}' as {}", desc.label, id);
        Ok(ShaderHandle(id))
    }

    fn render_fullscreen_quad(
        &mut self,
        material: &Material,
        target: Option<FramebufferHandle>,
    ) -> BackendResult<()> {
        // Resolve target views and formats
        let mut colors: Vec<(u8, &wgpu::TextureView, wgpu::TextureFormat)> = Vec::new();
        let mut depth: Option<(&wgpu::TextureView, wgpu::TextureFormat)> = None;
        let (width, height) = match target {
            Some(framebuffer) => {
                let attachments =
                    self.framebuffers
                        .get(&framebuffer.0)
                        .ok_or(BackendError::InvalidHandle {
                            kind: "framebuffer",
                            id: framebuffer.0,
                        })?;
                let mut size = None;
                for (point, handle) in attachments {
                    let gpu = lookup_texture(&self.textures, *handle)?;
                    let format = Self::convert_texture_format(gpu.desc.format);
                    match point {
                        AttachmentPoint::Color(index) => {
                            colors.push((*index, &gpu.attachment_view, format))
                        }
                        AttachmentPoint::Depth => depth = Some((&gpu.attachment_view, format)),
                    }
                    size.get_or_insert((gpu.desc.width, gpu.desc.height));
                }
                size.ok_or_else(|| {
                    BackendError::DrawFailed(format!(
                        "framebuffer {} has no attachments",
                        framebuffer.0
                    ))
                })?
            }
            None => {
                colors.push((0, &self.output_view, OUTPUT_FORMAT));
                (self.width, self.height)
            }
        };
        if colors.is_empty() {
            return Err(BackendError::DrawFailed(
                "fullscreen draw needs a color attachment".into(),
            ));
        }
        colors.sort_by_key(|(index, _, _)| *index);

        let shader = self
            .shaders
            .get_mut(&material.shader().0)
            .ok_or(BackendError::InvalidHandle {
                kind: "shader",
                id: material.shader().0,
            })?;
        if shader.slot_count != material.texture_slots().len() {
            return Err(BackendError::DrawFailed(format!(
                "material '{}' does not match shader '{}'",
                material.name, shader.label
            )));
        }
        let key = (
            colors.iter().map(|(_, _, format)| *format).collect::<Vec<_>>(),
            depth.map(|(_, format)| format),
        );
        if !shader.pipelines.contains_key(&key) {
            let pipeline = create_pipeline(&self.device, shader, &key.0, key.1);
            shader.pipelines.insert(key.clone(), pipeline);
        }
        let shader = &self.shaders[&material.shader().0];
        let pipeline = &shader.pipelines[&key];

        let uniforms = material.uniform_data(width, height);
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Material Uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }];
        for (index, (slot, handle)) in material.bound_textures().enumerate() {
            let (view, sampler) = match handle {
                Some(handle) => {
                    let gpu = self.texture(handle)?;
                    if gpu.desc.format.is_depth() {
                        return Err(BackendError::DrawFailed(format!(
                            "slot '{}' cannot sample a depth texture",
                            slot
                        )));
                    }
                    (&gpu.view, &gpu.sampler)
                }
                None => (&self.fallback_view, &self.fallback_sampler),
            };
            let binding = 1 + index as u32 * 2;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&material.name),
            layout: &shader.layout,
            entries: &entries,
        });

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = colors
            .iter()
            .map(|(_, view, _)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&material.name),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&material.name),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth.map(|(view, _)| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::postprocess::register_builtin_shaders;
    use crate::pipeline::postprocess::shaders;
    use crate::resources::ShaderLibrary;

    #[test]
    fn test_shader_prelude_declares_helpers() {
        let desc = ShaderDescriptor::new("test", "// body")
            .with_texture("texture")
            .with_texture("bloom")
            .with_uniform("intensity");
        let source = WgpuBackend::build_shader_source(&desc).unwrap();

        assert!(source.contains("fn sample_texture(uv: vec2<f32>)"));
        assert!(source.contains("@group(0) @binding(3) var tex_bloom"));
        assert!(source.contains("@group(0) @binding(4) var samp_bloom"));
        assert!(source.contains("fn u_intensity() -> vec4<f32>"));
        assert!(source.ends_with("// body"));
    }

    #[test]
    fn test_invalid_binding_names_are_rejected() {
        let desc = ShaderDescriptor::new("test", "").with_texture("2d map");
        assert!(matches!(
            WgpuBackend::build_shader_source(&desc),
            Err(BackendError::ShaderCreationFailed(_))
        ));
    }

    #[test]
    fn test_builtin_shaders_validate() {
        for (name, desc) in crate::pipeline::postprocess::builtin_shaders() {
            let source = WgpuBackend::build_shader_source(&desc).unwrap();
            if let Err(e) = WgpuBackend::validate_wgsl(name, &source) {
                panic!("{}", e);
            }
        }
    }

    #[test]
    fn test_broken_shader_fails_validation() {
        let desc = ShaderDescriptor::new("broken", "@fragment fn fs_main() -> f32 {")
            .with_texture("texture");
        let source = WgpuBackend::build_shader_source(&desc).unwrap();
        assert!(WgpuBackend::validate_wgsl("broken", &source).is_err());
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_copy_into_output_surface() {
        let mut backend = WgpuBackend::new_headless(4, 4).unwrap();
        let mut library = ShaderLibrary::new();
        register_builtin_shaders(&mut library, &mut backend).unwrap();

        let source = backend
            .create_texture(&TextureDescriptor::new(4, 4, TextureFormat::Rgba8Unorm))
            .unwrap();
        backend.clear_texture(source, [1.0, 0.0, 0.0, 1.0]).unwrap();

        let mut material = library.material("copy", shaders::COPY).unwrap();
        material.set_texture("texture", source);
        backend.render_fullscreen_quad(&material, None).unwrap();

        let pixels = backend.read_output().unwrap();
        assert_eq!(pixels.len(), 4 * 4 * 4);
        assert_eq!(&pixels[..4], &[255, 0, 0, 255]);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_mipmaps_on_full_chain() {
        let mut backend = WgpuBackend::new_headless(4, 4).unwrap();
        let texture = backend
            .create_texture(&TextureDescriptor::new(8, 8, TextureFormat::Rgba8Unorm).with_mipmaps())
            .unwrap();
        backend.clear_texture(texture, [0.0, 1.0, 0.0, 1.0]).unwrap();
        backend.generate_mipmaps(texture).unwrap();
        backend.destroy_texture(texture);
    }
}
