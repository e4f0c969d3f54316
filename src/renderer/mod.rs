use std::{iter, sync::Arc};

use glam::Mat4;
use log::warn;
use wgpu::{
    Color, CommandEncoderDescriptor, Device, Extent3d, LoadOp, Operations, Queue,
    RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    RenderPipeline, StoreOp, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
    TextureView, TextureViewDescriptor,
};

use crate::{asset::SceneSource, error::RenderError};

pub mod binding;
pub mod format;
pub mod pipeline;
pub mod uniform;
pub mod upload;

use binding::{ConstantBindings, FrameBindings, NodeBindings};
use pipeline::{plan_primitive, Pipelines, PipelinesDescriptor, PrimitivePlan, ShaderContract};
use uniform::camera::CameraState;
use upload::{upload_views, ViewBuffers};

pub const STATIC_SHADER: &str = include_str!("../shader/scene.wgsl");
pub const SKINNED_SHADER: &str = include_str!("../shader/scene_skin.wgsl");

/// Daytime sky blue, the backdrop for scenes without their own environment.
pub const CLEAR_COLOR: Color = Color {
    r: 0.53,
    g: 0.81,
    b: 0.92,
    a: 1.0,
};

pub const DEPTH_TEXTURE_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Depth attachment shared by every renderer drawing to the same canvas. The
/// host owns it and recreates it when the canvas size changes.
pub struct DepthTexture {
    texture_view: TextureView,
}

impl DepthTexture {
    pub fn new(device: &Device, (width, height): (u32, u32)) -> Self {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("Scene Depth Texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: DEPTH_TEXTURE_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self {
            texture_view: texture.create_view(&TextureViewDescriptor::default()),
        }
    }

    pub fn texture_view(&self) -> &TextureView {
        &self.texture_view
    }
}

/// Color load policy of the scene pass, fixed at construction: the first
/// renderer of a composition clears to the sky color, layered co-renderers
/// draw over whatever an earlier pass left in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassLoad {
    #[default]
    Clear,
    Load,
}

pub struct RendererDescriptor<'a> {
    pub shader_source: &'a str,
    pub contract: ShaderContract,
    pub color_format: TextureFormat,
    pub size: (u32, u32),
    pub load: PassLoad,
}

impl RendererDescriptor<'_> {
    /// Picks the built-in shader matching the asset: the skinned variant when
    /// a skin is present, the static variant otherwise.
    pub fn with_builtin_shader(
        source: &SceneSource,
        color_format: TextureFormat,
        size: (u32, u32),
    ) -> Self {
        if source.document().skins().next().is_some() {
            Self {
                shader_source: SKINNED_SHADER,
                contract: ShaderContract::skinned(),
                color_format,
                size,
                load: PassLoad::Clear,
            }
        } else {
            Self {
                shader_source: STATIC_SHADER,
                contract: ShaderContract::static_mesh(),
                color_format,
                size,
                load: PassLoad::Clear,
            }
        }
    }
}

struct MeshPrimitive {
    pipeline: Arc<RenderPipeline>,
    plan: PrimitivePlan,
}

struct DrawNode {
    node: usize,
    primitives: Vec<MeshPrimitive>,
}

pub struct Renderer {
    views: ViewBuffers,
    constant: ConstantBindings,
    frame: FrameBindings,
    nodes: NodeBindings,
    draw_list: Vec<DrawNode>,
    size: (u32, u32),
    load: PassLoad,
}

impl Renderer {
    pub fn new(
        device: &Device,
        source: &SceneSource,
        descriptor: RendererDescriptor,
    ) -> Result<Self, RenderError> {
        let views = upload_views(device, source)?;
        let constant = ConstantBindings::new(device, source)?;
        let frame = FrameBindings::new(device, source);
        let nodes = NodeBindings::new(device, source);
        let mut pipelines = Pipelines::new(
            device,
            &PipelinesDescriptor {
                shader_source: descriptor.shader_source,
                contract: descriptor.contract,
                color_format: descriptor.color_format,
                depth_format: DEPTH_TEXTURE_FORMAT,
                bind_group_layouts: [constant.layout(), frame.layout(), nodes.layout()],
            },
        );

        let mut draw_list = Vec::new();
        for node in source.document().nodes() {
            let mesh = match node.mesh() {
                Some(mesh) => mesh,
                None => continue,
            };
            let mut primitives = Vec::new();
            for primitive in mesh.primitives() {
                let plan = plan_primitive(pipelines.contract(), &primitive)?;
                if plan.draw_count == 0 {
                    warn!(
                        "Primitive {} of mesh {} has nothing to draw, skipping",
                        primitive.index(),
                        mesh.index()
                    );
                    continue;
                }
                let pipeline = pipelines.get(device, &plan);
                primitives.push(MeshPrimitive { pipeline, plan });
            }
            if !primitives.is_empty() {
                draw_list.push(DrawNode {
                    node: node.index(),
                    primitives,
                });
            }
        }

        Ok(Self {
            views,
            constant,
            frame,
            nodes,
            draw_list,
            size: descriptor.size,
            load: descriptor.load,
        })
    }

    pub fn update_camera(&mut self, queue: &Queue, state: &CameraState) {
        self.frame.camera.update(queue, state);
    }

    /// Replaces the per-instance world transforms. The list length is fixed
    /// at construction.
    pub fn set_instance_transforms(&self, queue: &Queue, transforms: &[Mat4]) {
        self.frame.instances.set(queue, transforms);
    }

    /// Rewrites one instance's joint pose with world-space joint matrices.
    /// Returns false for unskinned assets.
    pub fn set_joint_transforms(&self, queue: &Queue, instance: usize, joints: &[Mat4]) -> bool {
        if self.frame.joints.joint_count() == 0 {
            warn!("Joint transforms pushed to an unskinned scene");
            return false;
        }
        self.frame.joints.write_instance(queue, instance, joints);
        true
    }

    /// Overrides one mesh node's world transform. Returns false for nodes
    /// that carry no mesh.
    pub fn set_node_transform(&self, queue: &Queue, node: usize, matrix: &Mat4) -> bool {
        self.nodes.set_transform(queue, node, matrix)
    }

    pub fn resize(&mut self, size: (u32, u32)) {
        self.size = size;
    }

    /// Records and submits one frame: constant and frame tiers bound once up
    /// front, the node tier swapped per mesh node, every draw instanced over
    /// the shared instance list.
    pub fn render(
        &self,
        device: &Device,
        queue: &Queue,
        color_view: &TextureView,
        depth_view: &TextureView,
    ) {
        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: Operations {
                        load: match self.load {
                            PassLoad::Clear => LoadOp::Clear(CLEAR_COLOR),
                            PassLoad::Load => LoadOp::Load,
                        },
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            render_pass.set_bind_group(0, self.constant.bind_group(), &[]);
            render_pass.set_bind_group(1, self.frame.bind_group(), &[]);
            let instance_count = self.frame.instances.instance_count() as u32;

            for draw in &self.draw_list {
                let bind_group = match self.nodes.bind_group(draw.node) {
                    Some(bind_group) => bind_group,
                    None => continue,
                };
                render_pass.set_bind_group(2, bind_group, &[]);
                for mesh in &draw.primitives {
                    render_pass.set_pipeline(&mesh.pipeline);
                    for (slot, binding) in mesh.plan.slots.iter().enumerate() {
                        render_pass.set_vertex_buffer(
                            slot as u32,
                            self.views.get(binding.view).slice(binding.offset..),
                        );
                    }
                    match &mesh.plan.index {
                        Some(index) => {
                            render_pass.set_index_buffer(
                                self.views.get(index.view).slice(index.offset..),
                                index.format,
                            );
                            render_pass.draw_indexed(0..mesh.plan.draw_count, 0, 0..instance_count);
                        }
                        None => {
                            render_pass.draw(0..mesh.plan.draw_count, 0..instance_count);
                        }
                    }
                }
            }

            let (width, height) = self.size;
            render_pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            render_pass.set_scissor_rect(0, 0, width, height);
        }
        queue.submit(iter::once(encoder.finish()));
    }
}
