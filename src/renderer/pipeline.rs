use std::{collections::HashMap, sync::Arc};

use gltf::{mesh::Primitive, Semantic};
use log::warn;
use wgpu::{
    BindGroupLayout, BlendState, ColorTargetState, ColorWrites, CompareFunction, DepthBiasState,
    DepthStencilState, Device, Face, FragmentState, FrontFace, IndexFormat, MultisampleState,
    PipelineLayout, PipelineLayoutDescriptor, PolygonMode, PrimitiveState, PrimitiveTopology,
    RenderPipeline, RenderPipelineDescriptor, ShaderModule, ShaderModuleDescriptor, ShaderSource,
    StencilState, TextureFormat, VertexAttribute, VertexBufferLayout, VertexFormat,
    VertexState, VertexStepMode,
};

use super::format::{index_format, packed_stride, primitive_topology, vertex_format};
use crate::error::RenderError;

/// Maps one shader vertex input to an asset attribute semantic.
#[derive(Debug, Clone)]
pub struct AttributeSlot {
    pub semantic: Semantic,
    pub location: u32,
}

/// The shader's side of the vertex contract: entry point names plus the
/// attribute slots the vertex stage consumes, in bind order.
#[derive(Debug, Clone)]
pub struct ShaderContract {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub attributes: Vec<AttributeSlot>,
}

impl ShaderContract {
    /// Contract of the built-in static-mesh shader.
    pub fn static_mesh() -> Self {
        Self {
            vertex_entry: "vertexMain".to_string(),
            fragment_entry: "fragmentMain".to_string(),
            attributes: vec![
                AttributeSlot {
                    semantic: Semantic::Positions,
                    location: 0,
                },
                AttributeSlot {
                    semantic: Semantic::Normals,
                    location: 1,
                },
            ],
        }
    }

    /// Contract of the built-in skinned shader.
    pub fn skinned() -> Self {
        let mut contract = Self::static_mesh();
        contract.attributes.push(AttributeSlot {
            semantic: Semantic::Joints(0),
            location: 2,
        });
        contract.attributes.push(AttributeSlot {
            semantic: Semantic::Weights(0),
            location: 3,
        });
        contract
    }
}

/// One vertex-buffer binding of a primitive: which view buffer to bind, at
/// what byte offset, and the layout the pipeline expects in that slot. Each
/// attribute occupies its own buffer binding, so the layout offset is always
/// zero and the accessor's byte offset becomes the draw-time buffer offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexSlot {
    pub view: usize,
    pub offset: u64,
    pub stride: u64,
    pub format: VertexFormat,
    pub location: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSlot {
    pub view: usize,
    pub offset: u64,
    pub format: IndexFormat,
    pub count: u32,
}

/// Device-independent description of one primitive's draw state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitivePlan {
    pub slots: Vec<VertexSlot>,
    pub index: Option<IndexSlot>,
    pub draw_count: u32,
    pub topology: PrimitiveTopology,
}

/// Matches a primitive's attributes against the shader contract. Missing
/// attributes leave their shader location unbound; the draw count comes from
/// the last matched attribute, overridden by the index accessor if present.
pub(crate) fn plan_primitive(
    contract: &ShaderContract,
    primitive: &Primitive,
) -> Result<PrimitivePlan, RenderError> {
    let topology = primitive_topology(primitive.mode())?;
    let mut slots = Vec::new();
    let mut draw_count = 0;
    for slot in &contract.attributes {
        let accessor = primitive
            .attributes()
            .find(|(semantic, _)| *semantic == slot.semantic)
            .map(|(_, accessor)| accessor);
        let accessor = match accessor {
            Some(accessor) => accessor,
            None => {
                warn!(
                    "Primitive has no {:?} attribute, shader location {} left unbound",
                    slot.semantic, slot.location
                );
                continue;
            }
        };
        let view = match accessor.view() {
            Some(view) => view,
            None => {
                warn!(
                    "Sparse accessor for {:?} is not supported, skipping",
                    slot.semantic
                );
                continue;
            }
        };
        let format = vertex_format(
            accessor.data_type(),
            accessor.dimensions(),
            accessor.normalized(),
        )?;
        let stride = match view.stride() {
            Some(stride) => stride as u64,
            None => packed_stride(accessor.data_type(), accessor.dimensions())? as u64,
        };
        slots.push(VertexSlot {
            view: view.index(),
            offset: accessor.offset() as u64,
            stride,
            format,
            location: slot.location,
        });
        draw_count = accessor.count() as u32;
    }

    let index = primitive.indices().and_then(|accessor| {
        let view = match accessor.view() {
            Some(view) => view,
            None => {
                warn!("Index accessor without a buffer view, drawing non-indexed");
                return None;
            }
        };
        Some(IndexSlot {
            view: view.index(),
            offset: accessor.offset() as u64,
            format: index_format(accessor.data_type()),
            count: accessor.count() as u32,
        })
    });
    if let Some(index) = &index {
        draw_count = index.count;
    }

    Ok(PrimitivePlan {
        slots,
        index,
        draw_count,
        topology,
    })
}

fn strip_index_format(plan: &PrimitivePlan) -> Option<IndexFormat> {
    if matches!(
        plan.topology,
        PrimitiveTopology::LineStrip | PrimitiveTopology::TriangleStrip
    ) {
        plan.index.as_ref().map(|index| index.format)
    } else {
        None
    }
}

/// Structural cache key: two primitives with the same per-slot layout shape,
/// topology and strip index format share one compiled pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    slots: Vec<(u32, VertexFormat, u64)>,
    topology: PrimitiveTopology,
    strip_index: Option<IndexFormat>,
}

impl PipelineKey {
    fn new(plan: &PrimitivePlan) -> Self {
        Self {
            slots: plan
                .slots
                .iter()
                .map(|slot| (slot.location, slot.format, slot.stride))
                .collect(),
            topology: plan.topology,
            strip_index: strip_index_format(plan),
        }
    }
}

pub struct PipelinesDescriptor<'a> {
    pub shader_source: &'a str,
    pub contract: ShaderContract,
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
    /// Constant, frame and node layouts, in bind slot order.
    pub bind_group_layouts: [&'a BindGroupLayout; 3],
}

pub struct Pipelines {
    shader_module: ShaderModule,
    layout: PipelineLayout,
    contract: ShaderContract,
    color_format: TextureFormat,
    depth_format: TextureFormat,
    items: HashMap<PipelineKey, Arc<RenderPipeline>>,
}

impl Pipelines {
    pub fn new(device: &Device, descriptor: &PipelinesDescriptor) -> Self {
        let shader_module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: ShaderSource::Wgsl(descriptor.shader_source.into()),
        });
        let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &descriptor.bind_group_layouts,
            push_constant_ranges: &[],
        });
        Self {
            shader_module,
            layout,
            contract: descriptor.contract.clone(),
            color_format: descriptor.color_format,
            depth_format: descriptor.depth_format,
            items: HashMap::new(),
        }
    }

    pub fn contract(&self) -> &ShaderContract {
        &self.contract
    }

    /// Returns the pipeline for a primitive's layout shape, compiling it on
    /// first use.
    pub fn get(&mut self, device: &Device, plan: &PrimitivePlan) -> Arc<RenderPipeline> {
        let key = PipelineKey::new(plan);
        if let Some(item) = self.items.get(&key) {
            return item.clone();
        }
        let item = Arc::new(self.build(device, plan));
        self.items.insert(key, item.clone());
        item
    }

    fn build(&self, device: &Device, plan: &PrimitivePlan) -> RenderPipeline {
        let attributes: Vec<[VertexAttribute; 1]> = plan
            .slots
            .iter()
            .map(|slot| {
                [VertexAttribute {
                    format: slot.format,
                    offset: 0,
                    shader_location: slot.location,
                }]
            })
            .collect();
        let buffers: Vec<VertexBufferLayout> = plan
            .slots
            .iter()
            .zip(&attributes)
            .map(|(slot, attributes)| VertexBufferLayout {
                array_stride: slot.stride,
                step_mode: VertexStepMode::Vertex,
                attributes,
            })
            .collect();
        device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&self.layout),
            vertex: VertexState {
                module: &self.shader_module,
                entry_point: &self.contract.vertex_entry,
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(FragmentState {
                module: &self.shader_module,
                entry_point: &self.contract.fragment_entry,
                compilation_options: Default::default(),
                targets: &[Some(ColorTargetState {
                    format: self.color_format,
                    blend: Some(BlendState::REPLACE),
                    write_mask: ColorWrites::all(),
                })],
            }),
            primitive: PrimitiveState {
                topology: plan.topology,
                strip_index_format: strip_index_format(plan),
                front_face: FrontFace::Ccw,
                cull_mode: Some(Face::Back),
                polygon_mode: PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(DepthStencilState {
                format: self.depth_format,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
                stencil: StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        })
    }
}

#[cfg(test)]
mod test {
    use wgpu::{IndexFormat, PrimitiveTopology, VertexFormat};

    use super::{plan_primitive, PipelineKey, ShaderContract};
    use crate::{asset::document_from_json, error::RenderError};

    const TWO_PRIMITIVE_JSON: &str = r#"{
        "asset": {"version": "2.0"},
        "buffers": [{"byteLength": 128}],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 72},
            {"buffer": 0, "byteOffset": 72, "byteLength": 6}
        ],
        "accessors": [
            {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
             "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 1.0]},
            {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"},
            {"bufferView": 0, "byteOffset": 36, "componentType": 5126, "count": 3, "type": "VEC3",
             "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 1.0]}
        ],
        "meshes": [{"primitives": [
            {"attributes": {"POSITION": 0}, "indices": 1},
            {"attributes": {"POSITION": 2}}
        ]}]
    }"#;

    #[test]
    fn indexed_and_non_indexed_draws() {
        let document = document_from_json(TWO_PRIMITIVE_JSON);
        let contract = ShaderContract::static_mesh();
        let mesh = document.meshes().next().unwrap();
        let plans: Vec<_> = mesh
            .primitives()
            .map(|primitive| plan_primitive(&contract, &primitive).unwrap())
            .collect();

        let indexed = &plans[0];
        assert_eq!(indexed.topology, PrimitiveTopology::TriangleList);
        assert_eq!(indexed.slots.len(), 1);
        assert_eq!(indexed.slots[0].location, 0);
        assert_eq!(indexed.slots[0].format, VertexFormat::Float32x3);
        assert_eq!(indexed.slots[0].stride, 12);
        assert_eq!(indexed.slots[0].offset, 0);
        let index = indexed.index.as_ref().unwrap();
        assert_eq!(index.format, IndexFormat::Uint16);
        assert_eq!(index.count, 3);
        assert_eq!(indexed.draw_count, 3);

        let plain = &plans[1];
        assert!(plain.index.is_none());
        assert_eq!(plain.draw_count, 3);
        // The second primitive aliases the same view at a byte offset.
        assert_eq!(plain.slots[0].view, 0);
        assert_eq!(plain.slots[0].offset, 36);
    }

    #[test]
    fn structurally_identical_primitives_share_a_key() {
        let document = document_from_json(TWO_PRIMITIVE_JSON);
        let contract = ShaderContract::static_mesh();
        let mesh = document.meshes().next().unwrap();
        let plans: Vec<_> = mesh
            .primitives()
            .map(|primitive| plan_primitive(&contract, &primitive).unwrap())
            .collect();
        assert_eq!(PipelineKey::new(&plans[0]), PipelineKey::new(&plans[1]));
    }

    #[test]
    fn explicit_view_stride_wins_over_packed() {
        let document = document_from_json(
            r#"{
                "asset": {"version": "2.0"},
                "buffers": [{"byteLength": 96}],
                "bufferViews": [
                    {"buffer": 0, "byteOffset": 0, "byteLength": 96, "byteStride": 32}
                ],
                "accessors": [
                    {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                     "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 1.0]},
                    {"bufferView": 0, "byteOffset": 12, "componentType": 5126, "count": 3, "type": "VEC3"}
                ],
                "meshes": [{"primitives": [
                    {"attributes": {"POSITION": 0, "NORMAL": 1}}
                ]}]
            }"#,
        );
        let contract = ShaderContract::static_mesh();
        let mesh = document.meshes().next().unwrap();
        let primitive = mesh.primitives().next().unwrap();
        let plan = plan_primitive(&contract, &primitive).unwrap();
        assert_eq!(plan.slots.len(), 2);
        for slot in &plan.slots {
            assert_eq!(slot.stride, 32);
        }
        // Interleaved attributes alias one view at different offsets.
        assert_eq!(plan.slots[0].offset, 0);
        assert_eq!(plan.slots[1].offset, 12);
    }

    #[test]
    fn unsupported_topology_aborts_planning() {
        let document = document_from_json(
            r#"{
                "asset": {"version": "2.0"},
                "buffers": [{"byteLength": 36}],
                "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
                "accessors": [
                    {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                     "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 1.0]}
                ],
                "meshes": [{"primitives": [
                    {"attributes": {"POSITION": 0}, "mode": 6}
                ]}]
            }"#,
        );
        let contract = ShaderContract::static_mesh();
        let mesh = document.meshes().next().unwrap();
        let primitive = mesh.primitives().next().unwrap();
        assert!(matches!(
            plan_primitive(&contract, &primitive),
            Err(RenderError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn missing_attribute_is_skipped() {
        let document = document_from_json(
            r#"{
                "asset": {"version": "2.0"},
                "buffers": [{"byteLength": 36}],
                "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
                "accessors": [
                    {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                     "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 1.0]}
                ],
                "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}]
            }"#,
        );
        let contract = ShaderContract::skinned();
        let mesh = document.meshes().next().unwrap();
        let primitive = mesh.primitives().next().unwrap();
        let plan = plan_primitive(&contract, &primitive).unwrap();
        let locations: Vec<u32> = plan.slots.iter().map(|slot| slot.location).collect();
        assert_eq!(locations, vec![0]);
    }
}
