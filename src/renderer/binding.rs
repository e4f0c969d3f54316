use std::collections::HashMap;

use bytemuck::{cast_slice, Pod, Zeroable};
use glam::Mat4;
use wgpu::{
    util::{BufferInitDescriptor, DeviceExt},
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, Buffer, BufferBindingType, BufferUsages, Device, Queue,
    ShaderStages,
};

use super::uniform::{
    camera::{CameraState, CameraUniformBuffer},
    instance::InstanceStorageBuffer,
    joint::JointStorageBuffer,
};
use crate::{asset::SceneSource, error::RenderError};

fn uniform_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::VERTEX_FRAGMENT,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::VERTEX,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Joint metadata for the constant tier: skinning flag, joint count, and two
/// reserved words keeping the uniform 16 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable, Default)]
pub struct SkinMetadata {
    pub has_skin: u32,
    pub joint_count: u32,
    pub reserved: [u32; 2],
}

pub(crate) fn skin_metadata(source: &SceneSource) -> SkinMetadata {
    match source.document().skins().next() {
        Some(skin) => SkinMetadata {
            has_skin: 1,
            joint_count: skin.joints().count() as u32,
            reserved: [0; 2],
        },
        None => SkinMetadata::default(),
    }
}

/// Bind-pose world matrix of every joint of the first skin, in joint order.
/// Empty when the asset has no skin.
pub(crate) fn bind_pose_matrices(source: &SceneSource) -> Vec<Mat4> {
    source
        .document()
        .skins()
        .next()
        .map(|skin| {
            skin.joints()
                .map(|joint| source.world_matrix(joint.index()))
                .collect()
        })
        .unwrap_or_default()
}

/// Payload byte range of the first skin's inverse-bind matrices. Storage
/// bind-group offsets must satisfy the device's alignment (256 bytes by
/// default), which an accessor's byte offset rarely does, so the matrices are
/// copied into their own tightly packed buffer instead of bound inside the
/// view buffer.
pub(crate) fn inverse_bind_range(
    source: &SceneSource,
) -> Result<Option<(usize, usize)>, RenderError> {
    let accessor = match source
        .document()
        .skins()
        .next()
        .and_then(|skin| skin.inverse_bind_matrices())
    {
        Some(accessor) => accessor,
        None => return Ok(None),
    };
    let view = match accessor.view() {
        Some(view) => view,
        None => return Ok(None),
    };
    if view.buffer().index() != 0 {
        return Err(RenderError::UnsupportedBufferIndex {
            view: view.index(),
            buffer: view.buffer().index(),
        });
    }
    let start = view.offset() + accessor.offset();
    let end = start + accessor.count() * 64;
    if end > source.payload().len() {
        return Err(RenderError::PayloadTooShort {
            view: view.index(),
            end,
            payload: source.payload().len(),
        });
    }
    Ok(Some((start, end)))
}

/// Slot 0: immutable per-asset data — joint metadata and the inverse-bind
/// matrix buffer (a zeroed placeholder for unskinned assets).
pub struct ConstantBindings {
    layout: BindGroupLayout,
    bind_group: BindGroup,
}

impl ConstantBindings {
    pub fn new(device: &Device, source: &SceneSource) -> Result<Self, RenderError> {
        let metadata = skin_metadata(source);
        let metadata_buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("Skin Metadata Buffer"),
            contents: cast_slice(&[metadata]),
            usage: BufferUsages::UNIFORM,
        });
        let inverse_bind = match inverse_bind_range(source)? {
            Some((start, end)) => device.create_buffer_init(&BufferInitDescriptor {
                label: Some("Inverse Bind Matrix Buffer"),
                contents: &source.payload()[start..end],
                usage: BufferUsages::STORAGE,
            }),
            None => device.create_buffer_init(&BufferInitDescriptor {
                label: Some("Inverse Bind Placeholder"),
                contents: &[0; 64],
                usage: BufferUsages::STORAGE,
            }),
        };

        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            entries: &[uniform_entry(0), storage_entry(1)],
            label: Some("Constant Bind Group Layout"),
        });
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            layout: &layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: metadata_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: inverse_bind.as_entire_binding(),
                },
            ],
            label: Some("Constant Bind Group"),
        });
        Ok(Self { layout, bind_group })
    }

    pub fn layout(&self) -> &BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self) -> &BindGroup {
        &self.bind_group
    }
}

/// Slot 1: per-frame data — camera uniform, instance transforms and joint
/// transforms. The joint buffer is primed with the bind pose of every
/// instance.
pub struct FrameBindings {
    layout: BindGroupLayout,
    bind_group: BindGroup,
    pub camera: CameraUniformBuffer,
    pub instances: InstanceStorageBuffer,
    pub joints: JointStorageBuffer,
}

impl FrameBindings {
    pub fn new(device: &Device, source: &SceneSource) -> Self {
        let camera = CameraUniformBuffer::new(device, &CameraState::default());
        let instances = InstanceStorageBuffer::new(device, source.instance_transforms());
        let bind_pose = bind_pose_matrices(source);
        let joints =
            JointStorageBuffer::new(device, &bind_pose, source.instance_transforms().len());

        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            entries: &[uniform_entry(0), storage_entry(1), storage_entry(2)],
            label: Some("Frame Bind Group Layout"),
        });
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            layout: &layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: camera.buffer().as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: instances.buffer().as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: joints.buffer().as_entire_binding(),
                },
            ],
            label: Some("Frame Bind Group"),
        });
        Self {
            layout,
            bind_group,
            camera,
            instances,
            joints,
        }
    }

    pub fn layout(&self) -> &BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self) -> &BindGroup {
        &self.bind_group
    }
}

struct NodeBinding {
    buffer: Buffer,
    bind_group: BindGroup,
}

/// Slot 2: one small uniform per mesh-bearing node holding its world
/// transform, all sharing a single layout so the render loop can swap the
/// node tier without touching the other two.
pub struct NodeBindings {
    layout: BindGroupLayout,
    groups: HashMap<usize, NodeBinding>,
}

impl NodeBindings {
    pub fn new(device: &Device, source: &SceneSource) -> Self {
        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            entries: &[uniform_entry(0)],
            label: Some("Node Bind Group Layout"),
        });
        let mut groups = HashMap::new();
        for node in source.document().nodes() {
            if node.mesh().is_none() {
                continue;
            }
            let matrix = source.world_matrix(node.index());
            let buffer = device.create_buffer_init(&BufferInitDescriptor {
                label: Some(&format!("Node {} Transform Buffer", node.index())),
                contents: cast_slice(&matrix.to_cols_array()),
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            });
            let bind_group = device.create_bind_group(&BindGroupDescriptor {
                layout: &layout,
                entries: &[BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
                label: Some("Node Bind Group"),
            });
            groups.insert(node.index(), NodeBinding { buffer, bind_group });
        }
        Self { layout, groups }
    }

    pub fn layout(&self) -> &BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self, node: usize) -> Option<&BindGroup> {
        self.groups.get(&node).map(|group| &group.bind_group)
    }

    /// Rewrites one node's world transform. Returns false for nodes the
    /// renderer holds no bind group for.
    pub fn set_transform(&self, queue: &Queue, node: usize, matrix: &Mat4) -> bool {
        match self.groups.get(&node) {
            Some(group) => {
                queue.write_buffer(&group.buffer, 0, cast_slice(&matrix.to_cols_array()));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::mem::size_of;

    use glam::{Mat4, Vec3};

    use super::{bind_pose_matrices, inverse_bind_range, skin_metadata, SkinMetadata};
    use crate::{
        asset::{document_from_json, SceneSource},
        error::RenderError,
    };

    const SKINNED_JSON: &str = r#"{
        "asset": {"version": "2.0"},
        "nodes": [
            {"translation": [1.0, 0.0, 0.0], "children": [1]},
            {"translation": [0.0, 2.0, 0.0]}
        ],
        "skins": [{"joints": [0, 1]}],
        "scenes": [{"nodes": [0]}],
        "scene": 0
    }"#;

    #[test]
    fn metadata_is_16_bytes() {
        assert_eq!(size_of::<SkinMetadata>(), 16);
    }

    #[test]
    fn metadata_with_skin() {
        let source = SceneSource::new(document_from_json(SKINNED_JSON), Vec::new());
        let metadata = skin_metadata(&source);
        assert_eq!(metadata.has_skin, 1);
        assert_eq!(metadata.joint_count, 2);
    }

    #[test]
    fn metadata_without_skin() {
        let source = SceneSource::new(
            document_from_json(r#"{"asset": {"version": "2.0"}}"#),
            Vec::new(),
        );
        let metadata = skin_metadata(&source);
        assert_eq!(metadata.has_skin, 0);
        assert_eq!(metadata.joint_count, 0);
        assert!(bind_pose_matrices(&source).is_empty());
    }

    const INVERSE_BIND_JSON: &str = r#"{
        "asset": {"version": "2.0"},
        "buffers": [{"byteLength": 256}],
        "bufferViews": [{"buffer": 0, "byteOffset": 16, "byteLength": 192}],
        "accessors": [
            {"bufferView": 0, "byteOffset": 64, "componentType": 5126, "count": 2, "type": "MAT4"}
        ],
        "nodes": [{"children": [1]}, {}],
        "skins": [{"joints": [0, 1], "inverseBindMatrices": 0}]
    }"#;

    #[test]
    fn inverse_bind_range_sums_view_and_accessor_offsets() {
        let source = SceneSource::new(document_from_json(INVERSE_BIND_JSON), vec![0; 256]);
        // View offset 16 + accessor offset 64, two 64-byte matrices.
        assert_eq!(inverse_bind_range(&source).unwrap(), Some((80, 208)));
    }

    #[test]
    fn inverse_bind_range_checks_payload_length() {
        let source = SceneSource::new(document_from_json(INVERSE_BIND_JSON), vec![0; 100]);
        assert!(matches!(
            inverse_bind_range(&source),
            Err(RenderError::PayloadTooShort {
                view: 0,
                end: 208,
                payload: 100
            })
        ));
    }

    #[test]
    fn inverse_bind_range_is_empty_without_a_skin() {
        let source = SceneSource::new(
            document_from_json(r#"{"asset": {"version": "2.0"}}"#),
            Vec::new(),
        );
        assert_eq!(inverse_bind_range(&source).unwrap(), None);
    }

    #[test]
    fn bind_pose_uses_resolved_world_matrices() {
        let source = SceneSource::new(document_from_json(SKINNED_JSON), Vec::new());
        let bind_pose = bind_pose_matrices(&source);
        assert_eq!(
            bind_pose,
            vec![
                Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
                Mat4::from_translation(Vec3::new(1.0, 2.0, 0.0)),
            ]
        );
    }
}
