use bytemuck::cast_slice;
use glam::Mat4;
use wgpu::{
    util::{BufferInitDescriptor, DeviceExt},
    Buffer, BufferUsages, Device, Queue,
};

/// Number of floats backing the joint storage buffer: 16 per joint per
/// instance, or a minimal 4-float placeholder when the asset has no skin so
/// the frame-tier layout keeps its shape.
pub fn joint_buffer_len(joint_count: usize, instance_count: usize) -> usize {
    if joint_count == 0 {
        4
    } else {
        16 * joint_count * instance_count
    }
}

/// Joint world transforms for every instance. Created primed with the bind
/// pose so skinned assets render before any external pose update arrives.
#[derive(Debug)]
pub struct JointStorageBuffer {
    buffer: Buffer,
    joint_count: usize,
    instance_count: usize,
}

impl JointStorageBuffer {
    pub fn new(device: &Device, bind_pose: &[Mat4], instance_count: usize) -> Self {
        let joint_count = bind_pose.len();
        let mut contents = Vec::with_capacity(joint_buffer_len(joint_count, instance_count));
        if joint_count == 0 {
            contents.resize(joint_buffer_len(0, instance_count), 0.0);
        } else {
            for _ in 0..instance_count {
                for matrix in bind_pose {
                    contents.extend_from_slice(&matrix.to_cols_array());
                }
            }
        }
        let buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("Joint Transform Buffer"),
            contents: cast_slice(&contents),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        });
        Self {
            buffer,
            joint_count,
            instance_count,
        }
    }

    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// Rewrites one instance's joint region with world-space joint matrices,
    /// one per joint of the skin.
    pub fn write_instance(&self, queue: &Queue, instance: usize, joints: &[Mat4]) {
        assert!(instance < self.instance_count);
        assert_eq!(joints.len(), self.joint_count);
        let contents: Vec<[f32; 16]> = joints.iter().map(|matrix| matrix.to_cols_array()).collect();
        let offset = (instance * self.joint_count * 64) as u64;
        queue.write_buffer(&self.buffer, offset, cast_slice(&contents));
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}
