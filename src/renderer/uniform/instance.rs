use bytemuck::cast_slice;
use glam::Mat4;
use wgpu::{
    util::{BufferInitDescriptor, DeviceExt},
    Buffer, BufferUsages, Device, Queue,
};

/// Per-instance world transforms in a storage buffer, 16 floats per
/// instance, rewritten wholesale whenever the host pushes a new list.
#[derive(Debug)]
pub struct InstanceStorageBuffer {
    buffer: Buffer,
    instance_count: usize,
}

pub(crate) fn encode_matrices(transforms: &[Mat4]) -> Vec<[f32; 16]> {
    transforms
        .iter()
        .map(|matrix| matrix.to_cols_array())
        .collect()
}

impl InstanceStorageBuffer {
    pub fn new(device: &Device, transforms: &[Mat4]) -> Self {
        let buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("Instance Transform Buffer"),
            contents: cast_slice(&encode_matrices(transforms)),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        });
        Self {
            buffer,
            instance_count: transforms.len(),
        }
    }

    pub fn set(&self, queue: &Queue, transforms: &[Mat4]) {
        assert_eq!(transforms.len(), self.instance_count);
        queue.write_buffer(&self.buffer, 0, cast_slice(&encode_matrices(transforms)));
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod test {
    use glam::{Mat4, Quat, Vec3};

    use super::encode_matrices;

    #[test]
    fn matrices_round_trip_through_buffer_encoding() {
        let transforms = vec![
            Mat4::IDENTITY,
            Mat4::from_scale_rotation_translation(
                Vec3::new(2.0, 1.0, 0.5),
                Quat::from_rotation_y(1.2),
                Vec3::new(-3.0, 4.0, 5.0),
            ),
        ];
        let encoded = encode_matrices(&transforms);
        assert_eq!(encoded.len(), transforms.len());
        for (columns, original) in encoded.iter().zip(&transforms) {
            assert_eq!(Mat4::from_cols_array(columns), *original);
        }
    }
}
