use bytemuck::{cast_slice, Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::{
    util::{BufferInitDescriptor, DeviceExt},
    Buffer, BufferUsages, Device, Queue,
};

/// Camera state the host pushes once per frame.
#[derive(Debug, Clone)]
pub struct CameraState {
    pub projection: Mat4,
    pub view: Mat4,
    pub position: Vec3,
    pub time: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            position: Vec3::ZERO,
            time: 0.0,
        }
    }
}

// 36 floats: projection, view, world position, elapsed time.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, Default)]
struct CameraUniform {
    projection: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    position: [f32; 3],
    time: f32,
}

impl From<&CameraState> for CameraUniform {
    fn from(state: &CameraState) -> Self {
        Self {
            projection: state.projection.to_cols_array_2d(),
            view: state.view.to_cols_array_2d(),
            position: state.position.to_array(),
            time: state.time,
        }
    }
}

pub struct CameraUniformBuffer {
    buffer: Buffer,
    uniform: CameraUniform,
}

impl CameraUniformBuffer {
    pub fn new(device: &Device, state: &CameraState) -> Self {
        let uniform = CameraUniform::from(state);
        let buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: cast_slice(&[uniform]),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        Self { buffer, uniform }
    }

    pub fn update(&mut self, queue: &Queue, state: &CameraState) {
        self.uniform = CameraUniform::from(state);
        queue.write_buffer(&self.buffer, 0, cast_slice(&[self.uniform]));
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod test {
    use std::mem::size_of;

    use super::CameraUniform;

    #[test]
    fn uniform_is_36_floats() {
        assert_eq!(size_of::<CameraUniform>(), 36 * 4);
    }
}
