use gltf::accessor::{DataType, Dimensions};
use gltf::mesh::Mode;
use wgpu::{IndexFormat, PrimitiveTopology, VertexFormat};

use crate::error::RenderError;

/// Number of components in one element of an accessor. Matrix shapes have no
/// vertex-format counterpart and are rejected.
pub fn component_count(dimensions: Dimensions) -> Result<u32, RenderError> {
    Ok(match dimensions {
        Dimensions::Scalar => 1,
        Dimensions::Vec2 => 2,
        Dimensions::Vec3 => 3,
        Dimensions::Vec4 => 4,
        other => return Err(RenderError::UnsupportedDimensions(other)),
    })
}

/// Byte size of a single component.
pub fn component_size(data_type: DataType) -> u32 {
    match data_type {
        DataType::I8 | DataType::U8 => 1,
        DataType::I16 | DataType::U16 => 2,
        DataType::U32 | DataType::F32 => 4,
    }
}

/// Tightly packed element stride, used when the buffer view carries no
/// explicit stride.
pub fn packed_stride(data_type: DataType, dimensions: Dimensions) -> Result<u32, RenderError> {
    Ok(component_size(data_type) * component_count(dimensions)?)
}

/// Maps an accessor encoding onto a vertex format. `VertexFormat` is a closed
/// enum, so encodings without a variant (one- and three-component byte and
/// short data, normalized or not) fail instead of composing a format name.
pub fn vertex_format(
    data_type: DataType,
    dimensions: Dimensions,
    normalized: bool,
) -> Result<VertexFormat, RenderError> {
    use VertexFormat::*;
    let format = match (data_type, component_count(dimensions)?, normalized) {
        (DataType::I8, 2, false) => Sint8x2,
        (DataType::I8, 4, false) => Sint8x4,
        (DataType::I8, 2, true) => Snorm8x2,
        (DataType::I8, 4, true) => Snorm8x4,
        (DataType::U8, 2, false) => Uint8x2,
        (DataType::U8, 4, false) => Uint8x4,
        (DataType::U8, 2, true) => Unorm8x2,
        (DataType::U8, 4, true) => Unorm8x4,
        (DataType::I16, 2, false) => Sint16x2,
        (DataType::I16, 4, false) => Sint16x4,
        (DataType::I16, 2, true) => Snorm16x2,
        (DataType::I16, 4, true) => Snorm16x4,
        (DataType::U16, 2, false) => Uint16x2,
        (DataType::U16, 4, false) => Uint16x4,
        (DataType::U16, 2, true) => Unorm16x2,
        (DataType::U16, 4, true) => Unorm16x4,
        (DataType::U32, 1, false) => Uint32,
        (DataType::U32, 2, false) => Uint32x2,
        (DataType::U32, 3, false) => Uint32x3,
        (DataType::U32, 4, false) => Uint32x4,
        (DataType::F32, 1, _) => Float32,
        (DataType::F32, 2, _) => Float32x2,
        (DataType::F32, 3, _) => Float32x3,
        (DataType::F32, 4, _) => Float32x4,
        _ => {
            return Err(RenderError::UnsupportedVertexFormat {
                data_type,
                dimensions,
                normalized,
            })
        }
    };
    Ok(format)
}

/// Unsigned shorts stay 16-bit indices; every other component type is
/// widened to 32-bit.
pub fn index_format(data_type: DataType) -> IndexFormat {
    match data_type {
        DataType::U16 => IndexFormat::Uint16,
        _ => IndexFormat::Uint32,
    }
}

/// LineLoop and TriangleFan have no wgpu topology and must fail fast rather
/// than silently mis-render.
pub fn primitive_topology(mode: Mode) -> Result<PrimitiveTopology, RenderError> {
    Ok(match mode {
        Mode::Points => PrimitiveTopology::PointList,
        Mode::Lines => PrimitiveTopology::LineList,
        Mode::LineStrip => PrimitiveTopology::LineStrip,
        Mode::Triangles => PrimitiveTopology::TriangleList,
        Mode::TriangleStrip => PrimitiveTopology::TriangleStrip,
        Mode::LineLoop | Mode::TriangleFan => return Err(RenderError::UnsupportedMode(mode)),
    })
}
