use gltf::accessor::{DataType, Dimensions};
use gltf::mesh::Mode;
use thiserror::Error;

/// Errors surfaced while turning an asset into GPU state.
///
/// Everything here is fatal at initialization time: either the asset uses an
/// encoding the GPU API cannot express, or its binary payload cannot back the
/// buffer views referencing it. None of these conditions is transient, so
/// there are no retries, and the per-frame path never reports errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no vertex format for {dimensions:?} of {data_type:?} (normalized: {normalized})")]
    UnsupportedVertexFormat {
        data_type: DataType,
        dimensions: Dimensions,
        normalized: bool,
    },
    #[error("unsupported accessor dimensions: {0:?}")]
    UnsupportedDimensions(Dimensions),
    #[error("unsupported primitive mode: {0:?}")]
    UnsupportedMode(Mode),
    #[error("asset has no binary payload")]
    MissingPayload,
    #[error("buffer view {view} reads buffer {buffer}, but only buffer 0 is loaded")]
    UnsupportedBufferIndex { view: usize, buffer: usize },
    #[error("buffer view {view} ends at byte {end}, but the payload holds {payload} bytes")]
    PayloadTooShort {
        view: usize,
        end: usize,
        payload: usize,
    },
    #[error("failed to load asset: {0}")]
    Load(#[from] gltf::Error),
}
