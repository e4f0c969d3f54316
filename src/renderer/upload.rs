use std::collections::BTreeMap;

use gltf::Document;
use wgpu::{
    util::{BufferInitDescriptor, DeviceExt},
    Buffer, BufferUsages, Device,
};

use crate::{asset::SceneSource, error::RenderError};

/// wgpu requires buffer sizes to be a multiple of four bytes for mapped
/// uploads; placeholder buffers use the same minimum.
const SIZE_ALIGN: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

/// One GPU buffer per buffer view, index-aligned with `Document::views()`.
pub struct ViewBuffers {
    buffers: Vec<Buffer>,
}

impl ViewBuffers {
    pub fn get(&self, view: usize) -> &Buffer {
        &self.buffers[view]
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ViewUpload {
    pub usage: Option<BufferUsages>,
    /// Source byte range into the payload; `None` for placeholder views.
    pub range: Option<(usize, usize)>,
    pub size: u64,
}

fn tag(
    usages: &mut BTreeMap<usize, BufferUsages>,
    view: Option<gltf::buffer::View<'_>>,
    usage: BufferUsages,
) {
    if let Some(view) = view {
        *usages
            .entry(view.index())
            .or_insert_with(BufferUsages::empty) |= usage;
    }
}

/// Tags every referenced buffer view with its GPU usage: vertex data for
/// attribute accessors, index data for index accessors, and storage for the
/// first skin's inverse-bind-matrix accessor.
fn classify_views(document: &Document) -> BTreeMap<usize, BufferUsages> {
    let mut usages = BTreeMap::new();
    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            if let Some(indices) = primitive.indices() {
                tag(&mut usages, indices.view(), BufferUsages::INDEX);
            }
            for (_, accessor) in primitive.attributes() {
                tag(&mut usages, accessor.view(), BufferUsages::VERTEX);
            }
        }
    }
    if let Some(skin) = document.skins().next() {
        if let Some(matrices) = skin.inverse_bind_matrices() {
            tag(
                &mut usages,
                matrices.view(),
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
            );
        }
    }
    usages
}

/// Pure planning step: decides every buffer view's usage, padded size and
/// source byte range, and fails when the payload cannot back a view.
pub(crate) fn plan_views(
    document: &Document,
    payload_len: usize,
) -> Result<Vec<ViewUpload>, RenderError> {
    let usages = classify_views(document);
    document
        .views()
        .map(|view| {
            let index = view.index();
            match usages.get(&index) {
                Some(&usage) => {
                    // The payload contract covers buffer 0 only; a view on
                    // another buffer would read the wrong bytes.
                    if view.buffer().index() != 0 {
                        return Err(RenderError::UnsupportedBufferIndex {
                            view: index,
                            buffer: view.buffer().index(),
                        });
                    }
                    let start = view.offset();
                    let end = start + view.length();
                    if end > payload_len {
                        return Err(RenderError::PayloadTooShort {
                            view: index,
                            end,
                            payload: payload_len,
                        });
                    }
                    Ok(ViewUpload {
                        usage: Some(usage),
                        range: Some((start, end)),
                        size: view.length().next_multiple_of(SIZE_ALIGN) as u64,
                    })
                }
                None => Ok(ViewUpload {
                    usage: None,
                    range: None,
                    size: SIZE_ALIGN as u64,
                }),
            }
        })
        .collect()
}

/// Uploads the asset's binary payload into one GPU buffer per buffer view.
/// Unreferenced views get minimal placeholders so view-index lookups stay
/// dense.
pub fn upload_views(device: &Device, source: &SceneSource) -> Result<ViewBuffers, RenderError> {
    let payload = source.payload();
    let plans = plan_views(source.document(), payload.len())?;
    let buffers = plans
        .into_iter()
        .enumerate()
        .map(|(index, plan)| {
            let mut contents = vec![0u8; plan.size as usize];
            if let Some((start, end)) = plan.range {
                contents[..end - start].copy_from_slice(&payload[start..end]);
            }
            device.create_buffer_init(&BufferInitDescriptor {
                label: Some(&format!("Buffer View {}", index)),
                contents: &contents,
                usage: plan.usage.unwrap_or(BufferUsages::VERTEX),
            })
        })
        .collect();
    Ok(ViewBuffers { buffers })
}

#[cfg(test)]
mod test {
    use wgpu::BufferUsages;

    use super::plan_views;
    use crate::{asset::document_from_json, error::RenderError};

    const MESH_JSON: &str = r#"{
        "asset": {"version": "2.0"},
        "buffers": [{"byteLength": 64}],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 36},
            {"buffer": 0, "byteOffset": 36, "byteLength": 6},
            {"buffer": 0, "byteOffset": 48, "byteLength": 8}
        ],
        "accessors": [
            {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
             "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 1.0]},
            {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}
        ],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "indices": 1}]}]
    }"#;

    #[test]
    fn plan_is_dense_and_order_preserving() {
        let document = document_from_json(MESH_JSON);
        let plans = plan_views(&document, 64).unwrap();
        assert_eq!(plans.len(), document.views().len());

        assert_eq!(plans[0].usage, Some(BufferUsages::VERTEX));
        assert_eq!(plans[0].range, Some((0, 36)));
        assert_eq!(plans[0].size, 36);

        // Index data padded up to the four-byte copy alignment.
        assert_eq!(plans[1].usage, Some(BufferUsages::INDEX));
        assert_eq!(plans[1].range, Some((36, 42)));
        assert_eq!(plans[1].size, 8);

        // The unreferenced view still gets a slot, as a placeholder.
        assert_eq!(plans[2].usage, None);
        assert_eq!(plans[2].range, None);
        assert_eq!(plans[2].size, 4);
    }

    #[test]
    fn inverse_bind_matrices_tagged_as_storage() {
        let document = document_from_json(
            r#"{
                "asset": {"version": "2.0"},
                "buffers": [{"byteLength": 128}],
                "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 128}],
                "accessors": [
                    {"bufferView": 0, "componentType": 5126, "count": 2, "type": "MAT4"}
                ],
                "nodes": [{"children": [1]}, {}],
                "skins": [{"joints": [0, 1], "inverseBindMatrices": 0}]
            }"#,
        );
        let plans = plan_views(&document, 128).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(
            plans[0].usage,
            Some(BufferUsages::STORAGE | BufferUsages::COPY_DST)
        );
    }

    #[test]
    fn views_on_secondary_buffers_are_rejected() {
        let document = document_from_json(
            r#"{
                "asset": {"version": "2.0"},
                "buffers": [{"byteLength": 64}, {"byteLength": 64, "uri": "extra.bin"}],
                "bufferViews": [{"buffer": 1, "byteOffset": 0, "byteLength": 36}],
                "accessors": [
                    {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                     "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 1.0]}
                ],
                "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}]
            }"#,
        );
        // The view fits inside buffer 0's payload size, but belongs to buffer
        // 1; planning must fail instead of copying the wrong bytes.
        let result = plan_views(&document, 64);
        assert!(matches!(
            result,
            Err(RenderError::UnsupportedBufferIndex { view: 0, buffer: 1 })
        ));
    }

    #[test]
    fn short_payload_is_a_load_failure() {
        let document = document_from_json(MESH_JSON);
        let result = plan_views(&document, 10);
        assert!(matches!(
            result,
            Err(RenderError::PayloadTooShort {
                view: 0,
                end: 36,
                payload: 10
            })
        ));
    }
}
