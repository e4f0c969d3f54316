use std::path::Path;

use glam::Mat4;
use gltf::{Document, Node};

use crate::error::RenderError;

/// Decoded scene input for the renderer: the parsed document, the binary
/// payload of buffer 0, resolved world matrices for every node, and the
/// per-instance world-transform list.
///
/// The payload contract covers a single buffer; views are always read against
/// buffer 0.
pub struct SceneSource {
    document: Document,
    payload: Vec<u8>,
    world_matrices: Vec<Mat4>,
    instance_transforms: Vec<Mat4>,
}

impl SceneSource {
    pub fn new(document: Document, payload: Vec<u8>) -> Self {
        let world_matrices = resolve_world_matrices(&document);
        Self {
            document,
            payload,
            world_matrices,
            instance_transforms: vec![Mat4::IDENTITY],
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RenderError> {
        let (document, buffers, _images) = gltf::import(path)?;
        let payload = buffers
            .into_iter()
            .next()
            .ok_or(RenderError::MissingPayload)?;
        Ok(Self::new(document, payload.0))
    }

    /// Replaces the per-instance transform list. The list's length is the
    /// instance count every draw is issued with.
    pub fn set_instance_transforms(&mut self, transforms: Vec<Mat4>) {
        assert!(!transforms.is_empty());
        self.instance_transforms = transforms;
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn instance_transforms(&self) -> &[Mat4] {
        &self.instance_transforms
    }

    /// Resolved world matrix of a node; identity for nodes outside the
    /// default scene.
    pub fn world_matrix(&self, node: usize) -> Mat4 {
        self.world_matrices
            .get(node)
            .copied()
            .unwrap_or(Mat4::IDENTITY)
    }
}

fn resolve_world_matrices(document: &Document) -> Vec<Mat4> {
    fn visit(node: Node, parent: Mat4, matrices: &mut [Mat4]) {
        let local = Mat4::from_cols_array_2d(&node.transform().matrix());
        let world = parent * local;
        matrices[node.index()] = world;
        for child in node.children() {
            visit(child, world, matrices);
        }
    }

    let mut matrices = vec![Mat4::IDENTITY; document.nodes().len()];
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next());
    if let Some(scene) = scene {
        for node in scene.nodes() {
            visit(node, Mat4::IDENTITY, &mut matrices);
        }
    }
    matrices
}

#[cfg(test)]
pub(crate) fn document_from_json(json: &str) -> Document {
    gltf::Gltf::from_slice(json.as_bytes())
        .expect("test document")
        .document
}

#[cfg(test)]
mod test {
    use glam::{Mat4, Vec3};

    use super::{document_from_json, SceneSource};

    #[test]
    fn world_matrices_compose_through_hierarchy() {
        let document = document_from_json(
            r#"{
                "asset": {"version": "2.0"},
                "nodes": [
                    {"translation": [1.0, 0.0, 0.0], "children": [1]},
                    {"translation": [0.0, 2.0, 0.0]}
                ],
                "scenes": [{"nodes": [0]}],
                "scene": 0
            }"#,
        );
        let source = SceneSource::new(document, Vec::new());
        assert_eq!(
            source.world_matrix(0),
            Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))
        );
        assert_eq!(
            source.world_matrix(1),
            Mat4::from_translation(Vec3::new(1.0, 2.0, 0.0))
        );
    }

    #[test]
    fn nodes_outside_scene_resolve_to_identity() {
        let document = document_from_json(
            r#"{
                "asset": {"version": "2.0"},
                "nodes": [{"translation": [5.0, 0.0, 0.0]}],
                "scenes": [{"nodes": []}],
                "scene": 0
            }"#,
        );
        let source = SceneSource::new(document, Vec::new());
        assert_eq!(source.world_matrix(0), Mat4::IDENTITY);
        assert_eq!(source.world_matrix(7), Mat4::IDENTITY);
    }

    #[test]
    fn default_instance_list_is_one_identity() {
        let document = document_from_json(r#"{"asset": {"version": "2.0"}}"#);
        let source = SceneSource::new(document, Vec::new());
        assert_eq!(source.instance_transforms(), &[Mat4::IDENTITY]);
    }
}
