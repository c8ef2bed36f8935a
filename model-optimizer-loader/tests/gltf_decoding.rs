//! glTF decoding against small hand-built documents

use base64::{Engine as _, engine::general_purpose};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

use model_optimizer_core::{
    Camera, FilterMode, LightKind, MeshDecoder, MinFilter, NodeKind, OptimizationSettings,
    OptimizerError, PipelineConfig, RawMeshData, Result, SceneDecoder, WrapMode,
};
use model_optimizer_loader::{GltfDecoder, ModelLoader, UNKNOWN_TEXTURE_BYTES};
use model_optimizer_processing::SceneInspector;

/// One triangle: 36 bytes of positions, 6 bytes of u16 indices, 2 bytes padding
fn triangle_buffer() -> Vec<u8> {
    let mut data = Vec::with_capacity(44);
    for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
        for c in v {
            data.extend_from_slice(&c.to_le_bytes());
        }
    }
    for i in [0u16, 1, 2] {
        data.extend_from_slice(&i.to_le_bytes());
    }
    data.extend_from_slice(&[0, 0]);
    data
}

fn document() -> String {
    let buffer = general_purpose::STANDARD.encode(triangle_buffer());
    format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "extensionsUsed": ["KHR_lights_punctual"],
  "extensions": {{
    "KHR_lights_punctual": {{
      "lights": [{{ "type": "point", "color": [1.0, 0.5, 0.25], "intensity": 2.0 }}]
    }}
  }},
  "scene": 0,
  "scenes": [{{ "name": "Main", "nodes": [0, 2] }}],
  "nodes": [
    {{ "name": "Body", "mesh": 0, "children": [1] }},
    {{ "name": "Lamp", "extensions": {{ "KHR_lights_punctual": {{ "light": 0 }} }} }},
    {{ "name": "Eye", "camera": 0, "translation": [0.0, 0.0, 5.0] }}
  ],
  "cameras": [{{ "type": "perspective", "perspective": {{ "yfov": 0.8, "znear": 0.1 }} }}],
  "meshes": [{{
    "name": "Body",
    "primitives": [{{
      "attributes": {{ "POSITION": 0 }},
      "indices": 1,
      "material": 0
    }}]
  }}],
  "materials": [{{
    "name": "Paint",
    "pbrMetallicRoughness": {{
      "baseColorFactor": [1.0, 0.0, 0.0, 1.0],
      "baseColorTexture": {{ "index": 0 }}
    }}
  }}],
  "textures": [{{ "source": 0, "sampler": 0 }}],
  "samplers": [{{ "magFilter": 9728, "minFilter": 9729, "wrapS": 33648, "wrapT": 10497 }}],
  "images": [{{ "uri": "data:image/png;base64,AAAA" }}],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }},
    {{ "buffer": 0, "byteOffset": 42, "byteLength": 2 }}
  ],
  "buffers": [{{ "byteLength": 44, "uri": "data:application/octet-stream;base64,{buffer}" }}]
}}"#
    )
}

fn plain_document() -> String {
    document()
}

/// `document()` with edits applied to its JSON
fn edited_document(edit: impl FnOnce(&mut Value)) -> String {
    let mut root: Value = serde_json::from_str(&document()).unwrap();
    edit(&mut root);
    root.to_string()
}

/// Draco layout as exporters write it: the extension is required and the
/// compressed accessors have no buffer view of their own
fn draco_document() -> String {
    edited_document(|root| {
        root["extensionsUsed"] = json!(["KHR_lights_punctual", "KHR_draco_mesh_compression"]);
        root["extensionsRequired"] = json!(["KHR_draco_mesh_compression"]);
        root["meshes"][0]["primitives"][0]["extensions"] = json!({
            "KHR_draco_mesh_compression": { "bufferView": 2, "attributes": { "POSITION": 0 } }
        });
        for accessor in root["accessors"].as_array_mut().unwrap() {
            accessor.as_object_mut().unwrap().remove("bufferView");
        }
    })
}

#[test]
fn test_decode_hierarchy_and_arenas() {
    let scene = GltfDecoder::new()
        .decode(plain_document().as_bytes(), "memory://triangle.gltf")
        .unwrap();

    assert_eq!(scene.name.as_deref(), Some("Main"));
    assert_eq!(scene.root.children.len(), 2);

    let body = &scene.root.children[0];
    assert_eq!(body.name.as_deref(), Some("Body"));
    let mesh = body.as_mesh().expect("mesh node");
    assert_eq!(mesh.geometry.vertex_count(), 3);
    assert_eq!(mesh.geometry.indices, Some(vec![0, 1, 2]));
    assert!(mesh.geometry.normals.is_none());

    let material = scene.material(mesh.material.unwrap()).unwrap();
    assert_eq!(material.name.as_deref(), Some("Paint"));
    assert_eq!(material.base_color, [1.0, 0.0, 0.0, 1.0]);

    let texture = scene.texture(material.base_color_map.unwrap()).unwrap();
    assert_eq!(texture.dimensions, None);
    assert_eq!(texture.sampler.mag_filter, FilterMode::Nearest);
    assert_eq!(texture.sampler.min_filter, MinFilter::Linear);
    assert_eq!(texture.sampler.wrap_s, WrapMode::MirroredRepeat);
    assert_eq!(texture.sampler.wrap_t, WrapMode::Repeat);

    match &body.children[0].kind {
        NodeKind::Light(light) => {
            assert_eq!(light.kind, LightKind::Point);
            assert_eq!(light.intensity, 2.0);
        }
        other => panic!("expected light, got {:?}", other),
    }

    let eye = &scene.root.children[1];
    assert!(matches!(eye.kind, NodeKind::Camera(Camera::Perspective { zfar: None, .. })));
    assert_eq!(eye.transform[3], [0.0, 0.0, 5.0, 1.0]);
}

#[test]
fn test_invalid_document_names_url() {
    let err = GltfDecoder::new()
        .decode(b"not a gltf file", "broken.glb")
        .unwrap_err();
    assert!(matches!(err, OptimizerError::Load { .. }));
    assert!(err.to_string().contains("broken.glb"));
}

#[test]
fn test_missing_buffer_view_rejected_without_compression() {
    let text = edited_document(|root| {
        root["accessors"][0].as_object_mut().unwrap().remove("bufferView");
    });
    let err = GltfDecoder::new()
        .decode(text.as_bytes(), "plain.gltf")
        .unwrap_err();
    assert!(matches!(err, OptimizerError::Load { .. }));
    assert!(err.to_string().contains("accessors[0].bufferView"));
}

#[test]
fn test_compressed_mesh_without_decoder() {
    let err = GltfDecoder::new()
        .with_decoder_path(Some("/opt/decoders/draco"))
        .decode(draco_document().as_bytes(), "compressed.gltf")
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("compressed.gltf"));
    assert!(message.contains("KHR_draco_mesh_compression"));
    assert!(message.contains("/opt/decoders/draco"));
}

struct QuadDecoder;

impl MeshDecoder for QuadDecoder {
    fn decode(&self, compressed: &[u8]) -> Result<RawMeshData> {
        assert_eq!(compressed.len(), 2);
        Ok(RawMeshData {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            normals: None,
            uvs: None,
            indices: Some(vec![0, 1, 2, 0, 2, 3]),
        })
    }
}

#[test]
fn test_compressed_mesh_with_decoder() {
    let scene = GltfDecoder::new()
        .with_mesh_decoder(Arc::new(QuadDecoder))
        .decode(draco_document().as_bytes(), "compressed.gltf")
        .unwrap();

    let mesh = scene.root.children[0].as_mesh().unwrap();
    assert_eq!(mesh.geometry.triangle_count(), 2);
}

#[tokio::test]
async fn test_load_gltf_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("triangle.gltf");
    tokio::fs::write(&path, plain_document()).await.unwrap();
    let url = path.to_string_lossy().to_string();

    let loader = ModelLoader::from_config(PipelineConfig::default());
    let scene = loader
        .load(&url, &OptimizationSettings::default(), false)
        .await
        .unwrap();

    assert!(matches!(scene.root.kind, NodeKind::Lod(_)));
    let stats = SceneInspector::new().inspect(&scene);
    assert_eq!(stats.triangles, 1);
    assert_eq!(stats.textures, 1);
    assert_eq!(stats.materials, 1);

    // Undecodable image: size falls back to the placeholder
    let cached = loader.cache().stats().await;
    assert!(cached.current_size >= UNKNOWN_TEXTURE_BYTES);
}

#[test]
fn test_strip_and_fan_become_triangle_lists() {
    let strip = edited_document(|root| root["meshes"][0]["primitives"][0]["mode"] = json!(5));
    let scene = GltfDecoder::new().decode(strip.as_bytes(), "strip.gltf").unwrap();
    let mesh = scene.root.children[0].as_mesh().unwrap();
    assert_eq!(mesh.geometry.indices, Some(vec![0, 1, 2]));

    let fan = edited_document(|root| root["meshes"][0]["primitives"][0]["mode"] = json!(6));
    let scene = GltfDecoder::new().decode(fan.as_bytes(), "fan.gltf").unwrap();
    let mesh = scene.root.children[0].as_mesh().unwrap();
    assert_eq!(mesh.geometry.indices, Some(vec![1, 2, 0]));
    assert_eq!(mesh.geometry.triangle_count(), 1);
}

#[test]
fn test_line_primitives_skipped() {
    let lines = edited_document(|root| root["meshes"][0]["primitives"][0]["mode"] = json!(1));
    let scene = GltfDecoder::new().decode(lines.as_bytes(), "lines.gltf").unwrap();

    let body = &scene.root.children[0];
    assert_eq!(body.name.as_deref(), Some("Body"));
    assert!(body.as_mesh().is_none());
    assert_eq!(scene.root.mesh_count(), 0);
    assert_eq!(SceneInspector::new().inspect(&scene).triangles, 0);
}

#[test]
fn test_cyclic_hierarchy_is_a_load_error() {
    let cyclic = edited_document(|root| root["nodes"][1]["children"] = json!([0]));
    let err = GltfDecoder::new()
        .decode(cyclic.as_bytes(), "cyclic.gltf")
        .unwrap_err();

    assert!(matches!(err, OptimizerError::Load { .. }));
    assert!(err.to_string().contains("cyclic.gltf"));
    assert!(err.to_string().contains("ancestor"));
}
