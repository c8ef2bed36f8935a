//! glTF / GLB decoding
//!
//! Converts a glTF document into the scene model: node hierarchy with
//! transforms, one mesh node per primitive, materials and textures in the
//! scene arenas, punctual lights and cameras. Primitives compressed with
//! `KHR_draco_mesh_compression` go through an injected [`MeshDecoder`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gltf::json::validation::Validate;
use gltf::khr_lights_punctual::Kind as GltfLightKind;
use gltf::mesh::Mode;
use tracing::{debug, warn};

use model_optimizer_core::{
    Camera, FilterMode, Geometry, Light, LightKind, Material, MaterialHandle, MeshDecoder,
    MinFilter, Node, NodeKind, OptimizerError, Result, Sampler, Scene, SceneDecoder, Texture,
    TextureHandle, WrapMode,
};

use crate::fetch::local_path;

const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

#[derive(Clone, Default)]
pub struct GltfDecoder {
    mesh_decoder: Option<Arc<dyn MeshDecoder>>,
    decoder_path: Option<PathBuf>,
}

impl std::fmt::Debug for GltfDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GltfDecoder")
            .field("mesh_decoder", &self.mesh_decoder.is_some())
            .field("decoder_path", &self.decoder_path)
            .finish()
    }
}

impl GltfDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mesh_decoder(mut self, decoder: Arc<dyn MeshDecoder>) -> Self {
        self.mesh_decoder = Some(decoder);
        self
    }

    /// Location of the mesh-compression decoder assets, reported in errors
    pub fn with_decoder_path<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.decoder_path = path.map(Into::into);
        self
    }
}

impl SceneDecoder for GltfDecoder {
    fn decode(&self, bytes: &[u8], url: &str) -> Result<Scene> {
        let gltf::Gltf { document, blob } = parse(bytes, url)?;

        let base_dir = local_path(url).and_then(|p| p.parent().map(Path::to_path_buf));
        let base_dir = base_dir.as_deref();
        let buffers = gltf::import_buffers(&document, base_dir, blob)
            .map_err(|e| OptimizerError::load(url, format!("buffers: {}", e)))?;

        let mut builder = SceneBuilder {
            url,
            document: &document,
            buffers: &buffers,
            decoder: self,
            scene: Scene::new(Node::group(Vec::new())),
            textures: Vec::new(),
            materials: HashMap::new(),
            default_material: None,
            ancestors: HashSet::new(),
        };
        builder.load_textures(base_dir);
        builder.load_materials();

        let gltf_scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| OptimizerError::load(url, "document contains no scene"))?;

        let mut roots = Vec::new();
        for node in gltf_scene.nodes() {
            roots.push(builder.convert_node(&node)?);
        }

        let mut scene = builder.scene;
        scene.root = Node::group(roots);
        scene.name = gltf_scene.name().map(str::to_string);
        debug!(
            "Decoded {}: {} meshes, {} materials, {} textures",
            url,
            scene.root.mesh_count(),
            scene.materials().len(),
            scene.textures().len()
        );
        Ok(scene)
    }
}

/// Parse and validate, accepting what compressed meshes legitimately omit
///
/// A compressed primitive's accessors carry no `bufferView` and the
/// compression extension is usually listed as required; the `gltf` crate
/// rejects both.
fn parse(bytes: &[u8], url: &str) -> Result<gltf::Gltf> {
    let gltf = gltf::Gltf::from_slice_without_validation(bytes)
        .map_err(|e| OptimizerError::load(url, e.to_string()))?;

    let root = gltf.document.as_json();
    let exempt = compressed_exemptions(root);
    let mut errors = Vec::new();
    root.validate(root, gltf::json::Path::new, &mut |path, error| {
        let path = path();
        if !exempt.contains(&path) {
            errors.push((path, error));
        }
    });
    if !errors.is_empty() {
        return Err(OptimizerError::load(url, gltf::Error::Validation(errors).to_string()));
    }
    Ok(gltf)
}

fn compressed_exemptions(root: &gltf::json::Root) -> Vec<gltf::json::Path> {
    use gltf::json::Path;

    let mut exempt: Vec<Path> = root
        .extensions_required
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() == DRACO_EXTENSION)
        .map(|(i, _)| {
            Path::new()
                .field("extensionsRequired")
                .index(i)
                .value_str(DRACO_EXTENSION)
        })
        .collect();

    for primitive in root.meshes.iter().flat_map(|mesh| &mesh.primitives) {
        let compressed = primitive
            .extensions
            .as_ref()
            .is_some_and(|extensions| extensions.others.contains_key(DRACO_EXTENSION));
        if !compressed {
            continue;
        }
        let accessors = primitive.attributes.values().copied().chain(primitive.indices);
        exempt.extend(accessors.map(|accessor| {
            Path::new()
                .field("accessors")
                .index(accessor.value())
                .field("bufferView")
        }));
    }
    exempt
}

/// Index list drawing `mode` as a triangle list, `None` for point and line modes
fn triangle_list(mode: Mode, geometry: &Geometry) -> Option<Vec<u32>> {
    let indices = geometry
        .indices
        .clone()
        .unwrap_or_else(|| (0..geometry.positions.len() as u32).collect());
    match mode {
        Mode::Triangles => Some(indices),
        Mode::TriangleStrip => Some(
            indices
                .windows(3)
                .enumerate()
                .flat_map(|(i, w)| {
                    if i % 2 == 0 {
                        [w[0], w[1], w[2]]
                    } else {
                        [w[1], w[0], w[2]]
                    }
                })
                .collect(),
        ),
        Mode::TriangleFan => match indices.split_first() {
            Some((&center, rest)) => Some(
                rest.windows(2)
                    .flat_map(|w| [w[0], w[1], center])
                    .collect(),
            ),
            None => Some(Vec::new()),
        },
        Mode::Points | Mode::Lines | Mode::LineLoop | Mode::LineStrip => None,
    }
}

struct SceneBuilder<'a> {
    url: &'a str,
    document: &'a gltf::Document,
    buffers: &'a [gltf::buffer::Data],
    decoder: &'a GltfDecoder,
    scene: Scene,
    /// glTF texture index -> arena handle
    textures: Vec<TextureHandle>,
    /// glTF material index -> arena handle
    materials: HashMap<usize, MaterialHandle>,
    default_material: Option<MaterialHandle>,
    /// Node indices on the current path from the scene root
    ancestors: HashSet<usize>,
}

impl SceneBuilder<'_> {
    /// Image decode failures leave the texture without dimensions
    fn load_textures(&mut self, base_dir: Option<&Path>) {
        let images = match gltf::import_images(self.document, base_dir, self.buffers) {
            Ok(images) => images,
            Err(e) => {
                warn!("Images of {} not decoded: {}", self.url, e);
                Vec::new()
            }
        };

        for texture in self.document.textures() {
            let image = images.get(texture.source().index());
            let mut converted = Texture {
                name: texture.name().map(str::to_string),
                dimensions: image.map(|img| (img.width, img.height)),
                pixels: image.and_then(rgba8_pixels),
                sampler: convert_sampler(&texture.sampler()),
            };
            if converted.pixels.is_none() && image.is_some() {
                debug!("Texture {:?} kept without pixel data", converted.name);
            }
            converted.sampler.generate_mipmaps =
                converted.sampler.min_filter == MinFilter::LinearMipmapLinear;
            let handle = self.scene.add_texture(converted);
            self.textures.push(handle);
        }
    }

    fn load_materials(&mut self) {
        for material in self.document.materials() {
            let Some(index) = material.index() else {
                continue;
            };
            let pbr = material.pbr_metallic_roughness();
            let metallic_roughness = pbr
                .metallic_roughness_texture()
                .and_then(|info| self.texture_handle(info.texture().index()));
            let converted = Material {
                name: material.name().map(str::to_string),
                base_color: pbr.base_color_factor(),
                base_color_map: pbr
                    .base_color_texture()
                    .and_then(|info| self.texture_handle(info.texture().index())),
                normal_map: material
                    .normal_texture()
                    .and_then(|normal| self.texture_handle(normal.texture().index())),
                roughness_map: metallic_roughness,
                metalness_map: metallic_roughness,
                occlusion_map: material
                    .occlusion_texture()
                    .and_then(|occlusion| self.texture_handle(occlusion.texture().index())),
            };
            let handle = self.scene.add_material(converted);
            self.materials.insert(index, handle);
        }
    }

    fn texture_handle(&self, index: usize) -> Option<TextureHandle> {
        self.textures.get(index).copied()
    }

    fn material_handle(&mut self, material: &gltf::Material) -> MaterialHandle {
        if let Some(handle) = material.index().and_then(|i| self.materials.get(&i)) {
            return *handle;
        }
        match self.default_material {
            Some(handle) => handle,
            None => {
                let handle = self.scene.add_material(Material::default());
                self.default_material = Some(handle);
                handle
            }
        }
    }

    fn convert_node(&mut self, node: &gltf::Node) -> Result<Node> {
        if !self.ancestors.insert(node.index()) {
            return Err(OptimizerError::load(
                self.url,
                format!("node {} is its own ancestor", node.index()),
            ));
        }
        let converted = self.convert_node_inner(node);
        self.ancestors.remove(&node.index());
        converted
    }

    fn convert_node_inner(&mut self, node: &gltf::Node) -> Result<Node> {
        let mut kinds = Vec::new();

        if let Some(mesh) = node.mesh() {
            let mut primitives = Vec::new();
            for primitive in mesh.primitives() {
                let Some(geometry) = self.read_primitive(&mesh, &primitive)? else {
                    continue;
                };
                let material = self.material_handle(&primitive.material());
                primitives.push(Node::mesh(geometry, Some(material)));
            }
            if primitives.len() <= 1 {
                kinds.extend(primitives.pop().map(|n| n.kind));
            } else {
                kinds.push(NodeKind::Group);
                kinds.extend(primitives.into_iter().map(|n| n.kind));
            }
        }
        if let Some(light) = node.light() {
            kinds.push(NodeKind::Light(convert_light(&light)));
        }
        if let Some(camera) = node.camera() {
            kinds.push(NodeKind::Camera(convert_camera(&camera)));
        }

        let mut kinds = kinds.into_iter();
        let mut converted = Node::new(kinds.next().unwrap_or(NodeKind::Group));
        converted.name = node.name().map(str::to_string);
        converted.transform = node.transform().matrix();
        converted.children.extend(kinds.map(Node::new));
        for child in node.children() {
            converted.children.push(self.convert_node(&child)?);
        }
        Ok(converted)
    }

    /// Triangle geometry of `primitive`; point and line primitives are skipped
    fn read_primitive(
        &self,
        mesh: &gltf::Mesh,
        primitive: &gltf::Primitive,
    ) -> Result<Option<Geometry>> {
        let mode = primitive.mode();
        if matches!(mode, Mode::Points | Mode::Lines | Mode::LineLoop | Mode::LineStrip) {
            warn!(
                "Mesh {:?} primitive {} skipped: {:?} is not a triangle mode",
                mesh.name(),
                primitive.index(),
                mode
            );
            return Ok(None);
        }

        let mut geometry = match primitive.extension_value(DRACO_EXTENSION) {
            Some(extension) => self.read_compressed(mesh, extension)?,
            None => self.read_attributes(mesh, primitive)?,
        };
        if mode != Mode::Triangles {
            debug!("Converting {:?} of mesh {:?} to a triangle list", mode, mesh.name());
            geometry.indices = triangle_list(mode, &geometry);
        }
        Ok(Some(geometry))
    }

    fn read_attributes(&self, mesh: &gltf::Mesh, primitive: &gltf::Primitive) -> Result<Geometry> {
        let buffers = self.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| &b.0[..]));
        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| {
                OptimizerError::load(
                    self.url,
                    format!("mesh {:?} has a primitive without positions", mesh.name()),
                )
            })?
            .collect();

        let mut geometry = Geometry::new(positions);
        geometry.normals = reader.read_normals().map(Iterator::collect);
        geometry.uvs = reader.read_tex_coords(0).map(|uv| uv.into_f32().collect());
        geometry.uvs2 = reader.read_tex_coords(1).map(|uv| uv.into_f32().collect());
        geometry.indices = reader.read_indices().map(|i| i.into_u32().collect());
        Ok(geometry)
    }

    fn read_compressed(&self, mesh: &gltf::Mesh, extension: &serde_json::Value) -> Result<Geometry> {
        let Some(decoder) = &self.decoder.mesh_decoder else {
            let location = self
                .decoder
                .decoder_path
                .as_ref()
                .map_or_else(|| "<not configured>".to_string(), |p| p.display().to_string());
            return Err(OptimizerError::load(
                self.url,
                format!(
                    "mesh {:?} uses {} but no mesh decoder is available (decoder path: {})",
                    mesh.name(),
                    DRACO_EXTENSION,
                    location
                ),
            ));
        };

        let view_index = extension
            .get("bufferView")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                OptimizerError::load(self.url, format!("{} without bufferView", DRACO_EXTENSION))
            })? as usize;
        let compressed = self
            .document
            .views()
            .nth(view_index)
            .and_then(|view| {
                let data = self.buffers.get(view.buffer().index())?;
                data.0.get(view.offset()..view.offset() + view.length())
            })
            .ok_or_else(|| {
                OptimizerError::load(self.url, format!("bufferView {} out of range", view_index))
            })?;

        let raw = decoder
            .decode(compressed)
            .map_err(|e| OptimizerError::load(self.url, format!("mesh decoder: {}", e)))?;
        Ok(Geometry {
            positions: raw.positions,
            normals: raw.normals,
            uvs: raw.uvs,
            indices: raw.indices,
            ..Geometry::default()
        })
    }
}

/// RGBA8 pixels when the image format converts losslessly
fn rgba8_pixels(image: &gltf::image::Data) -> Option<Vec<u8>> {
    use gltf::image::Format;
    match image.format {
        Format::R8G8B8A8 => Some(image.pixels.clone()),
        Format::R8G8B8 => Some(
            image
                .pixels
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], u8::MAX])
                .collect(),
        ),
        _ => None,
    }
}

fn convert_sampler(sampler: &gltf::texture::Sampler) -> Sampler {
    use gltf::texture::{MagFilter, MinFilter as GltfMinFilter, WrappingMode};

    let wrap = |mode| match mode {
        WrappingMode::ClampToEdge => WrapMode::ClampToEdge,
        WrappingMode::MirroredRepeat => WrapMode::MirroredRepeat,
        WrappingMode::Repeat => WrapMode::Repeat,
    };
    Sampler {
        mag_filter: match sampler.mag_filter() {
            Some(MagFilter::Nearest) => FilterMode::Nearest,
            _ => FilterMode::Linear,
        },
        min_filter: match sampler.min_filter() {
            Some(GltfMinFilter::Nearest) => MinFilter::Nearest,
            Some(GltfMinFilter::Linear) => MinFilter::Linear,
            _ => MinFilter::LinearMipmapLinear,
        },
        wrap_s: wrap(sampler.wrap_s()),
        wrap_t: wrap(sampler.wrap_t()),
        ..Sampler::default()
    }
}

fn convert_light(light: &gltf::khr_lights_punctual::Light) -> Light {
    Light {
        kind: match light.kind() {
            GltfLightKind::Directional => LightKind::Directional,
            GltfLightKind::Point => LightKind::Point,
            GltfLightKind::Spot { .. } => LightKind::Spot,
        },
        color: light.color(),
        intensity: light.intensity(),
    }
}

fn convert_camera(camera: &gltf::Camera) -> Camera {
    match camera.projection() {
        gltf::camera::Projection::Perspective(p) => Camera::Perspective {
            yfov: p.yfov(),
            znear: p.znear(),
            zfar: p.zfar(),
        },
        gltf::camera::Projection::Orthographic(o) => Camera::Orthographic {
            xmag: o.xmag(),
            ymag: o.ymag(),
            znear: o.znear(),
            zfar: o.zfar(),
        },
    }
}
