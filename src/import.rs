//! Model import: Wavefront OBJ/MTL and STL into CPU-side meshes.
//!
//! The importer never touches the GPU. It produces a [`RawModel`] of
//! [`RawMesh`]es, each with geometry and a [`RawMaterial`] naming the texture
//! files it references; [`Model::load`](crate::Model::load) uploads the
//! result and reads the textures.
//!
//! | Format | Extensions | Materials                    |
//! |--------|------------|------------------------------|
//! | OBJ    | `.obj`     | MTL scalars and texture maps |
//! | STL    | `.stl`     | default analytic material    |
//!
//! MTL texture maps map onto [`TextureRole`]s as follows:
//!
//! | MTL key                 | Role                |
//! |-------------------------|---------------------|
//! | `map_Kd`                | Albedo              |
//! | `map_Bump`, `bump`, `norm` | Normal           |
//! | `map_Ka`, `map_ao`      | AmbientOcclusion    |
//!
//! `map_Pm` and `map_Pr` are greyscale metallic and roughness maps. They are
//! kept apart here and packed into one `MetallicRoughness` texture (metallic
//! in red, smoothness in alpha) when the model is uploaded.

use std::io::{BufRead, Cursor};
use std::path::{Path, PathBuf};

use glam::Vec3;
use thiserror::Error;

use crate::geometry::RawGeometry;
use crate::material::TextureRole;
use crate::mesh::Vertex3d;

/// Errors raised while reading a model file.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown model format: '{0}'")]
    UnknownFormat(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("obj error: {0}")]
    Obj(#[from] tobj::LoadError),
}

/// Post-processing applied to imported geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportOptions {
    /// Flip V so that v = 0 is the top row of a texture.
    pub flip_uvs: bool,
    /// Move the model's bounding-box center to the origin.
    pub centered: bool,
    /// Scale the model to fit a unit cube.
    pub normalized: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            flip_uvs: true,
            centered: false,
            normalized: false,
        }
    }
}

impl ImportOptions {
    pub fn centered(mut self) -> Self {
        self.centered = true;
        self
    }

    pub fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }

    pub fn keep_uvs(mut self) -> Self {
        self.flip_uvs = false;
        self
    }
}

/// Material parameters as read from the file.
#[derive(Clone, Debug, PartialEq)]
pub struct RawMaterial {
    pub base_color: Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub ambient_occlusion: f32,
    /// Texture files by role, resolved against the model's directory.
    pub textures: Vec<(TextureRole, PathBuf)>,
    /// Greyscale metallic map (`map_Pm`).
    pub metallic_map: Option<PathBuf>,
    /// Greyscale roughness map (`map_Pr`).
    pub roughness_map: Option<PathBuf>,
}

impl Default for RawMaterial {
    fn default() -> Self {
        Self {
            base_color: Vec3::splat(0.8),
            roughness: 0.5,
            metallic: 0.0,
            ambient_occlusion: 1.0,
            textures: Vec::new(),
            metallic_map: None,
            roughness_map: None,
        }
    }
}

impl RawMaterial {
    pub fn texture(&self, role: TextureRole) -> Option<&Path> {
        self.textures
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, path)| path.as_path())
    }

    fn from_mtl(material: &tobj::Material, base_dir: &Path) -> Self {
        let mut raw = RawMaterial::default();
        if let Some(diffuse) = material.diffuse {
            raw.base_color = Vec3::from(diffuse);
        }

        let param = |key: &str| material.unknown_param.get(key).map(String::as_str);
        if let Some(value) = param("Pr").and_then(|v| v.trim().parse::<f32>().ok()) {
            raw.roughness = value.clamp(0.0, 1.0);
        }
        if let Some(value) = param("Pm").and_then(|v| v.trim().parse::<f32>().ok()) {
            raw.metallic = value.clamp(0.0, 1.0);
        }

        let maps = [
            (TextureRole::Albedo, material.diffuse_texture.as_deref()),
            (TextureRole::Normal, material.normal_texture.as_deref()),
            (
                TextureRole::AmbientOcclusion,
                material.ambient_texture.as_deref().or_else(|| param("map_ao")),
            ),
        ];
        for (role, map) in maps {
            if let Some(file) = map.and_then(texture_file) {
                raw.textures.push((role, base_dir.join(file)));
            }
        }
        let map = |key: &str| param(key).and_then(texture_file).map(|f| base_dir.join(f));
        raw.metallic_map = map("map_Pm");
        raw.roughness_map = map("map_Pr");

        raw
    }
}

/// A map statement may carry options before the file name (`-bm 0.5 n.png`).
fn texture_file(statement: &str) -> Option<&str> {
    statement.split_whitespace().last()
}

/// One mesh with its material.
#[derive(Clone, Debug)]
pub struct RawMesh {
    pub name: String,
    pub geometry: RawGeometry,
    pub material: RawMaterial,
}

/// Everything read from one model file, meshes in file order.
#[derive(Clone, Debug, Default)]
pub struct RawModel {
    pub meshes: Vec<RawMesh>,
}

impl RawModel {
    pub fn vertex_count(&self) -> u64 {
        self.meshes.iter().map(|m| m.geometry.vertex_count() as u64).sum()
    }

    pub fn face_count(&self) -> u64 {
        self.meshes.iter().map(|m| m.geometry.face_count() as u64).sum()
    }

    /// Bounding box over all meshes.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut bounds: Option<(Vec3, Vec3)> = None;
        for mesh in self.meshes.iter().filter(|m| !m.geometry.is_empty()) {
            let (min, max) = mesh.geometry.bounds();
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(min), hi.max(max)),
                None => (min, max),
            });
        }
        bounds.unwrap_or((Vec3::ZERO, Vec3::ZERO))
    }

    fn apply(&mut self, options: &ImportOptions) {
        if options.centered {
            let (min, max) = self.bounds();
            let center = (min + max) * 0.5;
            for mesh in &mut self.meshes {
                mesh.geometry.translate(-center);
            }
        }

        if options.normalized {
            let (min, max) = self.bounds();
            let max_dim = (max - min).max_element();
            if max_dim > 0.0 {
                for mesh in &mut self.meshes {
                    mesh.geometry.scale(1.0 / max_dim);
                }
            }
        }
    }
}

/// Reads a model file, choosing the format from its extension.
pub fn load(path: &Path, options: &ImportOptions) -> Result<RawModel, ImportError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    let mut model = match ext.as_str() {
        "obj" => load_obj(path, options)?,
        "stl" => {
            let file = std::fs::File::open(path)?;
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("stl");
            parse_stl(&mut std::io::BufReader::new(file), name)?
        }
        _ => return Err(ImportError::UnknownFormat(ext)),
    };

    model.apply(options);
    log::debug!(
        "imported '{}': {} meshes, {} vertices, {} faces",
        path.display(),
        model.meshes.len(),
        model.vertex_count(),
        model.face_count()
    );
    Ok(model)
}

fn obj_load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ignore_lines: true,
        ignore_points: true,
        ..Default::default()
    }
}

fn load_obj(path: &Path, options: &ImportOptions) -> Result<RawModel, ImportError> {
    let (models, materials) = tobj::load_obj(path, &obj_load_options())?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

    let materials = materials.unwrap_or_else(|e| {
        log::warn!("materials of '{}' unavailable: {}", path.display(), e);
        Vec::new()
    });
    Ok(convert_obj(models, &materials, base_dir, options))
}

/// Parses OBJ (and optionally MTL) text held in memory.
///
/// Texture paths are resolved against `base_dir`. Centering and normalizing
/// from `options` are applied.
pub fn load_obj_from_buffers(
    obj: &[u8],
    mtl: Option<&[u8]>,
    base_dir: &Path,
    options: &ImportOptions,
) -> Result<RawModel, ImportError> {
    let (models, materials) =
        tobj::load_obj_buf(&mut Cursor::new(obj), &obj_load_options(), |_| match mtl {
            Some(bytes) => tobj::load_mtl_buf(&mut Cursor::new(bytes)),
            None => Err(tobj::LoadError::OpenFileFailed),
        })?;

    let materials = materials.unwrap_or_default();
    let mut model = convert_obj(models, &materials, base_dir, options);
    model.apply(options);
    Ok(model)
}

fn convert_obj(
    models: Vec<tobj::Model>,
    materials: &[tobj::Material],
    base_dir: &Path,
    options: &ImportOptions,
) -> RawModel {
    let meshes = models
        .into_iter()
        .filter(|m| !m.mesh.indices.is_empty())
        .map(|model| {
            let material = model
                .mesh
                .material_id
                .and_then(|id| materials.get(id))
                .map(|m| RawMaterial::from_mtl(m, base_dir))
                .unwrap_or_default();

            RawMesh {
                geometry: obj_geometry(&model.mesh, options),
                name: model.name,
                material,
            }
        })
        .collect();

    RawModel { meshes }
}

fn obj_geometry(mesh: &tobj::Mesh, options: &ImportOptions) -> RawGeometry {
    let vertex_count = mesh.positions.len() / 3;
    let has_normals = mesh.normals.len() == mesh.positions.len();
    let has_uvs = mesh.texcoords.len() / 2 == vertex_count;

    let vertices = (0..vertex_count)
        .map(|i| {
            let position = [
                mesh.positions[i * 3],
                mesh.positions[i * 3 + 1],
                mesh.positions[i * 3 + 2],
            ];
            let normal = if has_normals {
                [
                    mesh.normals[i * 3],
                    mesh.normals[i * 3 + 1],
                    mesh.normals[i * 3 + 2],
                ]
            } else {
                [0.0, 0.0, 0.0]
            };
            let uv = if has_uvs {
                [mesh.texcoords[i * 2], mesh.texcoords[i * 2 + 1]]
            } else {
                [0.0, 0.0]
            };
            Vertex3d::new(position, normal, uv)
        })
        .collect();

    let mut geometry = RawGeometry::new(vertices, mesh.indices.clone());
    if !has_normals {
        geometry.recalculate_normals();
    }
    if has_uvs && options.flip_uvs {
        geometry.flip_uvs();
    }
    geometry.compute_tangents();
    geometry
}

/// Parses binary or ASCII STL held in memory into a single mesh.
pub fn load_stl_bytes(bytes: &[u8], options: &ImportOptions) -> Result<RawModel, ImportError> {
    let mut model = parse_stl(&mut Cursor::new(bytes), "stl")?;
    model.apply(options);
    Ok(model)
}

fn parse_stl<R>(reader: &mut R, name: &str) -> Result<RawModel, ImportError>
where
    R: BufRead + std::io::Seek,
{
    let stl = stl_io::read_stl(reader).map_err(|e| ImportError::Parse(format!("stl: {e}")))?;

    let mut vertices = Vec::with_capacity(stl.faces.len() * 3);
    let mut indices = Vec::with_capacity(stl.faces.len() * 3);

    // faces keep their own vertices so the face normal stays flat
    for (i, face) in stl.faces.iter().enumerate() {
        let normal: [f32; 3] = face.normal.into();
        for &vertex_idx in &face.vertices {
            let vertex = stl.vertices.get(vertex_idx).ok_or_else(|| {
                ImportError::Parse(format!("stl: face {i} references vertex {vertex_idx}"))
            })?;
            vertices.push(Vertex3d::new((*vertex).into(), normal, [0.0, 0.0]));
        }

        let base = (i * 3) as u32;
        indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    let mut geometry = RawGeometry::new(vertices, indices);
    geometry.compute_tangents();

    Ok(RawModel {
        meshes: vec![RawMesh {
            name: name.to_string(),
            geometry,
            material: RawMaterial::default(),
        }],
    })
}
