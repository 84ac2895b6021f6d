//! Vertex format, transforms and the mesh/model types submitted to the composer.
//!
//! - [`Vertex3d`]: the vertex format shared by every program
//! - [`Transform`]: translation, rotation and scale combined into a model matrix
//! - [`Mesh`]: backend geometry plus a material
//! - [`Model`]: an ordered list of meshes loaded from one file, with a transform
//!
//! # Vertex Layout
//!
//! [`Vertex3d`] is 48 bytes:
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | normal    | Float32x3 | 12     | 1               |
//! | uv        | Float32x2 | 24     | 2               |
//! | tangent   | Float32x4 | 32     | 3               |
//!
//! The tangent's `w` holds the bitangent sign.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::backend::{GeometryResource, RenderBackend, TextureResource};
use crate::import::{self, ImportOptions, RawMaterial};
use crate::material::{AnalyticMaterial, Material, TextureRole, TexturedMaterial};

/// A vertex with position, normal, texture coordinates and tangent.
///
/// # Example
///
/// ```
/// use irradiant::Vertex3d;
///
/// let vertex = Vertex3d::new([0.0, 1.0, 0.0], [0.0, 1.0, 0.0], [0.5, 0.5]);
/// assert_eq!(vertex.tangent, [1.0, 0.0, 0.0, 1.0]);
/// ```
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    /// Tangent in `xyz`, bitangent handedness in `w`.
    pub tangent: [f32; 4],
}

impl Vertex3d {
    /// The wgpu vertex buffer layout for this vertex type.
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
            // tangent
            wgpu::VertexAttribute {
                offset: 32,
                shader_location: 3,
                format: wgpu::VertexFormat::Float32x4,
            },
        ],
    };

    /// Creates a vertex with a default +X tangent.
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent: [1.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Position, rotation and scale for placing a model in the world.
///
/// [`Transform::matrix`] applies scale, then rotation, then translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the rotation from Euler angles in radians.
    ///
    /// The resulting matrix is `Rz * Rx * Ry`: a vertex is rotated about Y
    /// first, then X, then Z.
    pub fn euler(mut self, angles: Vec3) -> Self {
        self.rotation = Quat::from_euler(EulerRot::ZXY, angles.z, angles.x, angles.y);
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Backend geometry with the material it is drawn with.
pub struct Mesh<B: RenderBackend> {
    pub name: String,
    pub geometry: B::Geometry,
    pub material: Material<B::Texture>,
    /// Bounding-box center in model space.
    pub center: Vec3,
}

impl<B: RenderBackend> Mesh<B> {
    pub fn new(
        name: impl Into<String>,
        geometry: B::Geometry,
        material: Material<B::Texture>,
    ) -> Self {
        Self {
            name: name.into(),
            geometry,
            material,
            center: Vec3::ZERO,
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.geometry.vertex_count()
    }

    pub fn face_count(&self) -> u32 {
        self.geometry.face_count()
    }
}

/// An ordered list of meshes sharing one transform.
///
/// Mesh order is the order the importer produced them in, which is what
/// level-of-detail selection indexes into.
///
/// # Example
///
/// ```no_run
/// use irradiant::{ImportOptions, Model, Transform, WgpuBackend};
/// use glam::Vec3;
///
/// # fn load(backend: &mut WgpuBackend) {
/// let helmet = Model::load(backend, "assets/helmet.obj", &ImportOptions::default().centered())
///     .with_transform(
///         Transform::new()
///             .position(Vec3::new(0.0, 1.0, 0.0))
///             .euler(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0))
///             .uniform_scale(2.0),
///     );
///
/// for mesh in &helmet.meshes {
///     println!("{}: {} faces", mesh.name, mesh.face_count());
/// }
/// # }
/// ```
pub struct Model<B: RenderBackend> {
    pub meshes: Vec<Mesh<B>>,
    pub transform: Transform,
}

impl<B: RenderBackend> Default for Model<B> {
    fn default() -> Self {
        Self {
            meshes: Vec::new(),
            transform: Transform::default(),
        }
    }
}

impl<B: RenderBackend> Model<B> {
    pub fn new(meshes: Vec<Mesh<B>>) -> Self {
        Self {
            meshes,
            transform: Transform::default(),
        }
    }

    /// Imports a model file and uploads it through `backend`.
    ///
    /// The format follows the extension (`.obj` with its `.mtl`, or `.stl`).
    /// Each mesh gets a textured material when at least one of its textures
    /// could be read, and an analytic material built from the MTL scalars
    /// otherwise. Texture files are read once per model and shared.
    ///
    /// # Degraded content
    ///
    /// - A file that cannot be imported yields a model with no meshes.
    /// - A texture that cannot be read is left out of its material.
    /// - A lone metallic or roughness map is packed with the other scalar.
    ///
    /// All of these are logged at `warn`.
    pub fn load(backend: &mut B, path: impl AsRef<Path>, options: &ImportOptions) -> Self {
        let path = path.as_ref();
        let raw = match import::load(path, options) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("couldn't read scene '{}': {}", path.display(), e);
                return Self::default();
            }
        };

        let mut textures = TextureCache::default();
        let meshes: Vec<_> = raw
            .meshes
            .into_iter()
            .map(|mesh| {
                let material = textures.material(backend, &mesh.material);
                let center = mesh.geometry.center();
                let geometry = mesh.geometry.upload(backend);
                Mesh {
                    name: mesh.name,
                    geometry,
                    material,
                    center,
                }
            })
            .collect();

        log::debug!(
            "loaded '{}': {} meshes, {} textures",
            path.display(),
            meshes.len(),
            textures.texture_count()
        );
        Self::new(meshes)
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn matrix(&self) -> Mat4 {
        self.transform.matrix()
    }

    pub fn vertex_count(&self) -> u64 {
        self.meshes.iter().map(|m| m.vertex_count() as u64).sum()
    }

    pub fn face_count(&self) -> u64 {
        self.meshes.iter().map(|m| m.face_count() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Textures shared between the meshes of one model.
///
/// Files are keyed by path. A file used both as color and as data is
/// uploaded once per color space.
struct TextureCache<T> {
    loaded: HashMap<PathBuf, Vec<Rc<T>>>,
    packed: HashMap<PackedKey, Rc<T>>,
    failed: Vec<PathBuf>,
}

/// Inputs of a packed metallic/smoothness texture. The scalars only matter
/// when the matching map is absent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PackedKey {
    metallic_map: Option<PathBuf>,
    roughness_map: Option<PathBuf>,
    metallic: u32,
    roughness: u32,
}

impl<T> Default for TextureCache<T> {
    fn default() -> Self {
        Self {
            loaded: HashMap::new(),
            packed: HashMap::new(),
            failed: Vec::new(),
        }
    }
}

impl<T: TextureResource> TextureCache<T> {
    fn material<B>(&mut self, backend: &mut B, raw: &RawMaterial) -> Material<T>
    where
        B: RenderBackend<Texture = T>,
    {
        let mut textured = TexturedMaterial::new();
        for (role, path) in &raw.textures {
            if let Some(texture) = self.get_or_load(backend, path, *role) {
                textured.insert(*role, texture);
            }
        }
        if let Some(texture) = self.metallic_smooth(backend, raw) {
            textured.insert(TextureRole::MetallicRoughness, texture);
        }

        if textured.is_empty() {
            Material::Analytic(AnalyticMaterial {
                albedo: raw.base_color,
                roughness: raw.roughness,
                metallic: raw.metallic,
                ambient_occlusion: raw.ambient_occlusion,
            })
        } else {
            Material::Textured(textured)
        }
    }

    fn texture_count(&self) -> usize {
        self.loaded.values().map(Vec::len).sum::<usize>() + self.packed.len()
    }

    fn get_or_load<B>(
        &mut self,
        backend: &mut B,
        path: &Path,
        role: TextureRole,
    ) -> Option<Rc<T>>
    where
        B: RenderBackend<Texture = T>,
    {
        let cached = self
            .loaded
            .get(path)
            .and_then(|all| all.iter().find(|t| t.role().is_srgb() == role.is_srgb()));
        if let Some(texture) = cached {
            return Some(Rc::clone(texture));
        }

        let image = self.open(path)?.to_rgba8();
        let label = path.file_name().and_then(|n| n.to_str()).unwrap_or("texture");
        let texture = Rc::new(backend.create_texture(&image, role, label));
        self.loaded
            .entry(path.to_path_buf())
            .or_default()
            .push(Rc::clone(&texture));
        Some(texture)
    }

    /// Packs the material's metallic and roughness maps into one texture.
    /// A missing or unreadable map is replaced by the material's scalar.
    fn metallic_smooth<B>(&mut self, backend: &mut B, raw: &RawMaterial) -> Option<Rc<T>>
    where
        B: RenderBackend<Texture = T>,
    {
        if raw.metallic_map.is_none() && raw.roughness_map.is_none() {
            return None;
        }

        let key = PackedKey {
            metallic_map: raw.metallic_map.clone(),
            roughness_map: raw.roughness_map.clone(),
            metallic: raw.metallic.to_bits(),
            roughness: raw.roughness.to_bits(),
        };
        if let Some(texture) = self.packed.get(&key) {
            return Some(Rc::clone(texture));
        }

        let mut grey = |path: &Option<PathBuf>| {
            path.as_deref()
                .and_then(|p| self.open(p))
                .map(|img| img.to_luma8())
                .filter(|img| img.width() > 0 && img.height() > 0)
        };
        let metallic = grey(&raw.metallic_map);
        let roughness = grey(&raw.roughness_map);
        if metallic.is_none() && roughness.is_none() {
            return None;
        }

        let image = pack_metallic_smooth(
            metallic.as_ref().map_or(Channel::Value(raw.metallic), Channel::Map),
            roughness.as_ref().map_or(Channel::Value(raw.roughness), Channel::Map),
        );
        let texture = Rc::new(backend.create_texture(
            &image,
            TextureRole::MetallicRoughness,
            "metallic_smooth",
        ));
        self.packed.insert(key, Rc::clone(&texture));
        Some(texture)
    }

    /// Decodes an image file. Failures are logged once per path.
    fn open(&mut self, path: &Path) -> Option<image::DynamicImage> {
        if self.failed.iter().any(|p| p == path) {
            return None;
        }
        match image::open(path) {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("skipping texture '{}': {}", path.display(), e);
                self.failed.push(path.to_path_buf());
                None
            }
        }
    }
}

/// One input channel of [`pack_metallic_smooth`].
enum Channel<'a> {
    Map(&'a image::GrayImage),
    Value(f32),
}

impl Channel<'_> {
    /// Value at `(x, y)` of a `width` x `height` output, nearest texel.
    fn sample(&self, x: u32, y: u32, width: u32, height: u32) -> u8 {
        match self {
            Channel::Map(map) => {
                let mx = (x as u64 * map.width() as u64 / width as u64) as u32;
                let my = (y as u64 * map.height() as u64 / height as u64) as u32;
                map.get_pixel(mx, my)[0]
            }
            Channel::Value(value) => (value.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }
}

/// Metallic in red, smoothness in alpha. The output takes the size of the
/// metallic map, else the roughness map, else 1x1.
fn pack_metallic_smooth(metallic: Channel<'_>, roughness: Channel<'_>) -> image::RgbaImage {
    let (width, height) = match (&metallic, &roughness) {
        (Channel::Map(map), _) | (_, Channel::Map(map)) => map.dimensions(),
        _ => (1, 1),
    };
    image::RgbaImage::from_fn(width, height, |x, y| {
        let m = metallic.sample(x, y, width, height);
        let smoothness = 255 - roughness.sample(x, y, width, height);
        image::Rgba([m, 0, 0, smoothness])
    })
}
