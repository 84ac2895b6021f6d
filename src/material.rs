//! Surface descriptions for PBR shading.
//!
//! A [`Material`] is either a set of scalar parameters or a set of textures
//! tagged by [`TextureRole`]. Never both: the composer picks the shader
//! variant from which one it is.

use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec3;

/// What a texture feeds into the lighting model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureRole {
    /// Base color (sRGB).
    Albedo,
    /// Tangent-space normal map.
    Normal,
    /// Metallic in red, smoothness (1 - roughness) in alpha.
    MetallicRoughness,
    AmbientOcclusion,
    /// Legacy diffuse tag. Accepted on textures but never bound by the PBR programs.
    Diffuse,
}

impl TextureRole {
    /// Whether texels of this role are color data rather than linear parameters.
    pub fn is_srgb(self) -> bool {
        matches!(self, TextureRole::Albedo | TextureRole::Diffuse)
    }
}

/// Scalar PBR parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyticMaterial {
    pub albedo: Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub ambient_occlusion: f32,
}

impl Default for AnalyticMaterial {
    fn default() -> Self {
        Self {
            albedo: Vec3::splat(0.8),
            roughness: 0.5,
            metallic: 0.0,
            ambient_occlusion: 1.0,
        }
    }
}

impl AnalyticMaterial {
    pub fn new(albedo: Vec3) -> Self {
        Self {
            albedo,
            ..Default::default()
        }
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn with_ambient_occlusion(mut self, ambient_occlusion: f32) -> Self {
        self.ambient_occlusion = ambient_occlusion.clamp(0.0, 1.0);
        self
    }
}

/// Role-tagged textures. Textures are shared (`Rc`) between materials
/// that reference the same image.
pub struct TexturedMaterial<T> {
    textures: BTreeMap<TextureRole, Rc<T>>,
}

impl<T> Clone for TexturedMaterial<T> {
    fn clone(&self) -> Self {
        Self {
            textures: self.textures.clone(),
        }
    }
}

impl<T> Default for TexturedMaterial<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TexturedMaterial<T> {
    pub fn new() -> Self {
        Self {
            textures: BTreeMap::new(),
        }
    }

    pub fn with(mut self, role: TextureRole, texture: Rc<T>) -> Self {
        self.insert(role, texture);
        self
    }

    /// Sets the texture for a role, returning the one it replaced.
    pub fn insert(&mut self, role: TextureRole, texture: Rc<T>) -> Option<Rc<T>> {
        self.textures.insert(role, texture)
    }

    pub fn get(&self, role: TextureRole) -> Option<&T> {
        self.textures.get(&role).map(Rc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn roles(&self) -> impl Iterator<Item = TextureRole> + '_ {
        self.textures.keys().copied()
    }
}

/// How a surface is shaded.
pub enum Material<T> {
    Analytic(AnalyticMaterial),
    Textured(TexturedMaterial<T>),
}

impl<T> Clone for Material<T> {
    fn clone(&self) -> Self {
        match self {
            Material::Analytic(m) => Material::Analytic(*m),
            Material::Textured(m) => Material::Textured(m.clone()),
        }
    }
}

impl<T> Default for Material<T> {
    fn default() -> Self {
        Material::Analytic(AnalyticMaterial::default())
    }
}

impl<T> From<AnalyticMaterial> for Material<T> {
    fn from(material: AnalyticMaterial) -> Self {
        Material::Analytic(material)
    }
}

impl<T> From<TexturedMaterial<T>> for Material<T> {
    fn from(material: TexturedMaterial<T>) -> Self {
        Material::Textured(material)
    }
}

impl<T> std::fmt::Debug for Material<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Material::Analytic(m) => f.debug_tuple("Analytic").field(m).finish(),
            Material::Textured(m) => f
                .debug_tuple("Textured")
                .field(&m.roles().collect::<Vec<_>>())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_parameters_are_clamped() {
        let m = AnalyticMaterial::new(Vec3::ONE)
            .with_roughness(2.0)
            .with_metallic(-1.0);
        assert_eq!(m.roughness, 1.0);
        assert_eq!(m.metallic, 0.0);
    }

    #[test]
    fn textures_are_shared_between_clones() {
        let tex = Rc::new(7u32);
        let material = TexturedMaterial::new().with(TextureRole::Albedo, Rc::clone(&tex));
        let copy = material.clone();
        assert_eq!(Rc::strong_count(&tex), 3);
        assert_eq!(copy.get(TextureRole::Albedo), Some(&7));
        assert_eq!(copy.get(TextureRole::Normal), None);
    }

    #[test]
    fn debug_lists_roles() {
        let material: Material<u32> =
            TexturedMaterial::new().with(TextureRole::Normal, Rc::new(1)).into();
        assert_eq!(format!("{material:?}"), "Textured([Normal])");
    }
}
