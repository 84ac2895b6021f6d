//! Material dispatch: which program a material draws with, which textures go
//! to which slots, and which scalar uniforms are set.
//!
//! Pure selection with no backend calls, so the composer's scene loop and
//! the tests share one source of truth for the slot layout.

use crate::backend::{ProgramKind, Uniform};
use crate::material::{AnalyticMaterial, Material, TextureRole};

/// Irradiance cube slot during the lit pass.
pub const IRRADIANCE_SLOT: u32 = 0;
/// Prefiltered specular cube slot during the lit pass.
pub const PREFILTER_SLOT: u32 = 1;
/// BRDF integration table slot during the lit pass.
pub const BRDF_LUT_SLOT: u32 = 2;
/// Environment cube slot during the skybox draw.
pub const ENVIRONMENT_SLOT: u32 = 0;
/// Source frame slot during a post pass.
pub const FRAME_SLOT: u32 = 0;

/// Material texture roles in binding order, with their slot and sampler uniform.
///
/// Slots 0..=2 belong to the environment maps.
pub const MATERIAL_TEXTURE_SLOTS: [(TextureRole, u32, &str); 4] = [
    (TextureRole::Albedo, 3, "u_TextureAlbedo"),
    (TextureRole::Normal, 4, "u_TextureNormal"),
    (TextureRole::MetallicRoughness, 5, "u_TextureMetallicSmooth"),
    (TextureRole::AmbientOcclusion, 6, "u_TextureAmbient"),
];

/// One material texture to bind.
#[derive(Debug)]
pub struct TextureBinding<'a, T> {
    pub role: TextureRole,
    pub slot: u32,
    pub uniform: &'static str,
    pub texture: &'a T,
}

/// The outcome of [`dispatch`].
#[derive(Debug)]
pub enum MaterialBinding<'a, T> {
    /// Textures present on the material, in table order.
    Textured { textures: Vec<TextureBinding<'a, T>> },
    /// Scalar uniforms for the analytic program.
    Analytic { uniforms: [(&'static str, Uniform); 4] },
}

impl<T> MaterialBinding<'_, T> {
    pub fn program(&self) -> ProgramKind {
        match self {
            MaterialBinding::Textured { .. } => ProgramKind::PbrTextured,
            MaterialBinding::Analytic { .. } => ProgramKind::PbrAnalytic,
        }
    }
}

/// Selects the program and bindings for a material.
///
/// Roles missing from a textured material produce no binding. Roles
/// without a slot in [`MATERIAL_TEXTURE_SLOTS`] are never bound.
pub fn dispatch<T>(material: &Material<T>) -> MaterialBinding<'_, T> {
    match material {
        Material::Textured(textured) => {
            let textures = MATERIAL_TEXTURE_SLOTS
                .iter()
                .filter_map(|&(role, slot, uniform)| {
                    textured.get(role).map(|texture| TextureBinding {
                        role,
                        slot,
                        uniform,
                        texture,
                    })
                })
                .collect();
            MaterialBinding::Textured { textures }
        }
        Material::Analytic(analytic) => MaterialBinding::Analytic {
            uniforms: analytic_uniforms(analytic),
        },
    }
}

fn analytic_uniforms(material: &AnalyticMaterial) -> [(&'static str, Uniform); 4] {
    [
        ("u_Albedo", Uniform::Float3(material.albedo)),
        ("u_Roughness", Uniform::Float(material.roughness)),
        ("u_Metallic", Uniform::Float(material.metallic)),
        ("u_Ambient", Uniform::Float(material.ambient_occlusion)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::TexturedMaterial;
    use glam::Vec3;
    use std::rc::Rc;

    fn slots<T>(binding: &MaterialBinding<'_, T>) -> Vec<u32> {
        match binding {
            MaterialBinding::Textured { textures } => textures.iter().map(|t| t.slot).collect(),
            MaterialBinding::Analytic { .. } => Vec::new(),
        }
    }

    #[test]
    fn full_texture_set_binds_slots_three_to_six_in_order() {
        let material: Material<&str> = TexturedMaterial::new()
            .with(TextureRole::AmbientOcclusion, Rc::new("ao"))
            .with(TextureRole::Albedo, Rc::new("albedo"))
            .with(TextureRole::MetallicRoughness, Rc::new("mr"))
            .with(TextureRole::Normal, Rc::new("normal"))
            .into();

        let binding = dispatch(&material);
        assert_eq!(binding.program(), ProgramKind::PbrTextured);
        assert_eq!(slots(&binding), vec![3, 4, 5, 6]);

        let MaterialBinding::Textured { textures } = binding else {
            panic!("expected textured binding");
        };
        assert_eq!(*textures[0].texture, "albedo");
        assert_eq!(textures[2].uniform, "u_TextureMetallicSmooth");
    }

    #[test]
    fn missing_roles_are_skipped() {
        let material: Material<u8> = TexturedMaterial::new()
            .with(TextureRole::Normal, Rc::new(1))
            .into();
        assert_eq!(slots(&dispatch(&material)), vec![4]);
    }

    #[test]
    fn empty_textured_material_still_uses_textured_program() {
        let material: Material<u8> = TexturedMaterial::new().into();
        let binding = dispatch(&material);
        assert_eq!(binding.program(), ProgramKind::PbrTextured);
        assert!(slots(&binding).is_empty());
    }

    #[test]
    fn diffuse_role_is_never_bound() {
        let material: Material<u8> = TexturedMaterial::new()
            .with(TextureRole::Diffuse, Rc::new(1))
            .into();
        assert!(slots(&dispatch(&material)).is_empty());
    }

    #[test]
    fn analytic_material_sets_four_scalars() {
        let material: Material<u8> = AnalyticMaterial::new(Vec3::new(1.0, 0.0, 0.0))
            .with_roughness(0.25)
            .into();
        let binding = dispatch(&material);
        assert_eq!(binding.program(), ProgramKind::PbrAnalytic);

        let MaterialBinding::Analytic { uniforms } = binding else {
            panic!("expected analytic binding");
        };
        assert_eq!(uniforms[0], ("u_Albedo", Uniform::Float3(Vec3::X)));
        assert_eq!(uniforms[1], ("u_Roughness", Uniform::Float(0.25)));
    }

    #[test]
    fn material_slots_do_not_overlap_environment_slots() {
        for (_, slot, _) in MATERIAL_TEXTURE_SLOTS {
            assert!(slot > BRDF_LUT_SLOT);
        }
    }
}
