//! Image-based lighting precompute.
//!
//! Turns an equirectangular HDR panorama into the four maps the PBR programs
//! sample:
//!
//! - environment cube: the panorama reprojected, drawn as the skybox
//! - irradiance cube: cosine-weighted hemisphere convolution (diffuse)
//! - prefiltered cube: GGX-filtered radiance, one mip level per roughness step (specular)
//! - BRDF LUT: split-sum scale and bias indexed by `(n·v, roughness)`
//!
//! Everything here runs on the CPU once per environment, so it is plain
//! data in and out and independent of the backend.
//!
//! Cube faces are ordered +X, -X, +Y, -Y, +Z, -Z, rows top to bottom.

use std::f32::consts::PI;
use std::path::Path;

use glam::{Vec2, Vec3};

use crate::error::RenderError;

/// A floating-point panorama in equirectangular projection.
#[derive(Clone, Debug)]
pub struct HdrImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec3>,
}

impl HdrImage {
    /// Reads any format the `image` crate decodes (Radiance `.hdr`, OpenEXR,
    /// or LDR images treated as linear).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let image = image::open(path.as_ref())?.to_rgb32f();
        let (width, height) = image.dimensions();
        let pixels = image.pixels().map(|p| Vec3::from(p.0)).collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    fn texel(&self, x: u32, y: u32) -> Vec3 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.pixels[(y * self.width + x) as usize]
    }

    /// Bilinear lookup in the direction `dir`. Wraps horizontally.
    pub fn sample(&self, dir: Vec3) -> Vec3 {
        if self.pixels.is_empty() {
            return Vec3::ZERO;
        }
        let uv = equirect_uv(dir);
        let x = uv.x * self.width as f32 - 0.5;
        let y = (uv.y * self.height as f32 - 0.5).max(0.0);

        let x0 = x.floor();
        let y0 = y.floor();
        let (fx, fy) = (x - x0, y - y0);
        let wrap = |x: f32| (x as i64).rem_euclid(self.width as i64) as u32;
        let (xa, xb) = (wrap(x0), wrap(x0 + 1.0));
        let (ya, yb) = (y0 as u32, y0 as u32 + 1);

        let top = self.texel(xa, ya).lerp(self.texel(xb, ya), fx);
        let bottom = self.texel(xa, yb).lerp(self.texel(xb, yb), fx);
        top.lerp(bottom, fy)
    }
}

/// Six square faces of RGBA texels.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeFaces {
    pub size: u32,
    /// One row-major `size * size` buffer per face.
    pub faces: [Vec<[f32; 4]>; 6],
}

impl CubeFaces {
    /// Fills every texel from a function of its direction.
    pub fn from_fn(size: u32, mut f: impl FnMut(Vec3) -> Vec3) -> Self {
        let size = size.max(1);
        let faces = std::array::from_fn(|face| {
            let mut texels = Vec::with_capacity((size * size) as usize);
            for y in 0..size {
                for x in 0..size {
                    let (u, v) = texel_uv(x, y, size);
                    let color = f(cube_direction(face, u, v));
                    texels.push([color.x, color.y, color.z, 1.0]);
                }
            }
            texels
        });
        Self { size, faces }
    }

    pub fn solid(size: u32, color: Vec3) -> Self {
        Self::from_fn(size, |_| color)
    }

    /// Bilinear lookup within the face `dir` points at.
    pub fn sample(&self, dir: Vec3) -> Vec3 {
        let (face, u, v) = direction_to_face(dir);
        let texels = &self.faces[face];
        let last = self.size as f32 - 1.0;
        let x = ((u + 1.0) * 0.5 * self.size as f32 - 0.5).clamp(0.0, last);
        let y = ((v + 1.0) * 0.5 * self.size as f32 - 0.5).clamp(0.0, last);

        let (x0, y0) = (x.floor() as u32, y.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(self.size - 1), (y0 + 1).min(self.size - 1));
        let (fx, fy) = (x.fract(), y.fract());
        let at = |x: u32, y: u32| {
            let t = texels[(y * self.size + x) as usize];
            Vec3::new(t[0], t[1], t[2])
        };

        let top = at(x0, y0).lerp(at(x1, y0), fx);
        let bottom = at(x0, y1).lerp(at(x1, y1), fx);
        top.lerp(bottom, fy)
    }
}

/// Split-sum BRDF integration table. `x` is n·v, `y` is roughness, both 0..1.
#[derive(Clone, Debug, PartialEq)]
pub struct BrdfLut {
    pub size: u32,
    /// `(scale, bias)` per texel, row-major with roughness increasing downward.
    pub texels: Vec<[f32; 2]>,
}

impl BrdfLut {
    pub fn compute(size: u32, sample_count: u32) -> Self {
        let size = size.max(1);
        let mut texels = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            let roughness = (y as f32 + 0.5) / size as f32;
            for x in 0..size {
                let n_dot_v = (x as f32 + 0.5) / size as f32;
                texels.push(integrate_brdf(n_dot_v, roughness, sample_count).into());
            }
        }
        Self { size, texels }
    }
}

/// Resolution and sample counts for the precompute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IblSettings {
    pub environment_size: u32,
    pub irradiance_size: u32,
    /// Polar steps of the irradiance convolution; azimuth uses twice as many.
    pub irradiance_steps: u32,
    pub prefilter_size: u32,
    pub prefilter_levels: u32,
    pub prefilter_samples: u32,
    pub brdf_lut_size: u32,
    pub brdf_samples: u32,
}

impl Default for IblSettings {
    fn default() -> Self {
        Self {
            environment_size: 256,
            irradiance_size: 16,
            irradiance_steps: 16,
            prefilter_size: 64,
            prefilter_levels: 5,
            prefilter_samples: 64,
            brdf_lut_size: 64,
            brdf_samples: 64,
        }
    }
}

/// All maps of one environment, ready for upload.
#[derive(Clone, Debug)]
pub struct EnvironmentData {
    pub environment: CubeFaces,
    pub irradiance: CubeFaces,
    /// Mip chain, level 0 first; level `i` is filtered for roughness `i / (levels - 1)`.
    pub prefilter: Vec<CubeFaces>,
    pub brdf_lut: BrdfLut,
}

impl EnvironmentData {
    pub fn from_file(path: impl AsRef<Path>, settings: &IblSettings) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let hdr = HdrImage::open(path)?;
        log::debug!(
            "precomputing IBL for '{}' ({}x{})",
            path.display(),
            hdr.width,
            hdr.height
        );
        Ok(Self::from_hdr(&hdr, settings))
    }

    pub fn from_hdr(hdr: &HdrImage, settings: &IblSettings) -> Self {
        let environment = CubeFaces::from_fn(settings.environment_size, |dir| hdr.sample(dir));
        let irradiance =
            convolve_irradiance(&environment, settings.irradiance_size, settings.irradiance_steps);
        let prefilter = prefilter_specular(
            &environment,
            settings.prefilter_size,
            settings.prefilter_levels,
            settings.prefilter_samples,
        );
        let brdf_lut = BrdfLut::compute(settings.brdf_lut_size, settings.brdf_samples);

        Self {
            environment,
            irradiance,
            prefilter,
            brdf_lut,
        }
    }

    /// A constant-radiance environment. All convolutions of a constant are
    /// that constant, so only the LUT is integrated.
    pub fn uniform(color: Vec3, settings: &IblSettings) -> Self {
        Self {
            environment: CubeFaces::solid(1, color),
            irradiance: CubeFaces::solid(1, color),
            prefilter: vec![CubeFaces::solid(1, color)],
            brdf_lut: BrdfLut::compute(settings.brdf_lut_size, settings.brdf_samples),
        }
    }
}

/// Texel center of `(x, y)` in face coordinates, both in -1..1.
fn texel_uv(x: u32, y: u32, size: u32) -> (f32, f32) {
    let u = 2.0 * (x as f32 + 0.5) / size as f32 - 1.0;
    let v = 2.0 * (y as f32 + 0.5) / size as f32 - 1.0;
    (u, v)
}

/// World direction through face coordinates `(u, v)` of `face`.
///
/// `v` grows downward, matching texture rows.
pub fn cube_direction(face: usize, u: f32, v: f32) -> Vec3 {
    let dir = match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    };
    dir.normalize()
}

/// The face `dir` hits and the face coordinates of the hit.
pub fn direction_to_face(dir: Vec3) -> (usize, f32, f32) {
    let a = dir.abs();
    let (face, sc, tc, ma) = if a.x >= a.y && a.x >= a.z {
        if dir.x > 0.0 {
            (0, -dir.z, -dir.y, a.x)
        } else {
            (1, dir.z, -dir.y, a.x)
        }
    } else if a.y >= a.z {
        if dir.y > 0.0 {
            (2, dir.x, dir.z, a.y)
        } else {
            (3, dir.x, -dir.z, a.y)
        }
    } else if dir.z > 0.0 {
        (4, dir.x, -dir.y, a.z)
    } else {
        (5, -dir.x, -dir.y, a.z)
    };

    if ma == 0.0 {
        return (4, 0.0, 0.0);
    }
    (face, sc / ma, tc / ma)
}

/// Panorama coordinates of a direction: u wraps around +Y, v = 0 is straight up.
pub fn equirect_uv(dir: Vec3) -> Vec2 {
    let dir = dir.normalize_or_zero();
    let u = 0.5 + dir.z.atan2(dir.x) / (2.0 * PI);
    let v = dir.y.clamp(-1.0, 1.0).acos() / PI;
    Vec2::new(u, v)
}

/// An orthonormal basis around `n`.
fn tangent_frame(n: Vec3) -> (Vec3, Vec3) {
    let up = if n.y.abs() < 0.999 { Vec3::Y } else { Vec3::Z };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);
    (tangent, bitangent)
}

/// Cosine-weighted hemisphere convolution of `environment`.
pub fn convolve_irradiance(environment: &CubeFaces, size: u32, steps: u32) -> CubeFaces {
    let theta_steps = steps.max(1);
    let phi_steps = theta_steps * 2;
    let d_theta = 0.5 * PI / theta_steps as f32;
    let d_phi = 2.0 * PI / phi_steps as f32;

    CubeFaces::from_fn(size, |n| {
        let (tangent, bitangent) = tangent_frame(n);
        let mut sum = Vec3::ZERO;
        for p in 0..phi_steps {
            let phi = (p as f32 + 0.5) * d_phi;
            for t in 0..theta_steps {
                let theta = (t as f32 + 0.5) * d_theta;
                let local =
                    Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
                let dir = tangent * local.x + bitangent * local.y + n * local.z;
                sum += environment.sample(dir) * theta.cos() * theta.sin();
            }
        }
        sum * PI / (theta_steps * phi_steps) as f32
    })
}

/// GGX-prefiltered mip chain. Sizes halve per level down to 1.
pub fn prefilter_specular(
    environment: &CubeFaces,
    base_size: u32,
    levels: u32,
    sample_count: u32,
) -> Vec<CubeFaces> {
    let levels = levels.max(1);
    (0..levels)
        .map(|level| {
            let size = (base_size >> level).max(1);
            let roughness = if levels > 1 {
                level as f32 / (levels - 1) as f32
            } else {
                0.0
            };
            CubeFaces::from_fn(size, |n| prefilter_texel(environment, n, roughness, sample_count))
        })
        .collect()
}

fn prefilter_texel(environment: &CubeFaces, n: Vec3, roughness: f32, sample_count: u32) -> Vec3 {
    // n = v = r approximation
    let mut sum = Vec3::ZERO;
    let mut weight = 0.0;
    for i in 0..sample_count.max(1) {
        let h = importance_sample_ggx(hammersley(i, sample_count.max(1)), n, roughness);
        let l = (2.0 * n.dot(h) * h - n).normalize_or_zero();
        let n_dot_l = n.dot(l);
        if n_dot_l > 0.0 {
            sum += environment.sample(l) * n_dot_l;
            weight += n_dot_l;
        }
    }
    if weight > 0.0 {
        sum / weight
    } else {
        environment.sample(n)
    }
}

/// Van der Corput radical inverse in base 2.
fn radical_inverse(mut bits: u32) -> f32 {
    bits = bits.rotate_right(16);
    bits = ((bits & 0x5555_5555) << 1) | ((bits & 0xAAAA_AAAA) >> 1);
    bits = ((bits & 0x3333_3333) << 2) | ((bits & 0xCCCC_CCCC) >> 2);
    bits = ((bits & 0x0F0F_0F0F) << 4) | ((bits & 0xF0F0_F0F0) >> 4);
    bits = ((bits & 0x00FF_00FF) << 8) | ((bits & 0xFF00_FF00) >> 8);
    bits as f32 * 2.328_306_4e-10
}

/// Point `i` of an `n`-point Hammersley set.
pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse(i))
}

/// Half vector around `n` distributed by the GGX NDF for `roughness`.
pub fn importance_sample_ggx(xi: Vec2, n: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).max(0.0).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    let h = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);
    let (tangent, bitangent) = tangent_frame(n);
    (tangent * h.x + bitangent * h.y + n * h.z).normalize()
}

fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let k = roughness * roughness / 2.0;
    n_dot_v / (n_dot_v * (1.0 - k) + k)
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness)
}

/// Split-sum scale and bias for one `(n·v, roughness)` pair.
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> Vec2 {
    let n_dot_v = n_dot_v.max(1e-4);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).sqrt(), 0.0, n_dot_v);
    let n = Vec3::Z;
    let count = sample_count.max(1);

    let mut a = 0.0;
    let mut b = 0.0;
    for i in 0..count {
        let h = importance_sample_ggx(hammersley(i, count), n, roughness);
        let l = (2.0 * v.dot(h) * h - v).normalize_or_zero();

        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(h).max(0.0);

        if n_dot_l > 0.0 && n_dot_h > 0.0 {
            let g = geometry_smith(n_dot_v, n_dot_l, roughness);
            let g_vis = g * v_dot_h / (n_dot_h * n_dot_v);
            let fc = (1.0 - v_dot_h).powi(5);
            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }
    Vec2::new(a, b) / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3, tolerance: f32) -> bool {
        (a - b).abs().max_element() <= tolerance
    }

    #[test]
    fn face_lookup_inverts_cube_direction() {
        let samples = [
            (0, 0.3, -0.7),
            (1, -0.2, 0.5),
            (2, 0.9, 0.1),
            (3, -0.4, -0.4),
            (4, 0.0, 0.8),
            (5, 0.6, 0.2),
        ];
        for (face, u, v) in samples {
            let (found, fu, fv) = direction_to_face(cube_direction(face, u, v));
            assert_eq!(found, face);
            assert!((fu - u).abs() < 1e-5 && (fv - v).abs() < 1e-5);
        }
    }

    #[test]
    fn face_centers_point_along_axes() {
        assert_eq!(cube_direction(0, 0.0, 0.0), Vec3::X);
        assert_eq!(cube_direction(3, 0.0, 0.0), Vec3::NEG_Y);
        assert_eq!(cube_direction(5, 0.0, 0.0), Vec3::NEG_Z);
    }

    #[test]
    fn equirect_poles_and_seam() {
        assert!(equirect_uv(Vec3::Y).y.abs() < 1e-6);
        assert!((equirect_uv(Vec3::NEG_Y).y - 1.0).abs() < 1e-6);
        assert!((equirect_uv(Vec3::X).x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn hammersley_starts_at_origin() {
        assert_eq!(hammersley(0, 4), Vec2::ZERO);
        assert_eq!(hammersley(1, 2), Vec2::new(0.5, 0.5));
        assert_eq!(hammersley(2, 4), Vec2::new(0.5, 0.25));
    }

    #[test]
    fn smooth_ggx_samples_the_normal() {
        let n = Vec3::new(1.0, 1.0, 0.0).normalize();
        let h = importance_sample_ggx(Vec2::new(0.3, 0.7), n, 0.0);
        assert!(close(h, n, 1e-5));
    }

    #[test]
    fn smooth_head_on_brdf_is_unit_scale() {
        let lut = integrate_brdf(1.0, 0.0, 16);
        assert!((lut.x - 1.0).abs() < 1e-3, "{lut:?}");
        assert!(lut.y.abs() < 1e-3);
    }

    #[test]
    fn brdf_lut_stays_in_unit_range() {
        let lut = BrdfLut::compute(8, 32);
        assert_eq!(lut.texels.len(), 64);
        for &[scale, bias] in &lut.texels {
            assert!(scale >= 0.0 && bias >= 0.0);
            assert!(scale + bias <= 1.1, "scale {scale} bias {bias}");
        }
    }

    #[test]
    fn constant_environment_convolves_to_itself() {
        let color = Vec3::new(0.5, 1.0, 2.0);
        let env = CubeFaces::solid(4, color);

        let irradiance = convolve_irradiance(&env, 2, 8);
        for face in &irradiance.faces {
            for t in face {
                assert!(close(Vec3::new(t[0], t[1], t[2]), color, 0.02 * 2.0));
            }
        }

        let prefilter = prefilter_specular(&env, 4, 3, 16);
        assert_eq!(prefilter.iter().map(|c| c.size).collect::<Vec<_>>(), vec![4, 2, 1]);
        assert!(close(prefilter[2].sample(Vec3::Y), color, 1e-4));
    }

    #[test]
    fn panorama_reprojects_up_and_down() {
        // top half bright, bottom half dark
        let hdr = HdrImage {
            width: 4,
            height: 2,
            pixels: [vec![Vec3::ONE; 4], vec![Vec3::ZERO; 4]].concat(),
        };
        let cube = CubeFaces::from_fn(2, |dir| hdr.sample(dir));
        assert!(close(cube.sample(Vec3::Y), Vec3::ONE, 1e-4));
        assert!(close(cube.sample(Vec3::NEG_Y), Vec3::ZERO, 1e-4));
    }

    #[test]
    fn uniform_environment_is_single_texel() {
        let data = EnvironmentData::uniform(
            Vec3::splat(0.25),
            &IblSettings {
                brdf_lut_size: 4,
                brdf_samples: 8,
                ..Default::default()
            },
        );
        assert_eq!(data.environment.size, 1);
        assert_eq!(data.prefilter.len(), 1);
        assert_eq!(data.brdf_lut.texels.len(), 16);
    }
}
