use wgpu::TextureViewDimension as Dim;
use wgpu::util::DeviceExt;

use super::geometry::WgpuGeometry;
use super::texture::pack_f16;
use crate::backend::{EnvironmentMapKind, EnvironmentResource};
use crate::error::RenderError;
use crate::geometry::RawGeometry;
use crate::gpu::GpuContext;
use crate::ibl::{BrdfLut, CubeFaces, EnvironmentData};

const CUBE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
const LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

/// Uploaded IBL maps plus the skybox cube.
pub struct WgpuEnvironment {
    environment: wgpu::TextureView,
    irradiance: wgpu::TextureView,
    prefilter: wgpu::TextureView,
    brdf_lut: wgpu::TextureView,
    skybox: WgpuGeometry,
}

impl WgpuEnvironment {
    pub fn new(gpu: &GpuContext, data: &EnvironmentData) -> Result<Self, RenderError> {
        let environment = upload_cube(
            gpu,
            "Environment Cube",
            std::slice::from_ref(&data.environment),
        )?;
        let irradiance = upload_cube(
            gpu,
            "Irradiance Cube",
            std::slice::from_ref(&data.irradiance),
        )?;
        let prefilter = upload_cube(gpu, "Prefilter Cube", usable_mips(&data.prefilter))?;
        let brdf_lut = upload_lut(gpu, &data.brdf_lut);
        let skybox = WgpuGeometry::from_raw(gpu, &RawGeometry::cube());

        Ok(Self {
            environment,
            irradiance,
            prefilter,
            brdf_lut,
            skybox,
        })
    }

    pub(crate) fn view(&self, map: EnvironmentMapKind) -> (&wgpu::TextureView, Dim) {
        match map {
            EnvironmentMapKind::Environment => (&self.environment, Dim::Cube),
            EnvironmentMapKind::Irradiance => (&self.irradiance, Dim::Cube),
            EnvironmentMapKind::Prefilter => (&self.prefilter, Dim::Cube),
            EnvironmentMapKind::BrdfLut => (&self.brdf_lut, Dim::D2),
        }
    }
}

impl EnvironmentResource for WgpuEnvironment {
    type Geometry = WgpuGeometry;

    fn skybox_geometry(&self) -> &WgpuGeometry {
        &self.skybox
    }
}

/// The longest prefix of `levels` that forms a valid mip chain: each level
/// half the size of the previous one, down to 1.
fn usable_mips(levels: &[CubeFaces]) -> &[CubeFaces] {
    let Some(base) = levels.first() else {
        return levels;
    };
    let count = levels
        .iter()
        .enumerate()
        .take_while(|(i, level)| *i < 32 && base.size >> i > 0 && level.size == base.size >> i)
        .count();
    if count < levels.len() {
        log::warn!(
            "prefilter chain has {} levels, only {count} fit a {}px cube",
            levels.len(),
            base.size
        );
    }
    &levels[..count]
}

/// Uploads `mips` (level 0 first) as one cube texture.
fn upload_cube(
    gpu: &GpuContext,
    label: &str,
    mips: &[CubeFaces],
) -> Result<wgpu::TextureView, RenderError> {
    let Some(base) = mips.first() else {
        return Err(RenderError::TargetCreation(format!("{label}: no cube levels")));
    };

    // layer-major: every mip of face 0, then face 1, ...
    let data = pack_f16((0..6).flat_map(move |face| {
        mips.iter()
            .flat_map(move |level| level.faces[face].iter().flatten().copied())
    }));

    let texture = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: base.size,
                height: base.size,
                depth_or_array_layers: 6,
            },
            mip_level_count: mips.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CUBE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &data,
    );

    Ok(texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(Dim::Cube),
        ..Default::default()
    }))
}

fn upload_lut(gpu: &GpuContext, lut: &BrdfLut) -> wgpu::TextureView {
    let size = lut.size.max(1);
    let data = pack_f16(lut.texels.iter().flatten().copied());

    gpu.device
        .create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some("BRDF LUT"),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: LUT_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        )
        .create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn keeps_a_proper_chain() {
        let chain: Vec<_> = [8, 4, 2, 1]
            .into_iter()
            .map(|size| CubeFaces::solid(size, Vec3::ONE))
            .collect();
        assert_eq!(usable_mips(&chain).len(), 4);
    }

    #[test]
    fn drops_levels_past_one_texel() {
        let chain: Vec<_> = [4, 2, 1, 1, 1]
            .into_iter()
            .map(|size| CubeFaces::solid(size, Vec3::ONE))
            .collect();
        assert_eq!(usable_mips(&chain).len(), 3);
    }

    #[test]
    fn stops_at_a_size_mismatch() {
        let chain: Vec<_> = [8, 4, 3]
            .into_iter()
            .map(|size| CubeFaces::solid(size, Vec3::ONE))
            .collect();
        assert_eq!(usable_mips(&chain).len(), 2);
    }
}
