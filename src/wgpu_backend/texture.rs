use wgpu::util::DeviceExt;

use crate::backend::TextureResource;
use crate::gpu::GpuContext;
use crate::material::TextureRole;

/// A material texture resident on the GPU.
#[derive(Debug)]
pub struct WgpuTexture {
    texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    role: TextureRole,
}

impl WgpuTexture {
    /// Uploads an RGBA8 image. Color roles are stored as sRGB so sampling
    /// returns linear values; data roles (normals, roughness) are stored raw.
    pub fn from_image(
        gpu: &GpuContext,
        image: &image::RgbaImage,
        role: TextureRole,
        label: &str,
    ) -> Self {
        let (width, height) = image.dimensions();
        // an empty image still needs one texel
        let data: &[u8] = if image.is_empty() {
            &[255; 4]
        } else {
            image.as_raw()
        };
        let format = if role.is_srgb() {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            role,
        }
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

impl TextureResource for WgpuTexture {
    fn role(&self) -> TextureRole {
        self.role
    }
}

/// 1x1 stand-ins bound to slots a program declares but nobody filled.
pub(crate) struct Placeholders {
    pub flat: wgpu::TextureView,
    pub cube: wgpu::TextureView,
}

impl Placeholders {
    pub fn new(gpu: &GpuContext) -> Self {
        let flat = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some("Placeholder Texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );

        let cube = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some("Placeholder Cube"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[0; 24],
        );

        Self {
            flat: flat.create_view(&wgpu::TextureViewDescriptor::default()),
            cube: cube.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Placeholder Cube View"),
                dimension: Some(wgpu::TextureViewDimension::Cube),
                ..Default::default()
            }),
        }
    }

    pub fn for_dimension(&self, dimension: wgpu::TextureViewDimension) -> &wgpu::TextureView {
        match dimension {
            wgpu::TextureViewDimension::Cube => &self.cube,
            _ => &self.flat,
        }
    }
}

/// IEEE 754 binary16 bits of `value`, rounding to nearest.
pub(crate) fn f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        let nan = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }

    let half_exponent = exponent - 127 + 15;
    if half_exponent >= 0x1f {
        return sign | 0x7c00;
    }

    if half_exponent <= 0 {
        if half_exponent < -10 {
            return sign;
        }
        // subnormal: shift the mantissa, implicit bit included
        let full = mantissa | 0x0080_0000;
        let shift = (14 - half_exponent) as u32;
        let half = full >> shift;
        let round = (full >> (shift - 1)) & 1;
        return sign | (half + round) as u16;
    }

    let half = ((half_exponent as u32) << 10) | (mantissa >> 13);
    let round = (mantissa >> 12) & 1;
    // a carry out of the mantissa correctly bumps the exponent
    sign | (half + round) as u16
}

/// Packs float texels into little-endian binary16 bytes.
pub(crate) fn pack_f16(values: impl IntoIterator<Item = f32>) -> Vec<u8> {
    values
        .into_iter()
        .flat_map(|v| f16_bits(v).to_le_bytes())
        .collect()
}
