//! CPU-side geometry before upload.
//!
//! [`RawGeometry`] is the intermediate form between an importer (or a
//! primitive generator) and the backend: vertices can be moved, scaled,
//! re-normaled and given tangents before
//! [`RawGeometry::upload`] hands them to a [`RenderBackend`].
//!
//! # Primitives
//!
//! | Constructor                      | Use                                  |
//! |----------------------------------|--------------------------------------|
//! | [`RawGeometry::cube`]            | skybox and test geometry             |
//! | [`RawGeometry::sphere`]          | material previews                    |
//! | [`RawGeometry::plane`]           | ground planes                        |
//! | [`RawGeometry::fullscreen_quad`] | every post-process pass              |
//!
//! All primitives wind counter-clockwise.

use glam::{Vec2, Vec3};

use crate::backend::RenderBackend;
use crate::mesh::Vertex3d;

/// Raw geometry data before GPU upload.
///
/// Vertices and indices are plain `Vec`s and can be edited freely. Call
/// [`compute_tangents`](Self::compute_tangents) after changing positions or
/// UVs of geometry that will be normal-mapped.
///
/// # Example
///
/// ```
/// use irradiant::RawGeometry;
/// use glam::Vec3;
///
/// let mut sphere = RawGeometry::sphere(32, 16);
/// sphere.scale(2.0);
/// sphere.translate(Vec3::new(0.0, 1.0, 0.0));
///
/// let (min, max) = sphere.bounds();
/// assert!((max.y - min.y - 2.0).abs() < 1e-4);
/// assert_eq!(sphere.face_count() as usize, sphere.indices.len() / 3);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawGeometry {
    pub vertices: Vec<Vertex3d>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

impl RawGeometry {
    pub fn new(vertices: Vec<Vertex3d>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn face_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Computes the axis-aligned bounding box as `(min, max)`.
    ///
    /// Empty geometry reports a zero-sized box at the origin.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        if self.vertices.is_empty() {
            return (Vec3::ZERO, Vec3::ZERO);
        }

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for v in &self.vertices {
            let p = Vec3::from(v.position);
            min = min.min(p);
            max = max.max(p);
        }

        (min, max)
    }

    pub fn center(&self) -> Vec3 {
        let (min, max) = self.bounds();
        (min + max) * 0.5
    }

    pub fn translate(&mut self, offset: Vec3) {
        for v in &mut self.vertices {
            v.position = (Vec3::from(v.position) + offset).into();
        }
    }

    /// Scales all vertices uniformly around the origin.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.vertices {
            v.position = (Vec3::from(v.position) * factor).into();
        }
    }

    /// Flips the V texture coordinate (`v = 1 - v`).
    pub fn flip_uvs(&mut self) {
        for v in &mut self.vertices {
            v.uv[1] = 1.0 - v.uv[1];
        }
    }

    /// Recalculates smooth vertex normals by averaging area-weighted face normals.
    pub fn recalculate_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = [0.0, 0.0, 0.0];
        }

        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if i0.max(i1).max(i2) >= self.vertices.len() {
                continue;
            }

            let p0 = Vec3::from(self.vertices[i0].position);
            let p1 = Vec3::from(self.vertices[i1].position);
            let p2 = Vec3::from(self.vertices[i2].position);
            let face_normal = (p1 - p0).cross(p2 - p0);

            for i in [i0, i1, i2] {
                let n = Vec3::from(self.vertices[i].normal) + face_normal;
                self.vertices[i].normal = n.into();
            }
        }

        for v in &mut self.vertices {
            v.normal = Vec3::from(v.normal).normalize_or_zero().into();
        }
    }

    /// Computes per-vertex tangents from positions and UVs.
    ///
    /// Tangents are accumulated per triangle, Gram-Schmidt orthogonalized
    /// against the normal, and given a handedness in `w`. Vertices whose UVs
    /// are degenerate keep an arbitrary tangent perpendicular to the normal.
    pub fn compute_tangents(&mut self) {
        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        let mut bitangents = vec![Vec3::ZERO; self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if i0.max(i1).max(i2) >= self.vertices.len() {
                continue;
            }
            let (v0, v1, v2) = (&self.vertices[i0], &self.vertices[i1], &self.vertices[i2]);

            let e1 = Vec3::from(v1.position) - Vec3::from(v0.position);
            let e2 = Vec3::from(v2.position) - Vec3::from(v0.position);
            let d1 = Vec2::from(v1.uv) - Vec2::from(v0.uv);
            let d2 = Vec2::from(v2.uv) - Vec2::from(v0.uv);

            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let t = (e1 * d2.y - e2 * d1.y) * r;
            let b = (e2 * d1.x - e1 * d2.x) * r;

            for i in [i0, i1, i2] {
                tangents[i] += t;
                bitangents[i] += b;
            }
        }

        for (i, v) in self.vertices.iter_mut().enumerate() {
            let n = Vec3::from(v.normal);
            let t = (tangents[i] - n * n.dot(tangents[i])).normalize_or_zero();
            let t = if t == Vec3::ZERO { n.any_orthonormal_vector() } else { t };
            let w = if n.cross(t).dot(bitangents[i]) < 0.0 { -1.0 } else { 1.0 };
            v.tangent = [t.x, t.y, t.z, w];
        }
    }

    /// Uploads this geometry through a backend.
    pub fn upload<B: RenderBackend>(&self, backend: &mut B) -> B::Geometry {
        backend.create_geometry(&self.vertices, &self.indices)
    }

    /// A unit cube centered at the origin, with per-face normals.
    pub fn cube() -> Self {
        #[rustfmt::skip]
        let vertices = vec![
            // Front face (Z+)
            Vertex3d::new([-0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 1.0]),
            Vertex3d::new([ 0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 1.0]),
            Vertex3d::new([ 0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 0.0]),
            Vertex3d::new([-0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 0.0]),
            // Back face (Z-)
            Vertex3d::new([ 0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 1.0]),
            Vertex3d::new([-0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 1.0]),
            Vertex3d::new([-0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 0.0]),
            // Top face (Y+)
            Vertex3d::new([-0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [0.0, 1.0]),
            Vertex3d::new([ 0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([ 0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([-0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [0.0, 0.0]),
            // Bottom face (Y-)
            Vertex3d::new([-0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [0.0, 1.0]),
            Vertex3d::new([ 0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([ 0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([-0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [0.0, 0.0]),
            // Right face (X+)
            Vertex3d::new([ 0.5, -0.5,  0.5], [ 1.0,  0.0,  0.0], [0.0, 1.0]),
            Vertex3d::new([ 0.5, -0.5, -0.5], [ 1.0,  0.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([ 0.5,  0.5, -0.5], [ 1.0,  0.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5,  0.5], [ 1.0,  0.0,  0.0], [0.0, 0.0]),
            // Left face (X-)
            Vertex3d::new([-0.5, -0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 1.0]),
            Vertex3d::new([-0.5, -0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-0.5,  0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([-0.5,  0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 0.0]),
        ];

        #[rustfmt::skip]
        let indices: Vec<u32> = vec![
            0,  1,  2,  2,  3,  0,  // front
            4,  5,  6,  6,  7,  4,  // back
            8,  9,  10, 10, 11, 8,  // top
            12, 13, 14, 14, 15, 12, // bottom
            16, 17, 18, 18, 19, 16, // right
            20, 21, 22, 22, 23, 20, // left
        ];

        let mut geometry = Self::new(vertices, indices);
        geometry.compute_tangents();
        geometry
    }

    /// A UV sphere of radius 0.5 centered at the origin.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                let uv = [seg as f32 / segments as f32, ring as f32 / rings as f32];
                vertices.push(Vertex3d::new([x * 0.5, y * 0.5, z * 0.5], [x, y, z], uv));
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;

                indices.extend_from_slice(&[current, current + 1, next]);
                indices.extend_from_slice(&[current + 1, next + 1, next]);
            }
        }

        let mut geometry = Self::new(vertices, indices);
        geometry.compute_tangents();
        geometry
    }

    /// A square on the XZ plane facing +Y.
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        let vertices = vec![
            Vertex3d::new([-half, 0.0, -half], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([-half, 0.0, half], [0.0, 1.0, 0.0], [0.0, 1.0]),
            Vertex3d::new([half, 0.0, half], [0.0, 1.0, 0.0], [1.0, 1.0]),
            Vertex3d::new([half, 0.0, -half], [0.0, 1.0, 0.0], [1.0, 0.0]),
        ];
        let indices = vec![0, 1, 2, 2, 3, 0];

        let mut geometry = Self::new(vertices, indices);
        geometry.compute_tangents();
        geometry
    }

    /// The clip-space quad drawn by post-process passes.
    ///
    /// Four vertices at z = 0 covering [-1, 1]², indices `0 1 2 0 2 3`. UVs
    /// follow the texture convention of the backend: v = 0 at the top.
    pub fn fullscreen_quad() -> Self {
        let n = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex3d::new([-1.0, -1.0, 0.0], n, [0.0, 1.0]),
            Vertex3d::new([1.0, -1.0, 0.0], n, [1.0, 1.0]),
            Vertex3d::new([1.0, 1.0, 0.0], n, [1.0, 0.0]),
            Vertex3d::new([-1.0, 1.0, 0.0], n, [0.0, 0.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 0, 2, 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_geometry_bounds() {
        let vertices = vec![
            Vertex3d::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([-1.0, -1.0, -1.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
        ];
        let geom = RawGeometry::new(vertices, vec![0, 1, 2]);

        let (min, max) = geom.bounds();
        assert_eq!(min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn empty_geometry_has_zero_bounds() {
        let geom = RawGeometry::default();
        assert_eq!(geom.center(), Vec3::ZERO);
        assert!(geom.is_empty());
    }

    #[test]
    fn fullscreen_quad_layout() {
        let quad = RawGeometry::fullscreen_quad();
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(quad.face_count(), 2);
        // top-left of clip space samples the top-left texel
        assert_eq!(quad.vertices[3].uv, [0.0, 0.0]);
    }

    #[test]
    fn cube_counts() {
        let cube = RawGeometry::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.face_count(), 12);
    }

    #[test]
    fn plane_tangent_follows_u() {
        let plane = RawGeometry::plane(2.0);
        for v in &plane.vertices {
            let t = Vec3::new(v.tangent[0], v.tangent[1], v.tangent[2]);
            assert!((t - Vec3::X).length() < 1e-5, "tangent {t:?}");
            assert_eq!(v.tangent[3].abs(), 1.0);
        }
    }

    #[test]
    fn tangents_are_perpendicular_to_normals() {
        let sphere = RawGeometry::sphere(16, 8);
        for v in &sphere.vertices {
            let n = Vec3::from(v.normal);
            let t = Vec3::new(v.tangent[0], v.tangent[1], v.tangent[2]);
            if n.length() > 0.5 {
                assert!(n.dot(t).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn flip_uvs_inverts_v() {
        let mut quad = RawGeometry::fullscreen_quad();
        quad.flip_uvs();
        assert_eq!(quad.vertices[0].uv, [0.0, 0.0]);
        assert_eq!(quad.vertices[3].uv, [0.0, 1.0]);
    }

    #[test]
    fn recalculated_normals_face_out_of_ccw_triangle() {
        let vertices = vec![
            Vertex3d::new([0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex3d::new([0.0, 1.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0]),
        ];
        let mut geom = RawGeometry::new(vertices, vec![0, 1, 2]);
        geom.recalculate_normals();
        assert_eq!(Vec3::from(geom.vertices[0].normal), Vec3::Z);
    }
}
