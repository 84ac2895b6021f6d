//! Frame composition: the multisampled lit pass, its resolve and the
//! ping-ponged post-process chain.
//!
//! # Frame lifecycle
//!
//! ```text
//! begin_scene ──► submit_mesh / submit_model / submit_model_lod ──► end_scene
//!                                                                       │
//!                          color_grade / invert_color (any number) ◄────┘
//!                                                                       │
//!                                   frame_texture_id / frame_target ◄───┘
//! ```
//!
//! [`Composer::begin_scene`] returns a [`SceneFrame`] that mutably borrows the
//! composer. A second `begin_scene`, a `resize` or a post pass cannot start
//! until the frame has been ended.
//!
//! # Targets
//!
//! | Target       | Samples                       | Depth | Written by         |
//! |--------------|-------------------------------|-------|--------------------|
//! | multisample  | [`ComposerConfig::sample_count`] | yes | lit pass, skybox |
//! | intermediate | 1                             | no    | resolve, post      |
//! | final        | 1                             | no    | post               |

use glam::{Mat4, Vec3, Vec4};

use crate::backend::{
    ColorTextureId, EnvironmentMapKind, EnvironmentResource, FrameTarget, FrameTargetSettings,
    GeometryResource, ProgramKind, RenderBackend, Uniform,
};
use crate::camera::{CameraView, SceneCamera};
use crate::dispatch::{
    self, BRDF_LUT_SLOT, ENVIRONMENT_SLOT, FRAME_SLOT, IRRADIANCE_SLOT, MaterialBinding,
    PREFILTER_SLOT,
};
use crate::error::RenderError;
use crate::geometry::RawGeometry;
use crate::material::Material;
use crate::mesh::{Mesh, Model};
use crate::post::{PingPong, PostEffect, PostTargets};

/// Target resolution, multisampling and clear color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComposerConfig {
    pub width: u32,
    pub height: u32,
    /// Samples per pixel of the scene target. 1 disables multisampling.
    pub sample_count: u32,
    pub clear_color: Vec4,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            sample_count: 4,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }
}

impl ComposerConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count.max(1);
        self
    }

    pub fn with_clear_color(mut self, clear_color: Vec4) -> Self {
        self.clear_color = clear_color;
        self
    }
}

/// The single point light of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightInfo {
    pub position: Vec3,
    pub color: Vec3,
}

impl Default for LightInfo {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 5.0, 5.0),
            color: Vec3::splat(300.0),
        }
    }
}

/// Counters for the current frame, reset by `begin_scene`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub vertex_count: u64,
    pub face_count: u64,
    pub draw_calls: u32,
}

struct Programs<P> {
    pbr_textured: P,
    pbr_analytic: P,
    skybox: P,
    color_grade: P,
    invert_color: P,
}

impl<P> Programs<P> {
    fn compile<B>(backend: &mut B, sample_count: u32) -> Result<Self, RenderError>
    where
        B: RenderBackend<Program = P>,
    {
        let mut compile = |kind: ProgramKind| {
            let samples = if kind.is_scene_pass() { sample_count } else { 1 };
            backend.compile_program(kind, samples).inspect_err(|e| {
                log::error!("{e}");
            })
        };

        Ok(Self {
            pbr_textured: compile(ProgramKind::PbrTextured)?,
            pbr_analytic: compile(ProgramKind::PbrAnalytic)?,
            skybox: compile(ProgramKind::Skybox)?,
            color_grade: compile(ProgramKind::ColorGrade)?,
            invert_color: compile(ProgramKind::InvertColor)?,
        })
    }

    fn get(&self, kind: ProgramKind) -> &P {
        match kind {
            ProgramKind::PbrTextured => &self.pbr_textured,
            ProgramKind::PbrAnalytic => &self.pbr_analytic,
            ProgramKind::Skybox => &self.skybox,
            ProgramKind::ColorGrade => &self.color_grade,
            ProgramKind::InvertColor => &self.invert_color,
        }
    }
}

/// Owns the frame targets and programs and turns submitted meshes into a
/// finished frame.
///
/// A composer holds three targets of the configured size:
///
/// | Target         | Samples      | Depth | Role                                |
/// |----------------|--------------|-------|-------------------------------------|
/// | multisample    | sample count | yes   | scene pass (meshes, then skybox)    |
/// | intermediate   | 1            | no    | resolve destination, post ping/pong |
/// | final          | 1            | no    | post ping/pong                      |
///
/// Each frame runs [`begin_scene`](Self::begin_scene), any number of
/// submissions, [`SceneFrame::end_scene`], then zero or more post passes.
/// [`frame_target`](Self::frame_target) names whichever of the two
/// single-sample targets holds the latest result.
///
/// # Example
///
/// ```no_run
/// use irradiant::*;
///
/// # fn main() -> Result<(), RenderError> {
/// let gpu = GpuContext::headless(640, 480)?;
/// let config = ComposerConfig::new(640, 480).with_sample_count(4);
/// let mut composer = Composer::new(WgpuBackend::new(gpu), config)?;
///
/// let data = EnvironmentData::uniform(glam::Vec3::splat(0.5), &IblSettings::default());
/// let environment = composer.backend_mut().create_environment(&data)?;
///
/// let frame = composer.begin_scene(&Camera::default(), &environment, LightInfo::default());
/// let stats = frame.end_scene();
/// assert_eq!(stats.draw_calls, 1); // the skybox
///
/// composer.invert_color();
/// let texture = composer.frame_texture_id();
/// # let _ = texture;
/// # Ok(())
/// # }
/// ```
pub struct Composer<B: RenderBackend> {
    backend: B,
    config: ComposerConfig,
    programs: Programs<B::Program>,
    multisample: B::Target,
    post_targets: PostTargets<B::Target>,
    quad: B::Geometry,
    ping_pong: PingPong,
    stats: RendererStats,
}

impl<B: RenderBackend> Composer<B> {
    /// Compiles the programs and allocates the three frame targets.
    ///
    /// Fails if any program does not compile or a target cannot be created.
    pub fn new(mut backend: B, config: ComposerConfig) -> Result<Self, RenderError> {
        let programs = Programs::compile(&mut backend, config.sample_count)?;

        let multisample = backend.create_target(
            FrameTargetSettings::new(config.width, config.height)
                .with_depth()
                .multisampled(config.sample_count),
        )?;
        let intermediate =
            backend.create_target(FrameTargetSettings::new(config.width, config.height))?;
        let final_target =
            backend.create_target(FrameTargetSettings::new(config.width, config.height))?;

        let quad = RawGeometry::fullscreen_quad().upload(&mut backend);

        log::debug!(
            "composer ready: {}x{}, {} samples",
            config.width,
            config.height,
            config.sample_count
        );

        Ok(Self {
            backend,
            config,
            programs,
            multisample,
            post_targets: PostTargets::new(intermediate, final_target),
            quad,
            ping_pong: PingPong::default(),
            stats: RendererStats::default(),
        })
    }

    /// Resizes all three targets. Zero-sized requests (a minimized window) are ignored.
    ///
    /// If the backend rejects the new size, the error is logged and the
    /// targets are put back at the previous size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("ignoring resize to {width}x{height}");
            return;
        }
        if width == self.config.width && height == self.config.height {
            return;
        }

        if let Err(e) = self.resize_targets(width, height) {
            let (old_width, old_height) = (self.config.width, self.config.height);
            log::error!(
                "resize to {width}x{height} failed, keeping {old_width}x{old_height}: {e}"
            );
            if let Err(e) = self.resize_targets(old_width, old_height) {
                log::error!("couldn't restore {old_width}x{old_height} targets: {e}");
            }
            return;
        }
        self.config.width = width;
        self.config.height = height;
    }

    fn resize_targets(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.backend.resize_target(&mut self.multisample, width, height)?;
        for target in self.post_targets.iter_mut() {
            self.backend.resize_target(target, width, height)?;
        }
        Ok(())
    }

    /// Starts a frame.
    ///
    /// Snapshots the camera, resets statistics and ping-pong state, and
    /// returns the frame to submit meshes into.
    pub fn begin_scene<'r, C>(
        &mut self,
        camera: &C,
        environment: &'r B::Environment,
        light: LightInfo,
    ) -> SceneFrame<'_, 'r, B>
    where
        C: SceneCamera + ?Sized,
    {
        self.stats = RendererStats::default();
        self.ping_pong = PingPong::default();

        SceneFrame {
            composer: self,
            camera: CameraView::of(camera),
            environment,
            light,
            queue: Vec::new(),
        }
    }

    /// Multiplies the current frame by `color`.
    pub fn color_grade(&mut self, color: Vec4) {
        self.post_pass(PostEffect::ColorGrade(color));
    }

    /// Inverts the colors of the current frame.
    pub fn invert_color(&mut self) {
        self.post_pass(PostEffect::Invert);
    }

    /// Runs one post pass from the last written target into the other one.
    pub fn post_pass(&mut self, effect: PostEffect) {
        let (source, destination) = self.post_targets.pair(self.ping_pong);

        self.backend.bind_target(Some(destination));
        self.backend.clear(self.config.clear_color);
        self.backend.bind_target_color(source, FRAME_SLOT);
        self.backend.use_program(self.programs.get(effect.program()));
        self.backend.set_uniform("u_Frame", Uniform::Int(FRAME_SLOT as i32));
        if let Some((name, value)) = effect.uniforms() {
            self.backend.set_uniform(name, value);
        }
        self.backend.draw_indexed(&self.quad);
        self.stats.draw_calls += 1;

        self.ping_pong = self.ping_pong.flipped();
        self.backend.bind_target(None);
    }

    pub fn statistics(&self) -> RendererStats {
        self.stats
    }

    /// Color texture id of the target holding the finished frame.
    pub fn frame_texture_id(&self) -> ColorTextureId {
        self.frame_target().color_texture_id()
    }

    /// The target holding the finished frame.
    pub fn frame_target(&self) -> &B::Target {
        self.post_targets.get(self.ping_pong)
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// `[multisample, intermediate, final]`.
    pub fn targets(&self) -> [&B::Target; 3] {
        [
            &self.multisample,
            self.post_targets.intermediate(),
            self.post_targets.final_target(),
        ]
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend access for resource creation between frames.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The backend together with the finished frame, for handing the frame
    /// to a presentation call.
    pub fn backend_and_frame(&mut self) -> (&mut B, &B::Target) {
        (&mut self.backend, self.post_targets.get(self.ping_pong))
    }
}

/// One queued draw.
struct Drawable<'r, B: RenderBackend> {
    geometry: &'r B::Geometry,
    material: &'r Material<B::Texture>,
    model_transform: Mat4,
}

/// A frame in progress.
///
/// Holds the submission queue and borrows the [`Composer`] until
/// [`SceneFrame::end_scene`]. Dropping a frame without ending it draws nothing.
///
/// Submissions only record what to draw. Meshes are drawn in submission
/// order when the frame ends, followed by the skybox and the resolve.
///
/// # Example
///
/// ```no_run
/// # use irradiant::*;
/// # fn frame(
/// #     composer: &mut Composer<WgpuBackend>,
/// #     environment: &WgpuEnvironment,
/// #     ship: &Model<WgpuBackend>,
/// #     marker: &Mesh<WgpuBackend>,
/// # ) {
/// let camera = Camera::new().at(0.0, 2.0, 6.0).looking_at(0.0, 0.0, 0.0);
/// let mut frame = composer.begin_scene(&camera, environment, LightInfo::default());
///
/// // the first two meshes are the highest level of detail
/// frame.submit_model_lod(ship, 0, 2);
/// frame.submit_mesh(marker, glam::Mat4::from_translation(glam::Vec3::Y));
///
/// let stats = frame.end_scene();
/// println!("{} faces in {} draws", stats.face_count, stats.draw_calls);
/// # }
/// ```
#[must_use = "a scene frame draws nothing until end_scene is called"]
pub struct SceneFrame<'c, 'r, B: RenderBackend> {
    composer: &'c mut Composer<B>,
    camera: CameraView,
    environment: &'r B::Environment,
    light: LightInfo,
    queue: Vec<Drawable<'r, B>>,
}

impl<'c, 'r, B: RenderBackend> SceneFrame<'c, 'r, B> {
    /// Queues one mesh with an explicit model matrix.
    pub fn submit_mesh(&mut self, mesh: &'r Mesh<B>, transform: Mat4) {
        self.push(mesh, transform);
    }

    /// Queues every mesh of a model with the model's transform.
    pub fn submit_model(&mut self, model: &'r Model<B>) {
        let transform = model.matrix();
        for mesh in &model.meshes {
            self.push(mesh, transform);
        }
    }

    /// Queues the meshes of one level of detail.
    ///
    /// Level `lod` is the mesh range `[lod * meshes_per_lod, (lod + 1) * meshes_per_lod)`.
    /// Indices past the end of the model are skipped.
    pub fn submit_model_lod(&mut self, model: &'r Model<B>, lod: usize, meshes_per_lod: usize) {
        let start = lod.saturating_mul(meshes_per_lod);
        let end = start.saturating_add(meshes_per_lod);
        let transform = model.matrix();

        for mesh in model.meshes.iter().take(end).skip(start) {
            self.push(mesh, transform);
        }
    }

    fn push(&mut self, mesh: &'r Mesh<B>, model_transform: Mat4) {
        let stats = &mut self.composer.stats;
        stats.vertex_count += mesh.geometry.vertex_count() as u64;
        stats.face_count += mesh.geometry.face_count() as u64;

        self.queue.push(Drawable {
            geometry: &mesh.geometry,
            material: &mesh.material,
            model_transform,
        });
    }

    /// Number of drawables queued so far.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn statistics(&self) -> RendererStats {
        self.composer.stats
    }

    /// Draws the queue and the skybox into the multisampled target and
    /// resolves it into the intermediate target.
    pub fn end_scene(self) -> RendererStats {
        let SceneFrame {
            composer,
            camera,
            environment,
            light,
            queue,
        } = self;
        let Composer {
            backend,
            config,
            programs,
            multisample,
            post_targets,
            stats,
            ..
        } = composer;

        backend.bind_target(Some(&*multisample));
        backend.clear(config.clear_color);

        backend.bind_environment(environment, EnvironmentMapKind::Irradiance, IRRADIANCE_SLOT);
        backend.bind_environment(environment, EnvironmentMapKind::Prefilter, PREFILTER_SLOT);
        backend.bind_environment(environment, EnvironmentMapKind::BrdfLut, BRDF_LUT_SLOT);

        for drawable in &queue {
            let binding = dispatch::dispatch(drawable.material);
            backend.use_program(programs.get(binding.program()));

            match &binding {
                MaterialBinding::Textured { textures } => {
                    for bound in textures {
                        backend.bind_texture(bound.texture, bound.slot);
                        backend.set_uniform(bound.uniform, Uniform::Int(bound.slot as i32));
                    }
                }
                MaterialBinding::Analytic { uniforms } => {
                    for (name, value) in uniforms {
                        backend.set_uniform(name, *value);
                    }
                }
            }

            backend.set_uniform("u_Projection", Uniform::Mat4(camera.projection));
            backend.set_uniform("u_View", Uniform::Mat4(camera.view));
            backend.set_uniform("u_Model", Uniform::Mat4(drawable.model_transform));
            backend.set_uniform("u_LightPos", Uniform::Float3(light.position));
            backend.set_uniform("u_LightColor", Uniform::Float3(light.color));
            backend.set_uniform("u_CameraPos", Uniform::Float3(camera.position));
            backend.set_uniform("u_IrradianceMap", Uniform::Int(IRRADIANCE_SLOT as i32));
            backend.set_uniform("u_PrefilterMap", Uniform::Int(PREFILTER_SLOT as i32));
            backend.set_uniform("u_BrdfLutTexture", Uniform::Int(BRDF_LUT_SLOT as i32));

            backend.draw_indexed(drawable.geometry);
            stats.draw_calls += 1;
        }

        // background last so it only fills pixels no mesh covered
        backend.bind_environment(environment, EnvironmentMapKind::Environment, ENVIRONMENT_SLOT);
        backend.use_program(programs.get(ProgramKind::Skybox));
        backend.set_uniform("u_Projection", Uniform::Mat4(camera.projection));
        backend.set_uniform("u_View", Uniform::Mat4(camera.view));
        backend.set_uniform("u_EnvironmentMap", Uniform::Int(ENVIRONMENT_SLOT as i32));
        backend.draw_indexed(environment.skybox_geometry());
        stats.draw_calls += 1;

        drop(queue);

        backend.blit(multisample, post_targets.intermediate());
        backend.bind_target(None);

        *stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Call, RecordingBackend};
    use crate::camera::Camera;
    use crate::material::{AnalyticMaterial, TextureRole, TexturedMaterial};
    use std::rc::Rc;

    fn composer() -> Composer<RecordingBackend> {
        match Composer::new(RecordingBackend::new(), ComposerConfig::default()) {
            Ok(composer) => composer,
            Err(e) => panic!("recording backend never fails: {e}"),
        }
    }

    fn mesh(
        composer: &Composer<RecordingBackend>,
        vertices: u32,
        faces: u32,
    ) -> Mesh<RecordingBackend> {
        Mesh::new(
            "mesh",
            composer.backend().geometry(vertices, faces),
            Material::default(),
        )
    }

    fn model(composer: &Composer<RecordingBackend>, meshes: u32) -> Model<RecordingBackend> {
        Model::new((0..meshes).map(|i| mesh(composer, 10 + i, 1)).collect())
    }

    fn drawn(calls: &[Call]) -> Vec<u32> {
        calls
            .iter()
            .filter_map(|c| match c {
                Call::Draw(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn init_compiles_five_programs_and_three_targets() {
        let composer = composer();
        let calls = &composer.backend().calls;

        let compiled: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::CompileProgram(kind, samples) => Some((*kind, *samples)),
                _ => None,
            })
            .collect();
        assert_eq!(compiled.len(), 5);
        assert!(compiled.contains(&(ProgramKind::PbrTextured, 4)));
        assert!(compiled.contains(&(ProgramKind::ColorGrade, 1)));

        let [ms, intermediate, final_target] = composer.targets();
        assert!(ms.settings().has_depth);
        assert_eq!(ms.settings().samples(), 4);
        assert_eq!(intermediate.settings().samples(), 1);
        assert!(!final_target.settings().has_depth);
        assert_eq!((ms.width(), ms.height()), (1920, 1080));
    }

    #[test]
    fn program_failure_is_fatal() {
        let mut backend = RecordingBackend::new();
        backend.fail_program = Some(ProgramKind::Skybox);
        let result = Composer::new(backend, ComposerConfig::default());
        assert!(matches!(
            result,
            Err(RenderError::ShaderCompilation {
                program: "skybox",
                ..
            })
        ));
    }

    #[test]
    fn stats_sum_submissions_and_reset_next_frame() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let a = mesh(&composer, 100, 40);
        let b = mesh(&composer, 30, 10);
        let camera = Camera::default();

        let mut frame = composer.begin_scene(&camera, &env, LightInfo::default());
        frame.submit_mesh(&a, Mat4::IDENTITY);
        frame.submit_mesh(&b, Mat4::IDENTITY);
        frame.submit_mesh(&a, Mat4::IDENTITY);
        let stats = frame.end_scene();

        assert_eq!(stats.vertex_count, 230);
        assert_eq!(stats.face_count, 90);
        assert_eq!(composer.statistics(), stats);

        let frame = composer.begin_scene(&camera, &env, LightInfo::default());
        assert_eq!(frame.statistics(), RendererStats::default());
        frame.end_scene();
    }

    #[test]
    fn draw_calls_are_drawables_plus_skybox() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let scene = model(&composer, 3);
        let camera = Camera::default();

        let mut frame = composer.begin_scene(&camera, &env, LightInfo::default());
        frame.submit_model(&scene);
        assert_eq!(frame.queued(), 3);
        assert_eq!(frame.end_scene().draw_calls, 4);
    }

    #[test]
    fn empty_frame_clears_draws_skybox_and_resolves() {
        let mut composer = composer();
        let env = composer.backend().environment();
        composer.backend_mut().clear_calls();
        let [ms_id, intermediate_id] = {
            let [ms, intermediate, _] = composer.targets();
            [ms.id, intermediate.id]
        };

        let stats = composer
            .begin_scene(&Camera::default(), &env, LightInfo::default())
            .end_scene();
        assert_eq!(stats.draw_calls, 1);

        let calls = &composer.backend().calls;
        assert_eq!(calls[0], Call::BindTarget(Some(ms_id)));
        assert!(matches!(calls[1], Call::Clear(_)));
        assert_eq!(drawn(calls), vec![env.skybox.id]);
        assert_eq!(
            &calls[calls.len() - 2..],
            &[Call::Blit(ms_id, intermediate_id), Call::BindTarget(None)]
        );
    }

    #[test]
    fn ibl_maps_are_bound_to_reserved_slots_before_drawing() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let a = mesh(&composer, 3, 1);
        composer.backend_mut().clear_calls();

        let mut frame = composer.begin_scene(&Camera::default(), &env, LightInfo::default());
        frame.submit_mesh(&a, Mat4::IDENTITY);
        frame.end_scene();

        let calls = &composer.backend().calls;
        assert_eq!(
            &calls[2..5],
            &[
                Call::BindEnvironment(EnvironmentMapKind::Irradiance, 0),
                Call::BindEnvironment(EnvironmentMapKind::Prefilter, 1),
                Call::BindEnvironment(EnvironmentMapKind::BrdfLut, 2),
            ]
        );
        let skybox_bind = calls
            .iter()
            .position(|c| *c == Call::BindEnvironment(EnvironmentMapKind::Environment, 0));
        let mesh_draw = calls.iter().position(|c| *c == Call::Draw(a.geometry.id));
        assert!(mesh_draw < skybox_bind);
    }

    #[test]
    fn lod_selects_a_contiguous_range() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let five = model(&composer, 5);
        let three = model(&composer, 3);
        let ids = |m: &Model<RecordingBackend>| -> Vec<u32> {
            m.meshes.iter().map(|mesh| mesh.geometry.id).collect()
        };
        composer.backend_mut().clear_calls();

        let mut frame = composer.begin_scene(&Camera::default(), &env, LightInfo::default());
        frame.submit_model_lod(&five, 1, 2);
        frame.submit_model_lod(&three, 1, 2);
        frame.submit_model_lod(&three, 7, 2);
        let stats = frame.end_scene();

        let five_ids = ids(&five);
        let three_ids = ids(&three);
        assert_eq!(
            drawn(&composer.backend().calls),
            vec![five_ids[2], five_ids[3], three_ids[2], env.skybox.id]
        );
        assert_eq!(stats.vertex_count, (10 + 2) + (10 + 3) + (10 + 2));
    }

    #[test]
    fn submission_order_is_draw_order() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let a = mesh(&composer, 3, 1);
        let b = mesh(&composer, 3, 1);
        composer.backend_mut().clear_calls();

        let mut frame = composer.begin_scene(&Camera::default(), &env, LightInfo::default());
        frame.submit_mesh(&b, Mat4::IDENTITY);
        frame.submit_mesh(&a, Mat4::IDENTITY);
        frame.submit_mesh(&b, Mat4::IDENTITY);
        frame.end_scene();

        assert_eq!(
            drawn(&composer.backend().calls),
            vec![b.geometry.id, a.geometry.id, b.geometry.id, env.skybox.id]
        );
    }

    #[test]
    fn empty_textured_material_binds_no_material_textures() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let textured = Mesh::new(
            "bare",
            composer.backend().geometry(3, 1),
            TexturedMaterial::new().into(),
        );
        composer.backend_mut().clear_calls();

        let mut frame = composer.begin_scene(&Camera::default(), &env, LightInfo::default());
        frame.submit_mesh(&textured, Mat4::IDENTITY);
        frame.end_scene();

        let backend = composer.backend();
        assert_eq!(
            backend.programs_used(),
            vec![ProgramKind::PbrTextured, ProgramKind::Skybox]
        );
        assert!(backend.texture_binds().is_empty());
        assert_eq!(backend.draws(), 2);
    }

    #[test]
    fn textured_material_binds_present_roles_only() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let image = image::RgbaImage::new(1, 1);
        let albedo = Rc::new(composer.backend_mut().create_texture(
            &image,
            TextureRole::Albedo,
            "albedo",
        ));
        let ao = Rc::new(composer.backend_mut().create_texture(
            &image,
            TextureRole::AmbientOcclusion,
            "ao",
        ));
        let material = TexturedMaterial::new()
            .with(TextureRole::AmbientOcclusion, ao)
            .with(TextureRole::Albedo, albedo);
        let textured = Mesh::new("t", composer.backend().geometry(3, 1), material.into());
        composer.backend_mut().clear_calls();

        let mut frame = composer.begin_scene(&Camera::default(), &env, LightInfo::default());
        frame.submit_mesh(&textured, Mat4::IDENTITY);
        frame.end_scene();

        let backend = composer.backend();
        assert_eq!(
            backend.texture_binds(),
            vec![("albedo".to_string(), 3), ("ao".to_string(), 6)]
        );
        assert_eq!(backend.uniform("u_TextureAmbient"), Some(Uniform::Int(6)));
        assert_eq!(backend.uniform("u_TextureNormal"), None);
    }

    #[test]
    fn analytic_material_sets_scalars_and_frame_uniforms() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let red = Mesh::new(
            "red",
            composer.backend().geometry(3, 1),
            AnalyticMaterial::new(Vec3::X).with_metallic(1.0).into(),
        );
        let camera = Camera::default().at(1.0, 2.0, 3.0);
        let light = LightInfo {
            position: Vec3::new(9.0, 9.0, 9.0),
            color: Vec3::ONE,
        };
        let model = Mat4::from_translation(Vec3::Y);

        let mut frame = composer.begin_scene(&camera, &env, light);
        frame.submit_mesh(&red, model);
        frame.end_scene();

        let backend = composer.backend();
        assert_eq!(backend.uniform("u_Albedo"), Some(Uniform::Float3(Vec3::X)));
        assert_eq!(backend.uniform("u_Metallic"), Some(Uniform::Float(1.0)));
        assert_eq!(backend.uniform("u_Model"), Some(Uniform::Mat4(model)));
        assert_eq!(
            backend.uniform("u_LightPos"),
            Some(Uniform::Float3(light.position))
        );
        assert_eq!(
            backend.uniform("u_CameraPos"),
            Some(Uniform::Float3(Vec3::new(1.0, 2.0, 3.0)))
        );
        assert_eq!(backend.uniform("u_BrdfLutTexture"), Some(Uniform::Int(2)));
        assert_eq!(backend.uniform("u_EnvironmentMap"), Some(Uniform::Int(0)));
    }

    #[test]
    fn post_passes_ping_pong_between_targets() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let [_, intermediate, final_target] = composer.targets();
        let (intermediate_id, final_id) = (
            intermediate.color_texture_id(),
            final_target.color_texture_id(),
        );

        let before = composer
            .begin_scene(&Camera::default(), &env, LightInfo::default())
            .end_scene();
        assert_eq!(composer.frame_texture_id(), intermediate_id);

        composer.color_grade(Vec4::new(1.0, 0.5, 0.5, 1.0));
        assert_eq!(composer.frame_texture_id(), final_id);
        composer.invert_color();
        assert_eq!(composer.frame_texture_id(), intermediate_id);
        composer.invert_color();
        assert_eq!(composer.frame_texture_id(), final_id);

        assert_eq!(composer.statistics().draw_calls, before.draw_calls + 3);
    }

    #[test]
    fn post_pass_reads_source_and_writes_destination() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let [_, intermediate, final_target] = composer.targets();
        let (i, f) = (intermediate.id, final_target.id);

        composer
            .begin_scene(&Camera::default(), &env, LightInfo::default())
            .end_scene();
        composer.backend_mut().clear_calls();
        let grade = Vec4::new(0.2, 0.4, 0.6, 1.0);
        composer.color_grade(grade);

        let calls = &composer.backend().calls;
        assert_eq!(calls[0], Call::BindTarget(Some(f)));
        assert!(matches!(calls[1], Call::Clear(_)));
        assert_eq!(calls[2], Call::BindTargetColor(i, 0));
        assert_eq!(calls[3], Call::UseProgram(ProgramKind::ColorGrade));
        assert!(calls.contains(&Call::SetUniform("u_Frame".into(), Uniform::Int(0))));
        assert!(calls.contains(&Call::SetUniform(
            "u_GradingColor".into(),
            Uniform::Float4(grade)
        )));
        assert_eq!(calls.last(), Some(&Call::BindTarget(None)));
    }

    #[test]
    fn begin_scene_resets_ping_pong() {
        let mut composer = composer();
        let env = composer.backend().environment();
        let intermediate_id = composer.targets()[1].color_texture_id();

        composer
            .begin_scene(&Camera::default(), &env, LightInfo::default())
            .end_scene();
        composer.invert_color();
        composer
            .begin_scene(&Camera::default(), &env, LightInfo::default())
            .end_scene();

        assert_eq!(composer.frame_texture_id(), intermediate_id);
    }

    #[test]
    fn resize_applies_to_all_targets() {
        let mut composer = composer();
        composer.resize(800, 600);
        for target in composer.targets() {
            assert_eq!((target.width(), target.height()), (800, 600));
        }
        assert_eq!(composer.targets()[0].settings().samples(), 4);
    }

    #[test]
    fn backend_and_frame_hands_out_the_finished_frame() {
        let mut composer = composer();
        let env = composer.backend().environment();
        composer
            .begin_scene(&Camera::default(), &env, LightInfo::default())
            .end_scene();
        composer.invert_color();
        let expected = composer.frame_texture_id();

        let (backend, frame) = composer.backend_and_frame();
        backend.clear_calls();
        assert_eq!(frame.color_texture_id(), expected);
    }

    #[test]
    fn rejected_resize_keeps_previous_size() {
        let mut backend = RecordingBackend::new();
        backend.max_target_size = Some(4096);
        let mut composer = match Composer::new(backend, ComposerConfig::default()) {
            Ok(composer) => composer,
            Err(e) => panic!("initial size is within the limit: {e}"),
        };

        composer.resize(8192, 600);
        assert_eq!((composer.width(), composer.height()), (1920, 1080));
        for target in composer.targets() {
            assert_eq!((target.width(), target.height()), (1920, 1080));
        }

        composer.resize(800, 600);
        for target in composer.targets() {
            assert_eq!((target.width(), target.height()), (800, 600));
        }
    }

    #[test]
    fn zero_resize_is_ignored() {
        let mut composer = composer();
        composer.resize(0, 600);
        assert_eq!((composer.width(), composer.height()), (1920, 1080));
    }
}
