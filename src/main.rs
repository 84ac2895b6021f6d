use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use glam::{Mat4, Vec3, Vec4};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use irradiant::{
    AnalyticMaterial, Camera, Composer, ComposerConfig, EnvironmentData, GpuContext, IblSettings,
    ImportOptions, LightInfo, LoggingConfig, Material, Mesh, Model, RawGeometry, RenderBackend,
    RenderError, WgpuBackend, WgpuEnvironment, init_logging,
};

/// Radians of orbit per pixel of mouse drag.
const ORBIT_SPEED: f32 = 0.005;

/// Interactive viewer for a single model lit by an HDR environment.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "irradiant-viewer", version, about)]
struct ViewerConfig {
    /// OBJ or STL file to display.
    model: PathBuf,

    /// Equirectangular HDR environment; a flat grey environment when absent.
    #[arg(long, value_name = "HDR")]
    env: Option<PathBuf>,

    /// Color grade multiplier, as "r,g,b,a".
    #[arg(long, value_name = "R,G,B,A", value_parser = parse_color)]
    grade: Option<Vec4>,

    /// Invert the colors of the final frame.
    #[arg(long)]
    invert: bool,

    /// Only draw this level of detail.
    #[arg(long, value_name = "N")]
    lod: Option<usize>,

    /// Meshes per level of detail.
    #[arg(long, value_name = "M", default_value_t = 1, requires = "lod")]
    meshes_per_lod: usize,

    /// MSAA sample count of the scene target.
    #[arg(long, default_value_t = 4)]
    samples: u32,

    /// Move the model's center to the origin.
    #[arg(long)]
    center: bool,

    /// Scale the model into a unit cube.
    #[arg(long)]
    normalize: bool,

    /// Draw a ground plane this far below the origin.
    #[arg(long, value_name = "DEPTH", allow_negative_numbers = true)]
    floor: Option<f32>,
}

impl ViewerConfig {
    fn import_options(&self) -> ImportOptions {
        ImportOptions {
            centered: self.center,
            normalized: self.normalize,
            ..ImportOptions::default()
        }
    }
}

fn parse_color(s: &str) -> Result<Vec4, String> {
    let channels = s
        .split(',')
        .map(|c| c.trim().parse::<f32>().map_err(|e| format!("'{c}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    match channels.as_slice() {
        [r, g, b, a] => Ok(Vec4::new(*r, *g, *b, *a)),
        [r, g, b] => Ok(Vec4::new(*r, *g, *b, 1.0)),
        _ => Err(format!("expected 3 or 4 comma-separated values, got {}", channels.len())),
    }
}

struct Viewer {
    window: Arc<Window>,
    composer: Composer<WgpuBackend>,
    environment: WgpuEnvironment,
    model: Model<WgpuBackend>,
    floor: Option<(Mesh<WgpuBackend>, Mat4)>,
    camera: Camera,
    /// Distance from the camera to the orbit pivot at the origin.
    distance: f32,
    dragging: bool,
    cursor: Option<(f64, f64)>,
}

impl Viewer {
    fn new(window: Arc<Window>, config: &ViewerConfig) -> Result<Self, RenderError> {
        let PhysicalSize { width, height } = window.inner_size();
        let (width, height) = (width.max(1), height.max(1));

        let gpu = GpuContext::new(window.clone())?;
        let backend = WgpuBackend::new(gpu);
        let composer_config = ComposerConfig::new(width, height).with_sample_count(config.samples);
        let mut composer = Composer::new(backend, composer_config)?;

        let settings = IblSettings::default();
        let environment = match &config.env {
            Some(path) => EnvironmentData::from_file(path, &settings)?,
            None => EnvironmentData::uniform(Vec3::splat(0.3), &settings),
        };
        let environment = composer.backend_mut().create_environment(&environment)?;

        let options = config.import_options();
        let mut model = Model::load(composer.backend_mut(), &config.model, &options);
        if model.is_empty() {
            log::warn!("'{}' produced no meshes, showing a sphere", config.model.display());
            model = Model::new(vec![preview_mesh(
                composer.backend_mut(),
                "sphere",
                &RawGeometry::sphere(48, 24),
                AnalyticMaterial::default(),
            )]);
        } else {
            log::info!(
                "loaded '{}': {} meshes, {} vertices, {} faces",
                config.model.display(),
                model.meshes.len(),
                model.vertex_count(),
                model.face_count()
            );
        }

        let floor = config.floor.map(|depth| {
            let mesh = preview_mesh(
                composer.backend_mut(),
                "floor",
                &RawGeometry::plane(10.0),
                AnalyticMaterial::new(Vec3::splat(0.6)).with_roughness(0.9),
            );
            (mesh, Mat4::from_translation(Vec3::new(0.0, -depth, 0.0)))
        });

        let distance = 4.0;
        let mut camera = Camera::new().at(0.0, 0.0, distance).looking_at(0.0, 0.0, 0.0);
        camera.set_viewport(width, height);

        Ok(Self {
            window,
            composer,
            environment,
            model,
            floor,
            camera,
            distance,
            dragging: false,
            cursor: None,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.composer.backend_mut().resize_surface(width, height);
        self.composer.resize(width, height);
        self.camera.set_viewport(width, height);
    }

    fn orbit(&mut self, dx: f32, dy: f32) {
        self.camera.rotate(dx * ORBIT_SPEED, -dy * ORBIT_SPEED);
        self.camera.position = -self.camera.forward * self.distance;
    }

    fn render(&mut self, config: &ViewerConfig) -> Result<(), RenderError> {
        let light = LightInfo {
            position: self.camera.position + Vec3::new(0.0, 3.0, 0.0),
            ..LightInfo::default()
        };

        let mut frame = self.composer.begin_scene(&self.camera, &self.environment, light);
        match config.lod {
            Some(lod) => frame.submit_model_lod(&self.model, lod, config.meshes_per_lod),
            None => frame.submit_model(&self.model),
        }
        if let Some((floor, transform)) = &self.floor {
            frame.submit_mesh(floor, *transform);
        }
        let stats = frame.end_scene();
        log::trace!("{} draw calls, {} faces", stats.draw_calls, stats.face_count);

        if let Some(grade) = config.grade {
            self.composer.color_grade(grade);
        }
        if config.invert {
            self.composer.invert_color();
        }

        let (backend, frame) = self.composer.backend_and_frame();
        backend.present(frame)
    }
}

fn preview_mesh(
    backend: &mut WgpuBackend,
    name: &str,
    geometry: &RawGeometry,
    material: AnalyticMaterial,
) -> Mesh<WgpuBackend> {
    Mesh::new(name, geometry.upload(backend), Material::Analytic(material))
}

struct App {
    config: ViewerConfig,
    viewer: Option<Viewer>,
}

impl App {
    fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            viewer: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(format!("irradiant - {}", self.config.model.display()))
            .with_inner_size(PhysicalSize::new(1280, 720));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        match Viewer::new(window, &self.config) {
            Ok(viewer) => {
                viewer.window.request_redraw();
                self.viewer = Some(viewer);
            }
            Err(e) => {
                log::error!("failed to start viewer: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => viewer.resize(size.width, size.height),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                viewer.dragging = state == ElementState::Pressed;
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some((x, y)) = viewer.cursor
                    && viewer.dragging
                {
                    viewer.orbit((position.x - x) as f32, (position.y - y) as f32);
                }
                viewer.cursor = Some((position.x, position.y));
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = viewer.render(&self.config) {
                    log::error!("frame failed: {e}");
                    event_loop.exit();
                    return;
                }
                viewer.window.request_redraw();
            }
            _ => {}
        }
    }
}

fn main() {
    init_logging(LoggingConfig::default());
    let config = ViewerConfig::parse();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("failed to create event loop: {e}");
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("event loop exited with an error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_is_the_only_required_argument() {
        let config = ViewerConfig::try_parse_from(["viewer", "helmet.obj"]).unwrap();
        assert_eq!(config.model, PathBuf::from("helmet.obj"));
        assert_eq!(config.env, None);
        assert_eq!(config.grade, None);
        assert!(!config.invert);
        assert_eq!(config.lod, None);
        assert_eq!(config.samples, 4);

        assert!(ViewerConfig::try_parse_from(["viewer"]).is_err());
    }

    #[test]
    fn full_command_line_parses() {
        let config = ViewerConfig::try_parse_from([
            "viewer",
            "ship.obj",
            "--env",
            "sky.hdr",
            "--grade",
            "1.0, 0.9,0.8,1",
            "--invert",
            "--lod",
            "2",
            "--meshes-per-lod",
            "3",
        ])
        .unwrap();

        assert_eq!(config.env, Some(PathBuf::from("sky.hdr")));
        assert_eq!(config.grade, Some(Vec4::new(1.0, 0.9, 0.8, 1.0)));
        assert!(config.invert);
        assert_eq!(config.lod, Some(2));
        assert_eq!(config.meshes_per_lod, 3);
    }

    #[test]
    fn meshes_per_lod_needs_a_lod() {
        let result = ViewerConfig::try_parse_from(["viewer", "a.obj", "--meshes-per-lod", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn grade_accepts_rgb_and_rejects_garbage() {
        assert_eq!(parse_color("0.5,0.5,0.5"), Ok(Vec4::new(0.5, 0.5, 0.5, 1.0)));
        assert!(parse_color("1,2").is_err());
        assert!(parse_color("1,x,1,1").is_err());
    }

    #[test]
    fn import_flags_map_onto_options() {
        let config =
            ViewerConfig::try_parse_from(["viewer", "a.stl", "--center", "--normalize"]).unwrap();
        let options = config.import_options();
        assert!(options.centered);
        assert!(options.normalized);
        assert!(options.flip_uvs);
    }

    #[test]
    fn floor_depth_may_be_negative() {
        let config =
            ViewerConfig::try_parse_from(["viewer", "a.obj", "--floor", "-0.5"]).unwrap();
        assert_eq!(config.floor, Some(-0.5));
        let config = ViewerConfig::try_parse_from(["viewer", "a.obj"]).unwrap();
        assert_eq!(config.floor, None);
    }
}
