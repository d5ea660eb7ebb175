use crate::config::Config;
use crate::core::gfx::backends::headless::{Call, HeadlessDriver};
use crate::core::gfx::backends::opengl::{self, GlDriver, GlWindowSurface};
use crate::core::gfx::animator::FrameAnimator2D;
use crate::core::gfx::batch::SpriteBatch;
use crate::core::gfx::camera::Camera2D;
use crate::core::gfx::draw::SimpleDraw;
use crate::core::gfx::driver::Driver;
use crate::core::gfx::light::Light2D;
use crate::core::gfx::sprite::{Sprite2D, SpriteRenderer};
use crate::core::gfx::texture::Texture;
use crate::core::gfx::{BackendType, Renderer, RendererOptions, SamplerDesc, SamplerFilter};
use glam::{Vec2, Vec3, Vec4};
use image::{Rgba, RgbaImage};
use log::{debug, error, info, warn};
use std::{error::Error, sync::Arc, time::Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

const CLEAR_COLOR: [f32; 4] = [0.08, 0.08, 0.11, 1.0];
const SPRITE_COLUMNS: usize = 24;
const SPRITE_ROWS: usize = 12;
const SPRITE_SIZE: f32 = 28.0;
const AMBIENT: Vec3 = Vec3::splat(0.35);
const BADGE_COLORS: [Vec4; 4] = [
    Vec4::new(1.0, 0.4, 0.4, 1.0),
    Vec4::new(0.4, 1.0, 0.4, 1.0),
    Vec4::new(0.4, 0.6, 1.0, 1.0),
    Vec4::new(1.0, 1.0, 0.4, 1.0),
];

/// What the demo draws each frame: a grid of spinning sprites alternating
/// between two textures and an untextured tint, plus a few shapes, all lit
/// by three orbiting lights. A screen-space badge steps through four frames
/// in the bottom-left corner.
struct Scene {
    batch: SpriteBatch,
    shapes: SimpleDraw,
    sprites: SpriteRenderer,
    light: Light2D,
    badge: FrameAnimator2D,
    checker: Texture,
    gradient: Texture,
    last_time: f32,
}

impl Scene {
    fn new<D: Driver>(rnd: &mut Renderer<D>, batch_sprites: usize) -> Result<Self, String> {
        let checker = Texture::from_image(
            rnd,
            &checker_image(32, 4),
            SamplerDesc { filter: SamplerFilter::Nearest, ..SamplerDesc::default() },
        )?;
        let gradient = Texture::from_image(rnd, &gradient_image(64), SamplerDesc::default())?;
        let mut badge = FrameAnimator2D::new(BADGE_COLORS.len() as u32, 0.25);
        badge.start();
        Ok(Self {
            batch: SpriteBatch::create(rnd, batch_sprites)?,
            shapes: SimpleDraw::create(rnd)?,
            sprites: SpriteRenderer::create(rnd)?,
            light: Light2D::create(rnd, AMBIENT, 1.0)?,
            badge,
            checker,
            gradient,
            last_time: 0.0,
        })
    }

    fn resize<D: Driver>(&mut self, rnd: &mut Renderer<D>, width: u32, height: u32) {
        if let Err(e) = self.light.resize(rnd, width, height) {
            warn!("Lighting not resized: {e}");
        }
    }

    fn draw<D: Driver>(&mut self, rnd: &mut Renderer<D>, camera: &Camera2D, time: f32) {
        self.badge.update((time - self.last_time).max(0.0));
        self.last_time = time;
        rnd.set_camera(camera);
        self.light.scene_begin(rnd);
        self.draw_world(rnd, camera, time);
        self.light.scene_end(rnd);

        self.light.light_begin(rnd);
        for k in 0..3 {
            let phase = time * 0.7 + k as f32 * std::f32::consts::TAU / 3.0;
            let center = Vec3::new(phase.cos() * 240.0, phase.sin() * 140.0, 0.0);
            let mut color = Vec4::new(0.0, 0.0, 0.0, 0.8);
            color[k] = 1.0;
            self.shapes.circle_fill(rnd, color, center, 180.0, 32);
        }
        self.light.light_end(rnd);
        self.light.render(rnd);

        rnd.ui_begin(camera);
        let frame = self.badge.frame() as usize;
        let mut badge = Sprite2D::new(16.0, 16.0, 48.0, 48.0);
        badge.angle = frame as f32 * 90.0;
        badge.color = BADGE_COLORS[frame];
        self.sprites.draw(rnd, &badge, Some(&self.checker));
        rnd.ui_end();
    }

    fn draw_world<D: Driver>(&mut self, rnd: &mut Renderer<D>, camera: &Camera2D, time: f32) {
        let (w, h) = camera.size();
        let spacing_x = w as f32 / SPRITE_COLUMNS as f32;
        let spacing_y = h as f32 / SPRITE_ROWS as f32;
        let origin = Vec2::new(-(w as f32) * 0.5, -(h as f32) * 0.5);

        self.batch.begin(rnd);
        for row in 0..SPRITE_ROWS {
            for col in 0..SPRITE_COLUMNS {
                let i = row * SPRITE_COLUMNS + col;
                let texture = match (row / 3) % 3 {
                    0 => Some(&self.checker),
                    1 => Some(&self.gradient),
                    _ => None,
                };
                let hue = i as f32 / (SPRITE_COLUMNS * SPRITE_ROWS) as f32;
                self.batch.set_color(Vec4::new(1.0, 0.5 + 0.5 * hue, 1.0 - hue, 1.0));
                let x = origin.x + (col as f32 + 0.5) * spacing_x - SPRITE_SIZE * 0.5;
                let y = origin.y + (row as f32 + 0.5) * spacing_y - SPRITE_SIZE * 0.5;
                let angle = time * 90.0 + i as f32 * 7.5;
                self.batch.draw(rnd, texture, x, y, SPRITE_SIZE, SPRITE_SIZE, angle);
            }
        }
        self.batch.set_color(Vec4::ONE);
        self.batch.end(rnd);

        let pulse = 0.5 + 0.5 * (time * 2.0).sin();
        let white = Vec4::ONE;
        self.shapes.circle_fill(rnd, Vec4::new(0.2, 0.6, 1.0, 0.6), Vec3::ZERO, 80.0 + 20.0 * pulse, 48);
        self.shapes.circle(rnd, white, Vec3::ZERO, 110.0, 48, 2.0);
        self.shapes.star_fill(rnd, Vec4::new(1.0, 0.8, 0.1, 0.9), Vec3::new(220.0, 0.0, 0.0), 60.0, 25.0, 5);
        self.shapes.star(rnd, white, Vec3::new(-220.0, 0.0, 0.0), 60.0, 25.0, 5, 1.5);
        self.shapes.quad(rnd, white, Vec3::new(-300.0, -150.0, 0.0), Vec2::new(600.0, 300.0), 1.0);
        self.shapes.line(
            rnd,
            Vec4::new(1.0, 0.3, 0.3, 1.0),
            Vec3::new(-300.0, -150.0, 0.0),
            Vec3::new(300.0, 150.0, 0.0),
            1.0,
        );
        self.shapes.point(rnd, white, Vec3::new(0.0, 180.0, 0.0), 6.0 + 6.0 * pulse);
    }

    fn destroy<D: Driver>(self, rnd: &mut Renderer<D>) {
        self.light.destroy(rnd);
        self.sprites.destroy(rnd);
        self.batch.destroy(rnd);
        self.shapes.destroy(rnd);
        self.checker.destroy(rnd);
        self.gradient.destroy(rnd);
    }
}

fn checker_image(size: u32, cell: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([40, 40, 40, 255])
        }
    })
}

fn gradient_image(size: u32) -> RgbaImage {
    let max = size.saturating_sub(1).max(1) as f32;
    RgbaImage::from_fn(size, size, |x, y| {
        let u = (x as f32 / max * 255.0) as u8;
        let v = (y as f32 / max * 255.0) as u8;
        Rgba([u, v, 255 - u, 255])
    })
}

struct App {
    config: Config,
    window: Option<Arc<Window>>,
    surface: Option<GlWindowSurface>,
    renderer: Option<Renderer<GlDriver>>,
    scene: Option<Scene>,
    camera: Camera2D,
    start_time: Instant,
    frame_count: u32,
    last_title_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            config,
            window: None,
            surface: None,
            renderer: None,
            scene: None,
            camera: Camera2D::new(config.display_width, config.display_height),
            start_time: now,
            frame_count: 0,
            last_title_update: now,
        }
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let window_attributes = Window::default_attributes()
            .with_title("cgdf")
            .with_resizable(true)
            .with_inner_size(PhysicalSize::new(
                self.config.display_width,
                self.config.display_height,
            ));
        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let (surface, driver) = opengl::init(&window, self.config.vsync, self.config.gfx_debug)?;

        let mut renderer = Renderer::new(
            driver,
            RendererOptions {
                gfx_debug: self.config.gfx_debug,
                texture_units_fallback: self.config.texture_units_fallback,
            },
        );
        let size = window.inner_size();
        renderer.resize(size.width, size.height);
        self.camera.resize(size.width, size.height);

        let scene = Scene::new(&mut renderer, self.config.batch_sprites)?;

        self.window = Some(window);
        self.surface = Some(surface);
        self.renderer = Some(renderer);
        self.scene = Some(scene);
        info!("Starting event loop...");
        Ok(())
    }

    fn redraw(&mut self) -> Result<(), Box<dyn Error>> {
        let (Some(renderer), Some(scene), Some(surface)) =
            (self.renderer.as_mut(), self.scene.as_mut(), self.surface.as_ref())
        else {
            return Ok(());
        };
        let time = self.start_time.elapsed().as_secs_f32();
        renderer.begin_frame(CLEAR_COLOR);
        scene.draw(renderer, &self.camera, time);
        renderer.end_frame();
        surface.present()?;
        self.update_title();
        Ok(())
    }

    fn update_title(&mut self) {
        self.frame_count += 1;
        let elapsed = self.last_title_update.elapsed().as_secs_f32();
        if elapsed < 1.0 {
            return;
        }
        if let (Some(window), Some(renderer)) = (&self.window, &self.renderer) {
            let units = renderer.texture_units();
            window.set_title(&format!(
                "cgdf | {:.1} FPS | units {}/{}",
                self.frame_count as f32 / elapsed,
                units.used(),
                units.total()
            ));
        }
        self.frame_count = 0;
        self.last_title_update = Instant::now();
    }

    fn shutdown(&mut self) {
        let Some(mut renderer) = self.renderer.take() else {
            return;
        };
        if let Some(scene) = self.scene.take() {
            scene.destroy(&mut renderer);
        }
        drop(renderer.shutdown());
        self.surface = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init_graphics(event_loop)
        {
            error!("Failed to initialize graphics: {e}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else { return };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event: key_event, .. } => {
                if key_event.state == ElementState::Pressed
                    && key_event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    if let Some(surface) = &self.surface {
                        surface.resize(new_size.width, new_size.height);
                    }
                    if let Some(renderer) = &mut self.renderer {
                        renderer.resize(new_size.width, new_size.height);
                        if let Some(scene) = &mut self.scene {
                            scene.resize(renderer, new_size.width, new_size.height);
                        }
                    }
                    self.camera.resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    error!("Failed to present frame: {e}");
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

/// Renders `frames` frames of the demo scene against the recording driver and
/// returns the number of draw submissions per frame.
pub fn run_headless(config: &Config, frames: u32) -> Result<Vec<usize>, Box<dyn Error>> {
    info!("Running {frames} headless frame(s)...");
    let mut renderer = Renderer::new(
        HeadlessDriver::default(),
        RendererOptions {
            gfx_debug: config.gfx_debug,
            texture_units_fallback: config.texture_units_fallback,
        },
    );
    renderer.resize(config.display_width, config.display_height);
    let camera = Camera2D::new(config.display_width, config.display_height);
    let mut scene = Scene::new(&mut renderer, config.batch_sprites)?;

    let mut draws = Vec::with_capacity(frames as usize);
    for frame in 0..frames {
        renderer.driver_mut().clear_calls();
        renderer.begin_frame(CLEAR_COLOR);
        scene.draw(&mut renderer, &camera, frame as f32 / 60.0);
        renderer.end_frame();
        let count = renderer.driver().count(Call::is_draw);
        debug!(
            "Frame {frame}: {count} draw(s), {} batch flush(es), {} uniform call(s).",
            scene.batch.flushes(),
            renderer.driver().count(Call::is_uniform)
        );
        draws.push(count);
    }

    scene.destroy(&mut renderer);
    let mut driver = renderer.shutdown();
    for e in driver.take_errors() {
        warn!("Headless driver: {e}");
    }
    if driver.live_count() > 0 {
        warn!("{} driver object(s) still alive after shutdown.", driver.live_count());
    }
    info!(
        "Headless run finished: {} draw(s) over {frames} frame(s).",
        draws.iter().sum::<usize>()
    );
    Ok(draws)
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let config = crate::config::get();
    match config.video_renderer {
        BackendType::Headless => run_headless(&config, config.headless_frames).map(drop),
        BackendType::OpenGL => {
            let event_loop = EventLoop::new()?;
            event_loop.set_control_flow(ControlFlow::Poll);
            let mut app = App::new(config);
            event_loop.run_app(&mut app)?;
            Ok(())
        }
    }
}
