pub mod animator;
pub mod backends;
pub mod batch;
pub mod buffers;
pub mod camera;
pub mod draw;
pub mod driver;
pub mod gc;
pub mod light;
pub mod shader;
pub mod sprite;
pub mod texture;
pub mod texunit;

use crate::core::gfx::camera::Camera2D;
use crate::core::gfx::driver::{BlendMode, Driver, DriverInfo, Handle, MemoryInfo};
use crate::core::gfx::gc::{ResourceGc, ResourceKind};
use crate::core::gfx::texunit::{FALLBACK_TEXTURE_UNITS, TextureUnits};
use glam::Mat4;
use log::{debug, info};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Linear,
    Nearest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerWrap {
    Clamp,
    Repeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: SamplerFilter,
    pub wrap: SamplerWrap,
    pub mipmaps: bool,
}

impl Default for SamplerDesc {
    #[inline(always)]
    fn default() -> Self {
        Self {
            filter: SamplerFilter::Linear,
            wrap: SamplerWrap::Clamp,
            mipmaps: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    OpenGL,
    Headless,
}

#[derive(Clone, Copy, Debug)]
pub struct RendererOptions {
    pub gfx_debug: bool,
    /// Unit pool size when the driver reports none.
    pub texture_units_fallback: usize,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            gfx_debug: false,
            texture_units_fallback: FALLBACK_TEXTURE_UNITS,
        }
    }
}

/// Per-context graphics state: the driver, the texture unit pool, the
/// deferred-deletion queue, the current program and the camera matrices.
///
/// Everything that talks to the driver takes `&mut Renderer`, so there is one
/// of each per context and no global state.
pub struct Renderer<D: Driver> {
    pub(crate) driver: D,
    pub(crate) units: TextureUnits,
    pub(crate) gc: ResourceGc,
    active_program: Handle,
    cache_generation: u64,
    view: Mat4,
    projection: Mat4,
    ui_saved_view: Option<Mat4>,
    viewport: (u32, u32),
    blend: BlendMode,
    info: DriverInfo,
}

impl<D: Driver> Renderer<D> {
    pub fn new(mut driver: D, options: RendererOptions) -> Self {
        let info = driver.info();
        if options.gfx_debug {
            info!("Graphics vendor: {}", info.vendor);
            info!("Graphics renderer: {}", info.renderer);
            info!("Graphics version: {}", info.version);
            info!("Shading language: {}", info.shading_language);
            info!("Max texture size: {}", info.max_texture_size);
            match driver.memory_info() {
                Some(m) if m.total_kb > 0 => info!(
                    "Video memory: {} MiB total, {} MiB free.",
                    m.total_kb / 1024,
                    m.free_kb / 1024
                ),
                Some(m) => info!("Video memory: {} MiB free.", m.free_kb / 1024),
                None => debug!("Video memory query unsupported."),
            }
        }
        let units = TextureUnits::new(driver.max_texture_units(), options.texture_units_fallback);
        driver.init_state();
        info!("Renderer ready ({} texture units).", units.total());
        Self {
            driver,
            units,
            gc: ResourceGc::new(),
            active_program: 0,
            cache_generation: 0,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            ui_saved_view: None,
            viewport: (0, 0),
            blend: BlendMode::Alpha,
            info,
        }
    }

    #[inline(always)]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[inline(always)]
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    #[inline(always)]
    pub fn info(&self) -> &DriverInfo {
        &self.info
    }

    #[inline(always)]
    pub fn texture_units(&self) -> &TextureUnits {
        &self.units
    }

    #[inline(always)]
    pub fn gc(&self) -> &ResourceGc {
        &self.gc
    }

    #[inline(always)]
    pub const fn active_program(&self) -> Handle {
        self.active_program
    }

    /// Bumped by `clear_caches`; programs compare it on use.
    #[inline(always)]
    pub const fn cache_generation(&self) -> u64 {
        self.cache_generation
    }

    pub(crate) fn use_program(&mut self, program: Handle) {
        if self.active_program != program {
            self.driver.use_program(program);
            self.active_program = program;
        }
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        if self.blend != mode {
            self.driver.blend_mode(mode);
            self.blend = mode;
        }
    }

    #[inline(always)]
    pub const fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    /// Current video memory figures, when the driver can report them.
    pub fn memory_info(&mut self) -> Option<MemoryInfo> {
        self.driver.memory_info()
    }

    pub fn set_camera(&mut self, camera: &Camera2D) {
        self.view = camera.view();
        self.projection = camera.projection();
    }

    /// Screen-space drawing until `ui_end`: (0, 0) is the bottom-left
    /// corner of `camera`'s window. Repeated calls keep the first saved view.
    pub fn ui_begin(&mut self, camera: &Camera2D) {
        if self.ui_saved_view.is_some() {
            return;
        }
        self.ui_saved_view = Some(self.view);
        self.view = camera.screen_view();
    }

    pub fn ui_end(&mut self) {
        if let Some(view) = self.ui_saved_view.take() {
            self.view = view;
        }
    }

    #[inline(always)]
    pub const fn in_ui(&self) -> bool {
        self.ui_saved_view.is_some()
    }

    pub fn set_view_projection(&mut self, view: Mat4, projection: Mat4) {
        self.view = view;
        self.projection = projection;
    }

    #[inline(always)]
    pub const fn view(&self) -> Mat4 {
        self.view
    }

    #[inline(always)]
    pub const fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.driver.viewport(0, 0, width, height);
    }

    #[inline(always)]
    pub const fn viewport_size(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn begin_frame(&mut self, clear_color: [f32; 4]) {
        self.driver.clear(clear_color);
    }

    /// The frame-safe deletion point. Call after the last draw of the frame
    /// and before presenting it.
    pub fn end_frame(&mut self) {
        self.flush_gc();
    }

    pub fn flush_gc(&mut self) {
        for &texture in self.gc.pending(ResourceKind::Texture) {
            self.units.invalidate_texture(&mut self.driver, texture);
        }
        self.gc.flush(&mut self.driver);
    }

    /// Forgets every binding the core believes the driver holds, e.g. after
    /// the context was lost and recreated. All units are freed and every
    /// program drops its caches the next time it is used.
    pub fn clear_caches(&mut self) {
        self.units.unbind_all(&mut self.driver);
        self.cache_generation += 1;
        debug!("Renderer caches cleared (generation {}).", self.cache_generation);
    }

    /// Flushes pending deletions and hands the driver back. Programs,
    /// batches and drawers must already be destroyed.
    pub fn shutdown(mut self) -> D {
        info!("Shutting down renderer...");
        for &texture in self.gc.pending(ResourceKind::Texture) {
            self.units.invalidate_texture(&mut self.driver, texture);
        }
        self.gc.destroy(&mut self.driver);
        self.units.unbind_all(&mut self.driver);
        if self.active_program != 0 {
            self.driver.use_program(0);
        }
        info!("Renderer shut down.");
        self.driver
    }
}

// -- Boilerplate impls --
impl core::fmt::Display for BackendType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OpenGL => write!(f, "OpenGL"),
            Self::Headless => write!(f, "Headless"),
        }
    }
}

impl FromStr for BackendType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "opengl" | "gl" => Ok(Self::OpenGL),
            "headless" | "none" => Ok(Self::Headless),
            _ => Err(format!("'{s}' is not a valid video renderer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfx::backends::headless::{Call, HeadlessDriver};

    #[test]
    fn pool_size_comes_from_the_driver() {
        let rnd = Renderer::new(HeadlessDriver::new(32), RendererOptions::default());
        assert_eq!(rnd.texture_units().total(), 32);
        let rnd = Renderer::new(HeadlessDriver::new(0), RendererOptions::default());
        assert_eq!(rnd.texture_units().total(), FALLBACK_TEXTURE_UNITS);
    }

    #[test]
    fn use_program_skips_redundant_switches() {
        let mut rnd = Renderer::new(HeadlessDriver::default(), RendererOptions::default());
        rnd.use_program(0);
        assert_eq!(rnd.driver().count(|c| matches!(c, Call::UseProgram(_))), 0);
    }

    #[test]
    fn shutdown_deletes_everything_pending() {
        let mut rnd = Renderer::new(HeadlessDriver::default(), RendererOptions::default());
        let t = rnd.driver_mut().create_texture().unwrap();
        rnd.gc.push(ResourceKind::Texture, t);
        let mut driver = rnd.shutdown();
        assert!(!driver.is_live(t));
        assert!(driver.take_errors().is_empty());
    }

    #[test]
    fn blend_mode_changes_reach_the_driver_once() {
        let mut rnd = Renderer::new(HeadlessDriver::default(), RendererOptions::default());
        rnd.set_blend_mode(BlendMode::Alpha);
        rnd.set_blend_mode(BlendMode::Additive);
        rnd.set_blend_mode(BlendMode::Additive);
        assert_eq!(rnd.driver().count(|c| matches!(c, Call::Blend(_))), 1);
        assert_eq!(rnd.driver().blend(), BlendMode::Additive);
        assert_eq!(rnd.memory_info().map(|m| m.used_kb()), Some(0));
    }

    #[test]
    fn ui_mode_swaps_the_view_and_restores_it() {
        let mut rnd = Renderer::new(HeadlessDriver::default(), RendererOptions::default());
        let mut cam = Camera2D::new(800, 600);
        cam.position = glam::Vec2::new(50.0, 0.0);
        rnd.set_camera(&cam);

        rnd.ui_begin(&cam);
        rnd.ui_begin(&cam);
        assert!(rnd.in_ui());
        assert_eq!(rnd.view(), cam.screen_view());
        rnd.ui_end();
        assert!(!rnd.in_ui());
        assert_eq!(rnd.view(), cam.view());
    }

    #[test]
    fn backend_type_parses() {
        assert_eq!("OpenGL".parse::<BackendType>(), Ok(BackendType::OpenGL));
        assert_eq!("headless".parse::<BackendType>(), Ok(BackendType::Headless));
        assert!("vulkan".parse::<BackendType>().is_err());
        assert_eq!(BackendType::Headless.to_string(), "Headless");
    }
}
