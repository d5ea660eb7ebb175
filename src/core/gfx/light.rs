//! Deferred 2D lighting.
//!
//! The scene is drawn into an albedo texture and the lights, additively, into
//! a light texture. `render` composites the two onto whatever framebuffer is
//! bound as `albedo * (ambient + light * intensity)` and clears both for the
//! next frame.

use crate::core::gfx::buffers::FrameBuffer;
use crate::core::gfx::driver::{BlendMode, Driver};
use crate::core::gfx::shader::ShaderProgram;
use crate::core::gfx::sprite::QuadMesh;
use crate::core::gfx::texture::Texture;
use crate::core::gfx::{Renderer, SamplerDesc};
use glam::{Vec2, Vec3};
use log::{debug, warn};

const ALBEDO_ATTACHMENT: u32 = 0;
const LIGHT_ATTACHMENT: u32 = 1;

pub struct Light2D {
    shader: ShaderProgram,
    mesh: QuadMesh,
    framebuffer: FrameBuffer,
    albedo: Texture,
    light: Texture,
    ambient: Vec3,
    intensity: f32,
    scene_pass: bool,
    light_pass: bool,
}

impl Light2D {
    /// Render targets sized to the renderer's viewport.
    pub fn create<D: Driver>(rnd: &mut Renderer<D>, ambient: Vec3, intensity: f32) -> Result<Self, String> {
        let (width, height) = rnd.viewport_size();
        let shader = ShaderProgram::light2d_program(rnd);
        if !shader.is_compiled() {
            let err = format!("Light2D program: {}", shader.error().unwrap_or("not compiled"));
            shader.destroy(rnd);
            return Err(err);
        }
        let mesh = QuadMesh::create(rnd)?;
        let albedo = Texture::empty(rnd, width, height, SamplerDesc::default())?;
        let light = Texture::empty(rnd, width, height, SamplerDesc::default())?;
        let mut framebuffer = FrameBuffer::create(rnd, width, height)?;
        framebuffer.attach_color(rnd, ALBEDO_ATTACHMENT, &albedo);
        framebuffer.attach_color(rnd, LIGHT_ATTACHMENT, &light);
        debug!("Light2D created ({width}x{height}).");
        let mut light = Self {
            shader,
            mesh,
            framebuffer,
            albedo,
            light,
            ambient,
            intensity,
            scene_pass: false,
            light_pass: false,
        };
        light.clear_targets(rnd);
        Ok(light)
    }

    fn clear_targets<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        self.framebuffer.begin(rnd);
        self.framebuffer.draw_to_all(rnd);
        self.framebuffer.clear(rnd, [0.0; 4]);
        self.framebuffer.end(rnd);
    }

    #[inline(always)]
    pub const fn ambient(&self) -> Vec3 {
        self.ambient
    }

    pub fn set_ambient(&mut self, ambient: Vec3) {
        self.ambient = ambient;
    }

    #[inline(always)]
    pub const fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
    }

    #[inline(always)]
    pub const fn is_capturing(&self) -> bool {
        self.scene_pass || self.light_pass
    }

    #[inline(always)]
    pub const fn size(&self) -> (u32, u32) {
        self.framebuffer.size()
    }

    /// Subsequent draws land in the albedo texture.
    pub fn scene_begin<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if self.scene_pass {
            return;
        }
        if !self.light_pass {
            self.framebuffer.begin(rnd);
        }
        self.framebuffer.draw_to(rnd, ALBEDO_ATTACHMENT);
        self.scene_pass = true;
    }

    pub fn scene_end<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if !self.scene_pass {
            return;
        }
        self.scene_pass = false;
        if self.light_pass {
            self.framebuffer.draw_to(rnd, LIGHT_ATTACHMENT);
        } else {
            self.framebuffer.end(rnd);
        }
    }

    /// Subsequent draws add into the light texture.
    pub fn light_begin<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if self.light_pass {
            return;
        }
        if !self.scene_pass {
            self.framebuffer.begin(rnd);
        }
        self.framebuffer.draw_to(rnd, LIGHT_ATTACHMENT);
        rnd.set_blend_mode(BlendMode::Additive);
        self.light_pass = true;
    }

    pub fn light_end<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if !self.light_pass {
            return;
        }
        rnd.set_blend_mode(BlendMode::Alpha);
        self.light_pass = false;
        if self.scene_pass {
            self.framebuffer.draw_to(rnd, ALBEDO_ATTACHMENT);
        } else {
            self.framebuffer.end(rnd);
        }
    }

    /// Composites both passes, then clears them. Skipped while either pass
    /// is still capturing.
    pub fn render<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if self.is_capturing() {
            warn!("Light2D::render called while a pass is still capturing; skipped.");
            return;
        }
        let (width, height) = rnd.viewport_size();
        let shd = &mut self.shader;
        shd.begin(rnd);
        if shd.is_active() {
            shd.set_texture_2d(rnd, "u_albedo_texture", self.albedo.id());
            shd.set_texture_2d(rnd, "u_light_texture", self.light.id());
            shd.set_vec3(rnd, "u_ambient", self.ambient);
            shd.set_float(rnd, "u_intensity", self.intensity);
            shd.set_vec2(rnd, "u_resolution", Vec2::new(width as f32, height as f32));
            self.mesh.draw(rnd);
            shd.end(rnd);
        }
        self.clear_targets(rnd);
    }

    /// Reallocates both targets, cleared. Not while a pass is capturing.
    pub fn resize<D: Driver>(&mut self, rnd: &mut Renderer<D>, width: u32, height: u32) -> Result<(), String> {
        if self.is_capturing() {
            return Err("Light2D cannot resize while a pass is capturing".to_owned());
        }
        self.albedo.resize(rnd, width, height)?;
        self.light.resize(rnd, width, height)?;
        self.framebuffer.resize(rnd, width, height);
        self.clear_targets(rnd);
        debug!("Light2D resized to {width}x{height}.");
        Ok(())
    }

    /// Closes any open pass first, so blending and the framebuffer binding
    /// are back to normal.
    pub fn destroy<D: Driver>(mut self, rnd: &mut Renderer<D>) {
        self.light_end(rnd);
        self.scene_end(rnd);
        self.framebuffer.destroy(rnd);
        self.albedo.destroy(rnd);
        self.light.destroy(rnd);
        self.mesh.destroy(rnd);
        self.shader.destroy(rnd);
    }
}
