use crate::core::gfx::Renderer;
use crate::core::gfx::batch::QUAD_INDICES;
use crate::core::gfx::buffers::{IndexBuffer, VertexArray, VertexBuffer};
use crate::core::gfx::draw::Vertex;
use crate::core::gfx::driver::{BufferUsage, Driver, Primitive};
use crate::core::gfx::shader::ShaderProgram;
use crate::core::gfx::texture::Texture;
use glam::{Mat4, Vec3, Vec4};
use log::debug;
use std::mem;

/// Indexed `-1..1` quad in the default vertex layout, texcoords `0..1`.
///
/// Drawn as-is it covers the whole viewport, which is what the lighting
/// composite wants. Sprites scale it into place with a model matrix.
#[derive(Debug)]
pub struct QuadMesh {
    vao: VertexArray,
    vbo: VertexBuffer,
    ebo: IndexBuffer,
}

impl QuadMesh {
    pub fn create<D: Driver>(rnd: &mut Renderer<D>) -> Result<Self, String> {
        let corners = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let vertices: Vec<Vertex> = corners
            .into_iter()
            .zip(uvs)
            .map(|([x, y], texcoord)| Vertex { texcoord, ..Vertex::at(Vec3::new(x, y, 0.0)) })
            .collect();

        let stride = mem::size_of::<Vertex>();
        let vao = VertexArray::create(rnd)?;
        let vbo = VertexBuffer::create(rnd, Some(bytemuck::cast_slice(&vertices)), BufferUsage::Static)?;
        let ebo = IndexBuffer::create(rnd, Some(bytemuck::cast_slice(&QUAD_INDICES)), BufferUsage::Static)?;

        vao.begin(rnd);
        ebo.begin(rnd);
        vbo.begin(rnd);
        vao.attrib_pointer(rnd, 0, 3, stride, mem::offset_of!(Vertex, position));
        vao.attrib_pointer(rnd, 1, 3, stride, mem::offset_of!(Vertex, normal));
        vao.attrib_pointer(rnd, 2, 4, stride, mem::offset_of!(Vertex, color));
        vao.attrib_pointer(rnd, 3, 2, stride, mem::offset_of!(Vertex, texcoord));
        vbo.end(rnd);
        vao.end(rnd);
        ebo.end(rnd);
        Ok(Self { vao, vbo, ebo })
    }

    /// Draws with whatever program is current.
    pub fn draw<D: Driver>(&self, rnd: &mut Renderer<D>) {
        self.vao.begin(rnd);
        self.ebo.begin(rnd);
        rnd.driver.draw_elements(Primitive::Triangles, QUAD_INDICES.len(), 0);
        self.vao.end(rnd);
    }

    pub fn destroy<D: Driver>(self, rnd: &mut Renderer<D>) {
        self.vao.destroy(rnd);
        self.vbo.destroy(rnd);
        self.ebo.destroy(rnd);
    }
}

/// One free-standing textured rectangle. `angle` is in degrees around the
/// center, turning the same way as `SpriteBatch::draw`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sprite2D {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
    pub color: Vec4,
}

impl Sprite2D {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height, angle: 0.0, color: Vec4::ONE }
    }

    /// Maps the `-1..1` quad onto this rectangle.
    pub fn model(&self) -> Mat4 {
        let (hw, hh) = (self.width * 0.5, self.height * 0.5);
        let center = Mat4::from_translation(Vec3::new(self.x + hw, self.y + hh, 0.0));
        let scale = Mat4::from_scale(Vec3::new(hw, hh, 1.0));
        if self.angle == 0.0 {
            center * scale
        } else {
            center * Mat4::from_rotation_z(-self.angle.to_radians()) * scale
        }
    }
}

/// Draws `Sprite2D`s one call each, through the default program or a
/// caller's program.
pub struct SpriteRenderer {
    shader: ShaderProgram,
    mesh: QuadMesh,
}

impl SpriteRenderer {
    pub fn create<D: Driver>(rnd: &mut Renderer<D>) -> Result<Self, String> {
        let shader = ShaderProgram::default_program(rnd);
        if !shader.is_compiled() {
            let err = format!("Default program: {}", shader.error().unwrap_or("not compiled"));
            shader.destroy(rnd);
            return Err(err);
        }
        let mesh = QuadMesh::create(rnd)?;
        debug!("Sprite renderer created.");
        Ok(Self { shader, mesh })
    }

    #[inline(always)]
    pub fn mesh(&self) -> &QuadMesh {
        &self.mesh
    }

    /// Untextured sprites are filled with their color.
    pub fn draw<D: Driver>(&mut self, rnd: &mut Renderer<D>, sprite: &Sprite2D, texture: Option<&Texture>) {
        let (view, proj) = (rnd.view(), rnd.projection());
        let shd = &mut self.shader;
        shd.begin(rnd);
        if !shd.is_active() {
            return;
        }
        shd.set_bool(rnd, "u_use_points", false);
        shd.set_bool(rnd, "u_use_normals", false);
        shd.set_bool(rnd, "u_use_vcolor", false);
        shd.set_bool(rnd, "u_use_texture", texture.is_some());
        if let Some(texture) = texture {
            shd.set_texture_2d(rnd, "u_texture", texture.id());
        }
        shd.set_vec4(rnd, "u_color", sprite.color);
        shd.set_mat4(rnd, "u_model", &sprite.model());
        shd.set_mat4(rnd, "u_view", &view);
        shd.set_mat4(rnd, "u_proj", &proj);
        self.mesh.draw(rnd);
        shd.end(rnd);
    }

    /// Draws through `shader`, which gets `u_model`, `u_view` and `u_proj`.
    /// Anything else it samples is the caller's to set.
    pub fn draw_with<D: Driver>(&self, rnd: &mut Renderer<D>, sprite: &Sprite2D, shader: &mut ShaderProgram) {
        let (view, proj) = (rnd.view(), rnd.projection());
        shader.begin(rnd);
        if !shader.is_active() {
            return;
        }
        shader.set_mat4(rnd, "u_model", &sprite.model());
        shader.set_mat4(rnd, "u_view", &view);
        shader.set_mat4(rnd, "u_proj", &proj);
        self.mesh.draw(rnd);
        shader.end(rnd);
    }

    pub fn destroy<D: Driver>(self, rnd: &mut Renderer<D>) {
        self.mesh.destroy(rnd);
        self.shader.destroy(rnd);
    }
}
