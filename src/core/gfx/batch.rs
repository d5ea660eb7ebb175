use crate::core::gfx::Renderer;
use crate::core::gfx::buffers::{IndexBuffer, VertexArray, VertexBuffer};
use crate::core::gfx::driver::{BufferUsage, Driver, Handle, Primitive};
use crate::core::gfx::shader::ShaderProgram;
use crate::core::gfx::texture::Texture;
use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use log::{debug, trace, warn};
use std::mem;

pub const DEFAULT_BATCH_SPRITES: usize = 2048;
pub const MAX_BATCH_SPRITES: usize = 16384;
pub const VERTICES_PER_SPRITE: usize = 4;
pub const INDICES_PER_SPRITE: usize = 6;

/// Two counter-clockwise triangles over corners 0..4.
pub const QUAD_INDICES: [u32; INDICES_PER_SPRITE] = [0, 1, 2, 2, 3, 0];

/// Full texture, (u0, v0, u1, v1).
pub const FULL_TEXCOORD: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 2],
    pub texcoord: [f32; 2],
    pub color: [f32; 4],
}

impl SpriteVertex {
    #[inline(always)]
    pub const fn r(&self) -> f32 {
        self.color[0]
    }
    #[inline(always)]
    pub const fn g(&self) -> f32 {
        self.color[1]
    }
    #[inline(always)]
    pub const fn b(&self) -> f32 {
        self.color[2]
    }
    #[inline(always)]
    pub const fn a(&self) -> f32 {
        self.color[3]
    }
}

/// `{0,1,2,2,3,0}` repeated for `sprites` quads, each offset by 4 vertices.
pub fn quad_indices(sprites: usize) -> Vec<u32> {
    (0..sprites)
        .flat_map(|i| QUAD_INDICES.map(|p| (i * VERTICES_PER_SPRITE) as u32 + p))
        .collect()
}

/// Corners of a `w`x`h` quad at (`x`, `y`), turned `angle` degrees around
/// its center. Order: bottom-left, bottom-right, top-right, top-left.
///
/// One sin/cos pair is shared by all four corners so the result stays an
/// exact rectangle.
pub fn quad_corners(x: f32, y: f32, w: f32, h: f32, angle: f32) -> [[f32; 2]; 4] {
    let corners = [[x, y], [x + w, y], [x + w, y + h], [x, y + h]];
    if angle == 0.0 {
        return corners;
    }
    let (cx, cy) = (x + w * 0.5, y + h * 0.5);
    let (sin, cos) = (-angle.to_radians()).sin_cos();
    corners.map(|[px, py]| {
        let (dx, dy) = (px - cx, py - cy);
        [dx * cos - dy * sin + cx, dx * sin + dy * cos + cy]
    })
}

/// Accumulates textured quads and submits them one draw per texture run.
///
/// Owns its program, its vertex array and two buffers: a dynamic vertex
/// buffer sized for `capacity` sprites and a static index buffer filled once.
pub struct SpriteBatch {
    shader: ShaderProgram,
    vao: VertexArray,
    vbo: VertexBuffer,
    ebo: IndexBuffer,
    vertices: Vec<SpriteVertex>,
    capacity: usize,
    sprite_count: usize,
    current_texture: Handle,
    color: Vec4,
    texcoord: Vec4,
    begun: bool,
    flushes: u32,
}

impl SpriteBatch {
    pub fn create<D: Driver>(rnd: &mut Renderer<D>, capacity: usize) -> Result<Self, String> {
        let shader = ShaderProgram::sprite_batch_program(rnd);
        Self::with_shader(rnd, capacity, shader)
    }

    /// Batch drawn through a caller-supplied program. It must take the same
    /// vertex layout and uniforms as the built-in one, and must have linked.
    pub fn with_shader<D: Driver>(
        rnd: &mut Renderer<D>,
        capacity: usize,
        shader: ShaderProgram,
    ) -> Result<Self, String> {
        if !shader.is_compiled() {
            let err = format!(
                "Sprite batch program: {}",
                shader.error().unwrap_or("not compiled")
            );
            shader.destroy(rnd);
            return Err(err);
        }
        if capacity == 0 || capacity > MAX_BATCH_SPRITES {
            shader.destroy(rnd);
            return Err(format!("Batch capacity {capacity} outside 1..={MAX_BATCH_SPRITES}"));
        }
        let stride = mem::size_of::<SpriteVertex>();
        let indices = quad_indices(capacity);

        let vao = VertexArray::create(rnd)?;
        let mut vbo = VertexBuffer::create(rnd, None, BufferUsage::Dynamic)?;
        let ebo = IndexBuffer::create(rnd, Some(bytemuck::cast_slice(&indices)), BufferUsage::Static)?;

        vao.begin(rnd);
        ebo.begin(rnd);
        vbo.begin(rnd);
        vbo.reserve(rnd, stride * VERTICES_PER_SPRITE * capacity, BufferUsage::Dynamic);
        // a_position (0), a_texcoord (1), a_color (2)
        vao.attrib_pointer(rnd, 0, 2, stride, mem::offset_of!(SpriteVertex, position));
        vao.attrib_pointer(rnd, 1, 2, stride, mem::offset_of!(SpriteVertex, texcoord));
        vao.attrib_pointer(rnd, 2, 4, stride, mem::offset_of!(SpriteVertex, color));
        vbo.end(rnd);
        vao.end(rnd);
        // The index binding is vertex array state; unbind only after the VAO.
        ebo.end(rnd);

        debug!("Sprite batch created ({capacity} sprites).");
        Ok(Self {
            shader,
            vao,
            vbo,
            ebo,
            vertices: Vec::with_capacity(capacity * VERTICES_PER_SPRITE),
            capacity,
            sprite_count: 0,
            current_texture: 0,
            color: Vec4::ONE,
            texcoord: FULL_TEXCOORD,
            begun: false,
            flushes: 0,
        })
    }

    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub const fn sprite_count(&self) -> usize {
        self.sprite_count
    }

    #[inline(always)]
    pub const fn is_begun(&self) -> bool {
        self.begun
    }

    /// Draw submissions issued since the last `begin`.
    #[inline(always)]
    pub const fn flushes(&self) -> u32 {
        self.flushes
    }

    #[inline(always)]
    pub fn shader(&self) -> &ShaderProgram {
        &self.shader
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
    }

    #[inline(always)]
    pub const fn color(&self) -> Vec4 {
        self.color
    }

    /// Texture region (u0, v0, u1, v1) used by subsequent draws.
    pub fn set_texcoord(&mut self, texcoord: Vec4) {
        self.texcoord = texcoord;
    }

    pub fn reset_texcoord(&mut self) {
        self.texcoord = FULL_TEXCOORD;
    }

    #[inline(always)]
    pub const fn texcoord(&self) -> Vec4 {
        self.texcoord
    }

    /// Binds program and buffers and uploads the renderer's camera. If the
    /// program can't be made current the batch stays closed.
    pub fn begin<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if self.begun {
            return;
        }
        self.sprite_count = 0;
        self.vertices.clear();
        self.current_texture = 0;
        self.flushes = 0;

        let (view, proj) = (rnd.view(), rnd.projection());
        self.shader.begin(rnd);
        if !self.shader.is_active() {
            warn!("Sprite batch not begun: program {} is not current.", self.shader.id());
            return;
        }
        self.vao.begin(rnd);
        self.ebo.begin(rnd);
        self.vbo.begin(rnd);
        self.shader.set_mat4(rnd, "u_view", &view);
        self.shader.set_mat4(rnd, "u_proj", &proj);
        self.begun = true;
    }

    /// Queues one quad. `angle` is in degrees, around the quad's center.
    /// Outside `begin`/`end` this does nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn draw<D: Driver>(
        &mut self,
        rnd: &mut Renderer<D>,
        texture: Option<&Texture>,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        angle: f32,
    ) {
        if !self.begun {
            trace!("SpriteBatch::draw outside begin/end ignored.");
            return;
        }
        let texture = texture.map_or(0, Texture::id);
        if texture != self.current_texture {
            self.flush(rnd);
            self.current_texture = texture;
        }
        if self.sprite_count >= self.capacity {
            self.flush(rnd);
        }

        let [u0, v0, u1, v1] = self.texcoord.to_array();
        let uvs = [[u0, v1], [u1, v1], [u1, v0], [u0, v0]];
        let color = self.color.to_array();
        let corners = quad_corners(x, y, width, height, angle);
        self.vertices.extend(
            corners
                .into_iter()
                .zip(uvs)
                .map(|(position, texcoord)| SpriteVertex { position, texcoord, color }),
        );
        self.sprite_count += 1;
    }

    /// Submits what has accumulated. Keeps the current texture marker.
    ///
    /// Rebinds the batch's own vertex array and buffers first: other drawing
    /// between `begin` and `end` may have left different ones bound.
    fn flush<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if !self.begun || self.vertices.is_empty() || !self.shader.is_active() {
            self.sprite_count = 0;
            self.vertices.clear();
            return;
        }
        self.vao.begin(rnd);
        self.ebo.begin(rnd);
        self.vbo.begin(rnd);
        self.vbo.set_sub_data(rnd, 0, bytemuck::cast_slice(&self.vertices));
        self.shader.set_bool(rnd, "u_use_texture", self.current_texture != 0);
        self.shader.set_texture_2d(rnd, "u_texture", self.current_texture);
        rnd.driver.draw_elements(Primitive::Triangles, INDICES_PER_SPRITE * self.sprite_count, 0);
        trace!(
            "Sprite batch flush: {} sprite(s), texture {}.",
            self.sprite_count,
            self.current_texture
        );
        self.flushes += 1;
        self.sprite_count = 0;
        self.vertices.clear();
    }

    /// Flushes, then unbinds buffers and restores the previous program.
    pub fn end<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if !self.begun {
            return;
        }
        self.flush(rnd);
        self.vbo.end(rnd);
        self.vao.end(rnd);
        self.shader.end(rnd);
        self.begun = false;
    }

    pub fn destroy<D: Driver>(mut self, rnd: &mut Renderer<D>) {
        self.end(rnd);
        self.vao.destroy(rnd);
        self.vbo.destroy(rnd);
        self.ebo.destroy(rnd);
        self.shader.destroy(rnd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfx::backends::headless::{Call, HeadlessDriver};
    use crate::core::gfx::draw::SimpleDraw;
    use crate::core::gfx::shader::SPRITE_BATCH_VERTEX_SHADER;
    use crate::core::gfx::{RendererOptions, SamplerDesc};
    use glam::Vec3;

    fn renderer() -> Renderer<HeadlessDriver> {
        Renderer::new(HeadlessDriver::default(), RendererOptions::default())
    }

    fn texture(rnd: &mut Renderer<HeadlessDriver>) -> Texture {
        Texture::from_rgba(rnd, 1, 1, &[255; 4], SamplerDesc::default()).unwrap()
    }

    fn dist(a: [f32; 2], b: [f32; 2]) -> f32 {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    }

    #[test]
    fn index_pattern_repeats_per_quad() {
        assert_eq!(quad_indices(2), vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4]);
        assert_eq!(quad_indices(DEFAULT_BATCH_SPRITES).len(), DEFAULT_BATCH_SPRITES * 6);
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(mem::size_of::<SpriteVertex>(), 32);
        let v = SpriteVertex { color: [0.1, 0.2, 0.3, 0.4], ..Default::default() };
        assert_eq!((v.r(), v.g(), v.b(), v.a()), (0.1, 0.2, 0.3, 0.4));
    }

    #[test]
    fn axis_aligned_corners() {
        assert_eq!(
            quad_corners(1.0, 2.0, 3.0, 4.0, 0.0),
            [[1.0, 2.0], [4.0, 2.0], [4.0, 6.0], [1.0, 6.0]]
        );
    }

    #[test]
    fn rotation_keeps_the_rectangle() {
        let c = quad_corners(10.0, 20.0, 30.0, 10.0, 90.0);
        let eps = 1e-4;
        assert!((dist(c[0], c[1]) - 30.0).abs() < eps);
        assert!((dist(c[1], c[2]) - 10.0).abs() < eps);
        assert!((dist(c[2], c[3]) - 30.0).abs() < eps);
        assert!((dist(c[3], c[0]) - 10.0).abs() < eps);
        assert!((dist(c[0], c[2]) - dist(c[1], c[3])).abs() < eps);
        // Center is preserved.
        let cx = (c[0][0] + c[2][0]) * 0.5;
        let cy = (c[0][1] + c[2][1]) * 0.5;
        assert!((cx - 25.0).abs() < eps && (cy - 25.0).abs() < eps);
    }

    #[test]
    fn texture_change_flushes_exactly_one_sprite() {
        let mut rnd = renderer();
        let a = texture(&mut rnd);
        let b = texture(&mut rnd);
        let mut batch = SpriteBatch::create(&mut rnd, 16).unwrap();
        batch.begin(&mut rnd);
        rnd.driver_mut().clear_calls();

        batch.draw(&mut rnd, Some(&a), 0.0, 0.0, 8.0, 8.0, 0.0);
        assert!(rnd.driver().element_draws().is_empty());
        batch.draw(&mut rnd, Some(&b), 0.0, 0.0, 8.0, 8.0, 0.0);
        assert_eq!(rnd.driver().element_draws(), vec![6]);

        batch.end(&mut rnd);
        assert_eq!(rnd.driver().element_draws(), vec![6, 6]);
        assert_eq!(batch.flushes(), 2);
        assert!(rnd.driver_mut().take_errors().is_empty());
    }

    #[test]
    fn overflow_splits_into_two_submissions() {
        let mut rnd = renderer();
        let tex = texture(&mut rnd);
        let mut batch = SpriteBatch::create(&mut rnd, 4).unwrap();
        batch.begin(&mut rnd);
        rnd.driver_mut().clear_calls();
        for i in 0..5 {
            batch.draw(&mut rnd, Some(&tex), i as f32, 0.0, 1.0, 1.0, 0.0);
        }
        batch.end(&mut rnd);
        assert_eq!(rnd.driver().element_draws(), vec![24, 6]);
        assert!(rnd.driver_mut().take_errors().is_empty());
    }

    #[test]
    fn no_texture_draws_with_the_flag_off() {
        let mut rnd = renderer();
        let mut batch = SpriteBatch::create(&mut rnd, 4).unwrap();
        let flag = {
            let shader = &mut batch.shader;
            shader.begin(&mut rnd);
            let loc = shader.location(&mut rnd, "u_use_texture").unwrap();
            shader.end(&mut rnd);
            loc
        };
        batch.begin(&mut rnd);
        batch.draw(&mut rnd, None, 0.0, 0.0, 1.0, 1.0, 0.0);
        batch.end(&mut rnd);
        assert!(rnd.driver().calls().contains(&Call::Uniform1i(flag, 0)));
        assert_eq!(rnd.driver().element_draws(), vec![6]);
    }

    #[test]
    fn empty_end_issues_no_draw_and_draw_outside_begin_is_ignored() {
        let mut rnd = renderer();
        let mut batch = SpriteBatch::create(&mut rnd, 4).unwrap();
        batch.draw(&mut rnd, None, 0.0, 0.0, 1.0, 1.0, 0.0);
        assert_eq!(batch.sprite_count(), 0);
        batch.begin(&mut rnd);
        batch.end(&mut rnd);
        assert!(rnd.driver().element_draws().is_empty());
        assert_eq!(rnd.active_program(), 0);
    }

    #[test]
    fn uvs_follow_the_texture_region() {
        let mut rnd = renderer();
        let mut batch = SpriteBatch::create(&mut rnd, 4).unwrap();
        batch.begin(&mut rnd);
        batch.set_texcoord(Vec4::new(0.25, 0.5, 0.75, 1.0));
        batch.set_color(Vec4::new(1.0, 0.0, 0.0, 1.0));
        batch.draw(&mut rnd, None, 0.0, 0.0, 1.0, 1.0, 0.0);
        let uvs: Vec<[f32; 2]> = batch.vertices.iter().map(|v| v.texcoord).collect();
        assert_eq!(uvs, vec![[0.25, 1.0], [0.75, 1.0], [0.75, 0.5], [0.25, 0.5]]);
        assert!(batch.vertices.iter().all(|v| v.color == [1.0, 0.0, 0.0, 1.0]));
        batch.reset_texcoord();
        assert_eq!(batch.texcoord(), FULL_TEXCOORD);
        batch.end(&mut rnd);
    }

    #[test]
    fn sampler_unit_is_leased_once_across_flushes() {
        let mut rnd = renderer();
        let a = texture(&mut rnd);
        let b = texture(&mut rnd);
        let mut batch = SpriteBatch::create(&mut rnd, 4).unwrap();
        batch.begin(&mut rnd);
        for _ in 0..3 {
            batch.draw(&mut rnd, Some(&a), 0.0, 0.0, 1.0, 1.0, 0.0);
            batch.draw(&mut rnd, Some(&b), 0.0, 0.0, 1.0, 1.0, 0.0);
        }
        batch.end(&mut rnd);
        assert_eq!(rnd.driver().element_draws().len(), 6);
        assert_eq!(rnd.texture_units().used(), 2);

        batch.destroy(&mut rnd);
        a.destroy(&mut rnd);
        b.destroy(&mut rnd);
        rnd.end_frame();
        assert_eq!(rnd.texture_units().used(), 1);
        assert_eq!(rnd.driver().live_count(), 0);
    }

    #[test]
    fn unlinked_program_is_rejected() {
        let mut rnd = renderer();
        let shader = ShaderProgram::create(
            &mut rnd,
            SPRITE_BATCH_VERTEX_SHADER,
            "#error broken fragment\n",
            None,
        );
        let err = SpriteBatch::with_shader(&mut rnd, 4, shader).err().unwrap();
        assert!(err.contains("broken fragment"));
        assert_eq!(rnd.driver().live_count(), 0);
    }

    #[test]
    fn batch_whose_program_failed_to_relink_stays_closed() {
        let mut rnd = renderer();
        let mut batch = SpriteBatch::create(&mut rnd, 4).unwrap();
        batch.shader.set_sources(SPRITE_BATCH_VERTEX_SHADER, "#error broken\n", None);
        assert!(batch.shader.compile(&mut rnd).is_err());
        rnd.driver_mut().clear_calls();

        batch.begin(&mut rnd);
        assert!(!batch.is_begun());
        batch.draw(&mut rnd, None, 0.0, 0.0, 1.0, 1.0, 0.0);
        batch.end(&mut rnd);
        assert!(rnd.driver().element_draws().is_empty());
        assert!(rnd.driver_mut().take_errors().is_empty());
    }

    #[test]
    fn shapes_between_begin_and_end_leave_the_batch_intact() {
        let mut rnd = renderer();
        let tex = texture(&mut rnd);
        let mut batch = SpriteBatch::create(&mut rnd, 4).unwrap();
        let mut shapes = SimpleDraw::create(&mut rnd).unwrap();
        batch.begin(&mut rnd);
        batch.draw(&mut rnd, Some(&tex), 0.0, 0.0, 4.0, 4.0, 0.0);
        shapes.triangles(
            &mut rnd,
            Vec4::ONE,
            &[Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
        );
        batch.draw(&mut rnd, Some(&tex), 4.0, 0.0, 4.0, 4.0, 0.0);
        batch.end(&mut rnd);

        assert!(rnd.driver_mut().take_errors().is_empty());
        assert_eq!(rnd.driver().element_draws(), vec![12]);
        assert_eq!(rnd.driver().count(|c| matches!(c, Call::DrawArrays { .. })), 1);
        assert_eq!(rnd.active_program(), 0);
    }
}
