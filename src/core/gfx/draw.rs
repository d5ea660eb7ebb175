use crate::core::gfx::Renderer;
use crate::core::gfx::buffers::{VertexArray, VertexBuffer};
use crate::core::gfx::driver::{BufferUsage, Driver, Primitive};
use crate::core::gfx::shader::ShaderProgram;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use std::f32::consts::TAU;
use std::mem;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
    pub texcoord: [f32; 2],
}

impl Default for Vertex {
    #[inline(always)]
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0; 3],
            color: [1.0; 4],
            texcoord: [0.0; 2],
        }
    }
}

impl Vertex {
    #[inline(always)]
    pub fn at(p: Vec3) -> Self {
        Self { position: p.to_array(), ..Self::default() }
    }
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

/// Single-color shapes through the default program.
///
/// One dynamic vertex buffer is shared by every call. It only grows, with a
/// full reallocation, when a shape needs more vertices than any before it;
/// otherwise the data is overwritten in place.
pub struct SimpleDraw {
    shader: ShaderProgram,
    vao: VertexArray,
    vbo: VertexBuffer,
    vertex_capacity: usize,
    scratch: Vec<Vertex>,
}

impl SimpleDraw {
    pub fn create<D: Driver>(rnd: &mut Renderer<D>) -> Result<Self, String> {
        let shader = ShaderProgram::default_program(rnd);
        if let Some(e) = shader.error() {
            return Err(format!("Default program: {e}"));
        }
        let stride = mem::size_of::<Vertex>();
        let vao = VertexArray::create(rnd)?;
        let vbo = VertexBuffer::create(rnd, None, BufferUsage::Dynamic)?;

        vao.begin(rnd);
        vbo.begin(rnd);
        // a_position (0), a_normal (1), a_color (2), a_texcoord (3)
        vao.attrib_pointer(rnd, 0, 3, stride, mem::offset_of!(Vertex, position));
        vao.attrib_pointer(rnd, 1, 3, stride, mem::offset_of!(Vertex, normal));
        vao.attrib_pointer(rnd, 2, 4, stride, mem::offset_of!(Vertex, color));
        vao.attrib_pointer(rnd, 3, 2, stride, mem::offset_of!(Vertex, texcoord));
        vbo.end(rnd);
        vao.end(rnd);

        Ok(Self { shader, vao, vbo, vertex_capacity: 0, scratch: Vec::new() })
    }

    /// Largest vertex count the buffer currently holds.
    #[inline(always)]
    pub const fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }

    fn render<D: Driver>(&mut self, rnd: &mut Renderer<D>, color: Vec4, primitive: Primitive) {
        let count = self.scratch.len();
        if count == 0 {
            return;
        }
        let (view, proj) = (rnd.view(), rnd.projection());
        let points = primitive == Primitive::Points;
        let shd = &mut self.shader;
        shd.begin(rnd);
        self.vao.begin(rnd);
        self.vbo.begin(rnd);
        shd.set_bool(rnd, "u_use_points", points);
        shd.set_bool(rnd, "u_use_texture", false);
        shd.set_bool(rnd, "u_use_normals", false);
        shd.set_bool(rnd, "u_use_vcolor", false);
        shd.set_vec4(rnd, "u_color", color);
        shd.set_mat4(rnd, "u_model", &Mat4::IDENTITY);
        shd.set_mat4(rnd, "u_view", &view);
        shd.set_mat4(rnd, "u_proj", &proj);

        let bytes: &[u8] = bytemuck::cast_slice(&self.scratch);
        if count > self.vertex_capacity {
            self.vbo.set_data(rnd, bytes, BufferUsage::Dynamic);
            self.vertex_capacity = count;
        } else {
            self.vbo.set_sub_data(rnd, 0, bytes);
        }
        rnd.driver.draw_arrays(primitive, 0, count);

        self.vbo.end(rnd);
        self.vao.end(rnd);
        shd.end(rnd);
    }

    fn shape<D: Driver>(
        &mut self,
        rnd: &mut Renderer<D>,
        color: Vec4,
        points: impl IntoIterator<Item = Vec3>,
        primitive: Primitive,
    ) {
        self.scratch.clear();
        self.scratch.extend(points.into_iter().map(Vertex::at));
        self.render(rnd, color, primitive);
    }

    pub fn point<D: Driver>(&mut self, rnd: &mut Renderer<D>, color: Vec4, point: Vec3, size: f32) {
        self.points(rnd, color, &[point], size);
    }

    /// Round points of `size` pixels.
    pub fn points<D: Driver>(&mut self, rnd: &mut Renderer<D>, color: Vec4, points: &[Vec3], size: f32) {
        self.shader.begin(rnd);
        self.shader.set_float(rnd, "u_point_size", size);
        self.shape(rnd, color, points.iter().copied(), Primitive::Points);
        self.shader.end(rnd);
    }

    pub fn line<D: Driver>(
        &mut self,
        rnd: &mut Renderer<D>,
        color: Vec4,
        start: Vec3,
        end: Vec3,
        width: f32,
    ) {
        rnd.driver.line_width(width);
        self.shape(rnd, color, [start, end], Primitive::Lines);
    }

    pub fn line_strip<D: Driver>(&mut self, rnd: &mut Renderer<D>, color: Vec4, points: &[Vec3], width: f32) {
        rnd.driver.line_width(width);
        self.shape(rnd, color, points.iter().copied(), Primitive::LineStrip);
    }

    pub fn line_loop<D: Driver>(&mut self, rnd: &mut Renderer<D>, color: Vec4, points: &[Vec3], width: f32) {
        rnd.driver.line_width(width);
        self.shape(rnd, color, points.iter().copied(), Primitive::LineLoop);
    }

    pub fn triangles<D: Driver>(&mut self, rnd: &mut Renderer<D>, color: Vec4, points: &[Vec3]) {
        self.shape(rnd, color, points.iter().copied(), Primitive::Triangles);
    }

    pub fn triangle_strip<D: Driver>(&mut self, rnd: &mut Renderer<D>, color: Vec4, points: &[Vec3]) {
        self.shape(rnd, color, points.iter().copied(), Primitive::TriangleStrip);
    }

    pub fn triangle_fan<D: Driver>(&mut self, rnd: &mut Renderer<D>, color: Vec4, points: &[Vec3]) {
        self.shape(rnd, color, points.iter().copied(), Primitive::TriangleFan);
    }

    pub fn quad<D: Driver>(
        &mut self,
        rnd: &mut Renderer<D>,
        color: Vec4,
        origin: Vec3,
        size: Vec2,
        width: f32,
    ) {
        rnd.driver.line_width(width);
        self.shape(rnd, color, quad_outline(origin, size), Primitive::LineLoop);
    }

    pub fn quad_fill<D: Driver>(&mut self, rnd: &mut Renderer<D>, color: Vec4, origin: Vec3, size: Vec2) {
        self.shape(rnd, color, quad_fill(origin, size), Primitive::Triangles);
    }

    pub fn circle<D: Driver>(
        &mut self,
        rnd: &mut Renderer<D>,
        color: Vec4,
        center: Vec3,
        radius: f32,
        segments: u32,
        width: f32,
    ) {
        rnd.driver.line_width(width);
        self.shape(rnd, color, circle_outline(center, radius, segments), Primitive::LineLoop);
    }

    pub fn circle_fill<D: Driver>(
        &mut self,
        rnd: &mut Renderer<D>,
        color: Vec4,
        center: Vec3,
        radius: f32,
        segments: u32,
    ) {
        self.shape(rnd, color, circle_fill(center, radius, segments), Primitive::Triangles);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn star<D: Driver>(
        &mut self,
        rnd: &mut Renderer<D>,
        color: Vec4,
        center: Vec3,
        outer: f32,
        inner: f32,
        tips: u32,
        width: f32,
    ) {
        rnd.driver.line_width(width);
        self.shape(rnd, color, star_outline(center, outer, inner, tips), Primitive::LineLoop);
    }

    pub fn star_fill<D: Driver>(
        &mut self,
        rnd: &mut Renderer<D>,
        color: Vec4,
        center: Vec3,
        outer: f32,
        inner: f32,
        tips: u32,
    ) {
        self.shape(rnd, color, star_fill(center, outer, inner, tips), Primitive::Triangles);
    }

    pub fn destroy<D: Driver>(self, rnd: &mut Renderer<D>) {
        self.vao.destroy(rnd);
        self.vbo.destroy(rnd);
        self.shader.destroy(rnd);
    }
}

// --- Geometry ---

pub fn quad_outline(origin: Vec3, size: Vec2) -> [Vec3; 4] {
    let (x, y, z) = (origin.x, origin.y, origin.z);
    [
        Vec3::new(x, y, z),
        Vec3::new(x + size.x, y, z),
        Vec3::new(x + size.x, y + size.y, z),
        Vec3::new(x, y + size.y, z),
    ]
}

pub fn quad_fill(origin: Vec3, size: Vec2) -> [Vec3; 6] {
    let [a, b, c, d] = quad_outline(origin, size);
    [a, b, c, c, d, a]
}

pub fn circle_outline(center: Vec3, radius: f32, segments: u32) -> Vec<Vec3> {
    let n = segments.max(3);
    (0..n)
        .map(|i| {
            let (sin, cos) = (TAU * i as f32 / n as f32).sin_cos();
            center + Vec3::new(cos * radius, sin * radius, 0.0)
        })
        .collect()
}

/// One center-rim-rim triangle per segment.
pub fn circle_fill(center: Vec3, radius: f32, segments: u32) -> Vec<Vec3> {
    let rim = circle_outline(center, radius, segments);
    (0..rim.len())
        .flat_map(|i| [center, rim[i], rim[(i + 1) % rim.len()]])
        .collect()
}

/// Alternating outer/inner points, first tip straight up (+y).
pub fn star_outline(center: Vec3, outer: f32, inner: f32, tips: u32) -> Vec<Vec3> {
    let n = tips.max(2) * 2;
    (0..n)
        .map(|i| {
            let radius = if i % 2 == 0 { outer } else { inner };
            let (sin, cos) = (TAU * i as f32 / n as f32).sin_cos();
            center + Vec3::new(sin * radius, cos * radius, 0.0)
        })
        .collect()
}

pub fn star_fill(center: Vec3, outer: f32, inner: f32, tips: u32) -> Vec<Vec3> {
    let rim = star_outline(center, outer, inner, tips);
    (0..rim.len())
        .flat_map(|i| [center, rim[i], rim[(i + 1) % rim.len()]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfx::RendererOptions;
    use crate::core::gfx::backends::headless::{Call, HeadlessDriver};

    fn renderer() -> Renderer<HeadlessDriver> {
        Renderer::new(HeadlessDriver::default(), RendererOptions::default())
    }

    #[test]
    fn buffer_grows_only_past_its_high_water_mark() {
        let mut rnd = renderer();
        let mut draw = SimpleDraw::create(&mut rnd).unwrap();
        rnd.driver_mut().clear_calls();

        draw.quad_fill(&mut rnd, Vec4::ONE, Vec3::ZERO, Vec2::splat(10.0));
        draw.line(&mut rnd, Vec4::ONE, Vec3::ZERO, Vec3::X, 1.0);
        draw.circle_fill(&mut rnd, Vec4::ONE, Vec3::ZERO, 5.0, 16);
        assert_eq!(draw.vertex_capacity(), 48);

        let reallocs = rnd.driver().count(|c| matches!(c, Call::BufferData { .. }));
        let updates = rnd.driver().count(|c| matches!(c, Call::BufferSubData { .. }));
        assert_eq!((reallocs, updates), (2, 1));
        assert_eq!(rnd.driver().count(Call::is_draw), 3);
        assert!(rnd.driver_mut().take_errors().is_empty());
        assert_eq!(rnd.active_program(), 0);
    }

    #[test]
    fn color_is_cached_between_shapes() {
        let mut rnd = renderer();
        let mut draw = SimpleDraw::create(&mut rnd).unwrap();
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        draw.triangles(&mut rnd, red, &[Vec3::ZERO, Vec3::X, Vec3::Y]);
        rnd.driver_mut().clear_calls();
        draw.triangles(&mut rnd, red, &[Vec3::ZERO, Vec3::X, Vec3::Y]);
        assert_eq!(rnd.driver().count(|c| matches!(c, Call::Uniform4f(..))), 0);
    }

    #[test]
    fn points_set_size_and_flag() {
        let mut rnd = renderer();
        let mut draw = SimpleDraw::create(&mut rnd).unwrap();
        draw.point(&mut rnd, Vec4::ONE, Vec3::ZERO, 4.0);
        assert!(rnd.driver().calls().iter().any(|c| matches!(c, Call::Uniform1f(_, s) if *s == 4.0)));
        assert!(rnd.driver().calls().contains(&Call::DrawArrays {
            primitive: Primitive::Points,
            first: 0,
            count: 1
        }));
        draw.destroy(&mut rnd);
        rnd.end_frame();
        assert_eq!(rnd.driver().live_count(), 0);
    }

    #[test]
    fn empty_shapes_draw_nothing() {
        let mut rnd = renderer();
        let mut draw = SimpleDraw::create(&mut rnd).unwrap();
        rnd.driver_mut().clear_calls();
        draw.line_strip(&mut rnd, Vec4::ONE, &[], 1.0);
        assert_eq!(rnd.driver().count(Call::is_draw), 0);
    }

    #[test]
    fn shape_vertex_counts() {
        assert_eq!(circle_outline(Vec3::ZERO, 1.0, 1).len(), 3);
        assert_eq!(circle_fill(Vec3::ZERO, 1.0, 8).len(), 24);
        assert_eq!(star_outline(Vec3::ZERO, 2.0, 1.0, 5).len(), 10);
        assert_eq!(star_fill(Vec3::ZERO, 2.0, 1.0, 5).len(), 30);
        let tip = star_outline(Vec3::ZERO, 2.0, 1.0, 5)[0];
        assert!((tip - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-6);
        for p in circle_outline(Vec3::new(3.0, 4.0, 0.0), 2.0, 12) {
            assert!(((p - Vec3::new(3.0, 4.0, 0.0)).length() - 2.0).abs() < 1e-5);
        }
    }
}
