//! Thin owners for driver buffer objects.
//!
//! None of these delete on `destroy`; the handle goes to the renderer's GC
//! and is deleted at the next frame boundary.

use crate::core::gfx::Renderer;
use crate::core::gfx::driver::{BufferTarget, BufferUsage, Driver, Handle};
use crate::core::gfx::gc::ResourceKind;
use crate::core::gfx::texture::Texture;
use log::{error, warn};
use smallvec::SmallVec;

#[derive(Debug)]
pub struct VertexArray {
    id: Handle,
}

impl VertexArray {
    pub fn create<D: Driver>(rnd: &mut Renderer<D>) -> Result<Self, String> {
        Ok(Self { id: rnd.driver.create_vertex_array()? })
    }

    #[inline(always)]
    pub const fn id(&self) -> Handle {
        self.id
    }

    pub fn begin<D: Driver>(&self, rnd: &mut Renderer<D>) {
        rnd.driver.bind_vertex_array(self.id);
    }

    pub fn end<D: Driver>(&self, rnd: &mut Renderer<D>) {
        rnd.driver.bind_vertex_array(0);
    }

    /// Float attribute `index` sourced from the bound vertex buffer. Call
    /// between `begin` and `end` with that buffer bound.
    pub fn attrib_pointer<D: Driver>(
        &self,
        rnd: &mut Renderer<D>,
        index: u32,
        components: i32,
        stride: usize,
        offset: usize,
    ) {
        rnd.driver.vertex_attrib_pointer(index, components, stride, offset);
    }

    pub fn destroy<D: Driver>(self, rnd: &mut Renderer<D>) {
        rnd.gc.push(ResourceKind::VertexArray, self.id);
    }
}

/// Shared body of the vertex and index buffer wrappers.
#[derive(Debug)]
struct GpuBuffer {
    id: Handle,
    target: BufferTarget,
    size: usize,
}

impl GpuBuffer {
    fn create<D: Driver>(
        rnd: &mut Renderer<D>,
        target: BufferTarget,
        data: Option<&[u8]>,
        usage: BufferUsage,
    ) -> Result<Self, String> {
        let id = rnd.driver.create_buffer()?;
        let mut buffer = Self { id, target, size: 0 };
        if let Some(data) = data {
            rnd.driver.bind_buffer(target, id);
            buffer.set_data(rnd, data, usage);
            rnd.driver.bind_buffer(target, 0);
        }
        Ok(buffer)
    }

    fn set_data<D: Driver>(&mut self, rnd: &mut Renderer<D>, data: &[u8], usage: BufferUsage) {
        rnd.driver.buffer_data(self.target, data, usage);
        self.size = data.len();
    }

    fn reserve<D: Driver>(&mut self, rnd: &mut Renderer<D>, size: usize, usage: BufferUsage) {
        rnd.driver.buffer_data_size(self.target, size, usage);
        self.size = size;
    }

    fn set_sub_data<D: Driver>(&self, rnd: &mut Renderer<D>, offset: usize, data: &[u8]) {
        if offset + data.len() > self.size {
            warn!(
                "Buffer {} update {}..{} exceeds its {} bytes; dropped.",
                self.id,
                offset,
                offset + data.len(),
                self.size
            );
            return;
        }
        rnd.driver.buffer_sub_data(self.target, offset, data);
    }
}

macro_rules! buffer_wrapper {
    ($(#[$meta:meta])* $name:ident, $target:expr, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name(GpuBuffer);

        impl $name {
            /// Creates the buffer, uploading `data` when given.
            pub fn create<D: Driver>(
                rnd: &mut Renderer<D>,
                data: Option<&[u8]>,
                usage: BufferUsage,
            ) -> Result<Self, String> {
                GpuBuffer::create(rnd, $target, data, usage).map(Self)
            }

            #[inline(always)]
            pub const fn id(&self) -> Handle {
                self.0.id
            }

            /// Allocated size in bytes.
            #[inline(always)]
            pub const fn size(&self) -> usize {
                self.0.size
            }

            pub fn begin<D: Driver>(&self, rnd: &mut Renderer<D>) {
                rnd.driver.bind_buffer($target, self.0.id);
            }

            pub fn end<D: Driver>(&self, rnd: &mut Renderer<D>) {
                rnd.driver.bind_buffer($target, 0);
            }

            /// Reallocates with `data`. The buffer must be bound.
            pub fn set_data<D: Driver>(&mut self, rnd: &mut Renderer<D>, data: &[u8], usage: BufferUsage) {
                self.0.set_data(rnd, data, usage);
            }

            /// Reallocates `size` uninitialised bytes. The buffer must be bound.
            pub fn reserve<D: Driver>(&mut self, rnd: &mut Renderer<D>, size: usize, usage: BufferUsage) {
                self.0.reserve(rnd, size, usage);
            }

            /// Overwrites in place. The buffer must be bound and the range
            /// must fit in the current allocation.
            pub fn set_sub_data<D: Driver>(&self, rnd: &mut Renderer<D>, offset: usize, data: &[u8]) {
                self.0.set_sub_data(rnd, offset, data);
            }

            pub fn destroy<D: Driver>(self, rnd: &mut Renderer<D>) {
                rnd.gc.push($kind, self.0.id);
            }
        }
    };
}

buffer_wrapper!(
    /// Vertex attribute storage.
    VertexBuffer,
    BufferTarget::Vertex,
    ResourceKind::VertexBuffer
);
buffer_wrapper!(
    /// u32 element indices.
    IndexBuffer,
    BufferTarget::Index,
    ResourceKind::IndexBuffer
);

/// Off-screen render target with a depth-stencil renderbuffer and up to
/// several color texture attachments.
#[derive(Debug)]
pub struct FrameBuffer {
    id: Handle,
    depth: Handle,
    width: u32,
    height: u32,
    attachments: SmallVec<[(u32, Handle); 4]>,
    bound: bool,
}

impl FrameBuffer {
    pub fn create<D: Driver>(rnd: &mut Renderer<D>, width: u32, height: u32) -> Result<Self, String> {
        let id = rnd.driver.create_framebuffer()?;
        let depth = match rnd.driver.create_renderbuffer() {
            Ok(depth) => depth,
            Err(e) => {
                rnd.gc.push(ResourceKind::FrameBuffer, id);
                return Err(e);
            }
        };
        rnd.driver.bind_framebuffer(id);
        rnd.driver.attach_depth_renderbuffer(depth, width, height);
        rnd.driver.bind_framebuffer(0);
        Ok(Self { id, depth, width, height, attachments: SmallVec::new(), bound: false })
    }

    #[inline(always)]
    pub const fn id(&self) -> Handle {
        self.id
    }

    #[inline(always)]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Attaches `texture` as color attachment `index`.
    pub fn attach_color<D: Driver>(&mut self, rnd: &mut Renderer<D>, index: u32, texture: &Texture) {
        self.set_attachment(rnd, index, texture.id());
    }

    pub fn detach_color<D: Driver>(&mut self, rnd: &mut Renderer<D>, index: u32) {
        self.set_attachment(rnd, index, 0);
    }

    fn set_attachment<D: Driver>(&mut self, rnd: &mut Renderer<D>, index: u32, texture: Handle) {
        if !self.bound {
            rnd.driver.bind_framebuffer(self.id);
        }
        rnd.driver.framebuffer_color_texture(index, texture);
        if !self.bound {
            rnd.driver.bind_framebuffer(0);
        }
        self.attachments.retain(|(i, _)| *i != index);
        if texture != 0 {
            self.attachments.push((index, texture));
        }
    }

    #[inline(always)]
    pub fn attachments(&self) -> &[(u32, Handle)] {
        &self.attachments
    }

    /// Sends fragment output to color attachment `index` alone. Only while
    /// bound.
    pub fn draw_to<D: Driver>(&self, rnd: &mut Renderer<D>, index: u32) {
        if self.bound {
            rnd.driver.draw_buffers(&[index]);
        }
    }

    /// Sends fragment outputs to every color attachment, in index order.
    pub fn draw_to_all<D: Driver>(&self, rnd: &mut Renderer<D>) {
        let mut indices: SmallVec<[u32; 4]> = self.attachments.iter().map(|(i, _)| *i).collect();
        indices.sort_unstable();
        if !self.bound {
            rnd.driver.bind_framebuffer(self.id);
        }
        rnd.driver.draw_buffers(&indices);
        if !self.bound {
            rnd.driver.bind_framebuffer(0);
        }
    }

    pub fn begin<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if self.bound {
            return;
        }
        rnd.driver.bind_framebuffer(self.id);
        if !rnd.driver.framebuffer_complete() {
            error!("Framebuffer {} is incomplete.", self.id);
        }
        rnd.driver.viewport(0, 0, self.width, self.height);
        self.bound = true;
    }

    /// Back to the default framebuffer and the window viewport.
    pub fn end<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if !self.bound {
            return;
        }
        rnd.driver.bind_framebuffer(0);
        let (w, h) = rnd.viewport_size();
        rnd.driver.viewport(0, 0, w, h);
        self.bound = false;
    }

    /// Clears color, depth and stencil. Only while bound.
    pub fn clear<D: Driver>(&self, rnd: &mut Renderer<D>, color: [f32; 4]) {
        if self.bound {
            rnd.driver.clear(color);
        }
    }

    /// Reallocates the depth storage. Color textures are the caller's to
    /// resize and re-attach.
    pub fn resize<D: Driver>(&mut self, rnd: &mut Renderer<D>, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        if !self.bound {
            rnd.driver.bind_framebuffer(self.id);
        }
        rnd.driver.attach_depth_renderbuffer(self.depth, width, height);
        if self.bound {
            rnd.driver.viewport(0, 0, width, height);
        } else {
            rnd.driver.bind_framebuffer(0);
        }
    }

    pub fn destroy<D: Driver>(mut self, rnd: &mut Renderer<D>) {
        self.end(rnd);
        rnd.gc.push(ResourceKind::FrameBuffer, self.id);
        rnd.gc.push(ResourceKind::RenderBuffer, self.depth);
    }
}

/// Primitives-generated query.
#[derive(Debug)]
pub struct Query {
    id: Handle,
    running: bool,
}

impl Query {
    pub fn create<D: Driver>(rnd: &mut Renderer<D>) -> Result<Self, String> {
        Ok(Self { id: rnd.driver.create_query()?, running: false })
    }

    #[inline(always)]
    pub const fn id(&self) -> Handle {
        self.id
    }

    pub fn begin<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if self.running {
            return;
        }
        rnd.driver.begin_primitives_query(self.id);
        self.running = true;
    }

    pub fn end<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if !self.running {
            return;
        }
        rnd.driver.end_primitives_query();
        self.running = false;
    }

    /// Blocks until the result is available.
    pub fn primitives<D: Driver>(&mut self, rnd: &mut Renderer<D>) -> u32 {
        self.end(rnd);
        rnd.driver.query_result(self.id)
    }

    pub fn destroy<D: Driver>(mut self, rnd: &mut Renderer<D>) {
        self.end(rnd);
        rnd.gc.push(ResourceKind::Query, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfx::RendererOptions;
    use crate::core::gfx::backends::headless::{Call, HeadlessDriver};
    use crate::core::gfx::driver::Primitive;

    fn renderer() -> Renderer<HeadlessDriver> {
        Renderer::new(HeadlessDriver::default(), RendererOptions::default())
    }

    #[test]
    fn vertex_buffer_uploads_and_updates_in_place() {
        let mut rnd = renderer();
        let mut vbo = VertexBuffer::create(&mut rnd, Some(&[0u8; 64]), BufferUsage::Dynamic).unwrap();
        assert_eq!(vbo.size(), 64);

        vbo.begin(&mut rnd);
        vbo.set_sub_data(&mut rnd, 16, &[1u8; 16]);
        // Past the end: dropped before it reaches the driver.
        vbo.set_sub_data(&mut rnd, 60, &[1u8; 16]);
        vbo.reserve(&mut rnd, 128, BufferUsage::Dynamic);
        vbo.set_sub_data(&mut rnd, 60, &[1u8; 16]);
        vbo.end(&mut rnd);

        assert_eq!(
            rnd.driver().count(|c| matches!(c, Call::BufferSubData { .. })),
            2
        );
        assert!(rnd.driver_mut().take_errors().is_empty());
    }

    #[test]
    fn destroy_defers_to_the_next_flush() {
        let mut rnd = renderer();
        let vao = VertexArray::create(&mut rnd).unwrap();
        let ebo = IndexBuffer::create(&mut rnd, None, BufferUsage::Static).unwrap();
        let (vao_id, ebo_id) = (vao.id(), ebo.id());
        vao.destroy(&mut rnd);
        ebo.destroy(&mut rnd);
        assert!(rnd.driver().is_live(vao_id));
        assert!(rnd.gc().is_pending(ResourceKind::IndexBuffer, ebo_id));

        rnd.end_frame();
        assert!(!rnd.driver().is_live(vao_id));
        assert!(!rnd.driver().is_live(ebo_id));
    }

    #[test]
    fn framebuffer_restores_window_viewport() {
        let mut rnd = renderer();
        rnd.resize(800, 600);
        let mut fbo = FrameBuffer::create(&mut rnd, 256, 128).unwrap();
        let color = Texture::empty(&mut rnd, 256, 128, Default::default()).unwrap();
        fbo.attach_color(&mut rnd, 0, &color);
        assert_eq!(fbo.attachments(), &[(0, color.id())]);

        fbo.begin(&mut rnd);
        assert!(rnd.driver().calls().contains(&Call::Viewport(0, 0, 256, 128)));
        fbo.clear(&mut rnd, [0.0; 4]);
        fbo.end(&mut rnd);
        assert_eq!(rnd.driver().calls().last(), Some(&Call::Viewport(0, 0, 800, 600)));

        let (fbo_id, rbo_id) = (fbo.id(), fbo.depth);
        fbo.destroy(&mut rnd);
        color.destroy(&mut rnd);
        rnd.end_frame();
        assert!(!rnd.driver().is_live(fbo_id));
        assert!(!rnd.driver().is_live(rbo_id));
        assert_eq!(rnd.driver().live_count(), 0);
    }

    #[test]
    fn draw_buffer_selection_targets_the_framebuffer() {
        let mut rnd = renderer();
        let mut fbo = FrameBuffer::create(&mut rnd, 64, 64).unwrap();
        let a = Texture::empty(&mut rnd, 64, 64, Default::default()).unwrap();
        let b = Texture::empty(&mut rnd, 64, 64, Default::default()).unwrap();
        fbo.attach_color(&mut rnd, 1, &b);
        fbo.attach_color(&mut rnd, 0, &a);

        fbo.draw_to_all(&mut rnd);
        assert!(rnd.driver().calls().contains(&Call::DrawBuffers(vec![0, 1])));
        assert_eq!(rnd.driver().bound_framebuffer(), 0);

        rnd.driver_mut().clear_calls();
        fbo.draw_to(&mut rnd, 1);
        assert!(rnd.driver().calls().is_empty());
        fbo.begin(&mut rnd);
        fbo.draw_to(&mut rnd, 1);
        assert_eq!(rnd.driver().calls().last(), Some(&Call::DrawBuffers(vec![1])));
        fbo.end(&mut rnd);
        assert!(rnd.driver_mut().take_errors().is_empty());
    }

    #[test]
    fn query_counts_triangles() {
        let mut rnd = renderer();
        let mut q = Query::create(&mut rnd).unwrap();
        q.begin(&mut rnd);
        rnd.driver_mut().draw_arrays(Primitive::Triangles, 0, 9);
        assert_eq!(q.primitives(&mut rnd), 3);
        q.destroy(&mut rnd);
    }
}
