//! Deferred deletion of GPU objects.
//!
//! Wrappers push their handles here when destroyed instead of deleting them
//! on the spot; `flush` performs the real deletes at a frame boundary where
//! no draw can still reference them.

use crate::core::gfx::driver::{Driver, Handle};
use log::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    VertexBuffer,
    IndexBuffer,
    VertexArray,
    FrameBuffer,
    RenderBuffer,
    Texture,
    Query,
}

impl ResourceKind {
    pub const ALL: [Self; 7] = [
        Self::VertexBuffer,
        Self::IndexBuffer,
        Self::VertexArray,
        Self::FrameBuffer,
        Self::RenderBuffer,
        Self::Texture,
        Self::Query,
    ];

    #[inline(always)]
    const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VertexBuffer => "vertex buffer",
            Self::IndexBuffer => "index buffer",
            Self::VertexArray => "vertex array",
            Self::FrameBuffer => "framebuffer",
            Self::RenderBuffer => "renderbuffer",
            Self::Texture => "texture",
            Self::Query => "query",
        }
    }
}

#[derive(Debug, Default)]
pub struct ResourceGc {
    pending: [Vec<Handle>; 7],
}

impl ResourceGc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `handle` for deletion. Zero handles are ignored.
    pub fn push(&mut self, kind: ResourceKind, handle: Handle) {
        if handle == 0 {
            return;
        }
        trace!("GC: queued {} {handle}", kind.as_str());
        self.pending[kind.index()].push(handle);
    }

    pub fn is_pending(&self, kind: ResourceKind, handle: Handle) -> bool {
        self.pending[kind.index()].contains(&handle)
    }

    #[inline(always)]
    pub fn pending(&self, kind: ResourceKind) -> &[Handle] {
        &self.pending[kind.index()]
    }

    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(Vec::len).sum()
    }

    /// Deletes everything queued, one batched driver call per non-empty kind.
    pub fn flush(&mut self, driver: &mut impl Driver) {
        for kind in ResourceKind::ALL {
            let list = &mut self.pending[kind.index()];
            if list.is_empty() {
                continue;
            }
            match kind {
                ResourceKind::VertexBuffer | ResourceKind::IndexBuffer => driver.delete_buffers(list),
                ResourceKind::VertexArray => driver.delete_vertex_arrays(list),
                ResourceKind::FrameBuffer => driver.delete_framebuffers(list),
                ResourceKind::RenderBuffer => driver.delete_renderbuffers(list),
                ResourceKind::Texture => driver.delete_textures(list),
                ResourceKind::Query => driver.delete_queries(list),
            }
            trace!("GC: deleted {} {}(s)", list.len(), kind.as_str());
            list.clear();
        }
    }

    /// Final flush, then drops the list storage.
    pub fn destroy(&mut self, driver: &mut impl Driver) {
        let count = self.pending_count();
        self.flush(driver);
        self.pending = Default::default();
        debug!("GC destroyed ({count} handle(s) released on the way out).");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfx::backends::headless::{Call, HeadlessDriver};

    #[test]
    fn handles_wait_for_flush() {
        let mut d = HeadlessDriver::default();
        let mut gc = ResourceGc::new();
        let t = d.create_texture().unwrap();
        gc.push(ResourceKind::Texture, t);
        assert!(gc.is_pending(ResourceKind::Texture, t));
        assert!(d.is_live(t));

        gc.flush(&mut d);
        assert!(!gc.is_pending(ResourceKind::Texture, t));
        assert!(!d.is_live(t));
        assert!(d.take_errors().is_empty());
    }

    #[test]
    fn zero_handle_is_ignored() {
        let mut gc = ResourceGc::new();
        gc.push(ResourceKind::VertexArray, 0);
        assert_eq!(gc.pending_count(), 0);
    }

    #[test]
    fn one_delete_call_per_kind() {
        let mut d = HeadlessDriver::default();
        let mut gc = ResourceGc::new();
        let vbo = d.create_buffer().unwrap();
        let ebo = d.create_buffer().unwrap();
        let t1 = d.create_texture().unwrap();
        let t2 = d.create_texture().unwrap();
        gc.push(ResourceKind::VertexBuffer, vbo);
        gc.push(ResourceKind::IndexBuffer, ebo);
        gc.push(ResourceKind::Texture, t1);
        gc.push(ResourceKind::Texture, t2);
        d.clear_calls();

        gc.flush(&mut d);
        assert_eq!(d.count(|c| matches!(c, Call::DeleteTextures(_))), 1);
        assert!(d.calls().contains(&Call::DeleteTextures(vec![t1, t2])));
        assert_eq!(d.count(|c| matches!(c, Call::DeleteBuffers(_))), 2);
        assert_eq!(d.live_count(), 0);

        d.clear_calls();
        gc.flush(&mut d);
        assert!(d.calls().is_empty());
    }
}
