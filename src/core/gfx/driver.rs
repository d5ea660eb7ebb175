use crate::core::gfx::SamplerDesc;

/// Raw GPU object name. Zero means "no object".
pub type Handle = u32;

/// Uniform location. Negative means "not found".
pub type Location = i32;

pub const NO_LOCATION: Location = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
    Stream,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureKind {
    #[default]
    Texture2D,
    Texture3D,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Straight alpha: `src * a + dst * (1 - a)`.
    #[default]
    Alpha,
    /// `src * a + dst`, for accumulating light.
    Additive,
}

/// Video memory as reported by a vendor extension, in KiB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_kb: u32,
    pub free_kb: u32,
}

impl MemoryInfo {
    #[inline(always)]
    pub const fn used_kb(&self) -> u32 {
        self.total_kb.saturating_sub(self.free_kb)
    }
}

/// RGBA8 pixel upload. `data` of `None` allocates storage only.
#[derive(Clone, Copy, Debug)]
pub struct TextureImage<'a> {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub data: Option<&'a [u8]>,
}

#[derive(Clone, Copy, Debug)]
pub struct ProgramSource<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub geometry: Option<&'a str>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DriverInfo {
    pub vendor: String,
    pub renderer: String,
    pub version: String,
    pub shading_language: String,
    pub max_texture_size: u32,
}

/// The bind-then-draw surface everything in `gfx` is written against.
///
/// Handles are plain integers so the core can cache and compare them without
/// caring which backend produced them. Methods that can fail return the driver
/// log as a `String`, matching `glow`.
pub trait Driver {
    fn info(&self) -> DriverInfo;
    /// Number of combined texture image units; 0 if the driver won't say.
    fn max_texture_units(&self) -> usize;

    fn create_buffer(&mut self) -> Result<Handle, String>;
    fn delete_buffers(&mut self, buffers: &[Handle]);
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Handle);
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    fn buffer_data_size(&mut self, target: BufferTarget, size: usize, usage: BufferUsage);
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]);

    fn create_vertex_array(&mut self) -> Result<Handle, String>;
    fn delete_vertex_arrays(&mut self, arrays: &[Handle]);
    fn bind_vertex_array(&mut self, array: Handle);
    /// Enables `index` and points it at float data in the bound vertex buffer.
    fn vertex_attrib_pointer(&mut self, index: u32, components: i32, stride: usize, offset: usize);

    fn create_texture(&mut self) -> Result<Handle, String>;
    fn delete_textures(&mut self, textures: &[Handle]);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, kind: TextureKind, texture: Handle);
    fn tex_image(&mut self, kind: TextureKind, image: &TextureImage<'_>);
    fn tex_sampler(&mut self, kind: TextureKind, sampler: SamplerDesc);
    fn generate_mipmap(&mut self, kind: TextureKind);

    fn create_framebuffer(&mut self) -> Result<Handle, String>;
    fn delete_framebuffers(&mut self, framebuffers: &[Handle]);
    fn bind_framebuffer(&mut self, framebuffer: Handle);
    fn framebuffer_color_texture(&mut self, attachment: u32, texture: Handle);
    fn framebuffer_complete(&mut self) -> bool;
    /// Routes fragment outputs of the bound framebuffer to these color
    /// attachments, in order. Empty disables color writes.
    fn draw_buffers(&mut self, attachments: &[u32]);

    fn create_renderbuffer(&mut self) -> Result<Handle, String>;
    fn delete_renderbuffers(&mut self, renderbuffers: &[Handle]);
    /// Allocates depth-stencil storage for `renderbuffer` and attaches it to
    /// the bound framebuffer.
    fn attach_depth_renderbuffer(&mut self, renderbuffer: Handle, width: u32, height: u32);

    fn create_query(&mut self) -> Result<Handle, String>;
    fn delete_queries(&mut self, queries: &[Handle]);
    fn begin_primitives_query(&mut self, query: Handle);
    fn end_primitives_query(&mut self);
    fn query_result(&mut self, query: Handle) -> u32;

    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<Handle, String>;
    fn delete_program(&mut self, program: Handle);
    fn use_program(&mut self, program: Handle);
    fn uniform_location(&mut self, program: Handle, name: &str) -> Option<Location>;

    fn uniform_1_i32(&mut self, location: Location, value: i32);
    fn uniform_1_f32(&mut self, location: Location, value: f32);
    fn uniform_2_f32(&mut self, location: Location, value: [f32; 2]);
    fn uniform_3_f32(&mut self, location: Location, value: [f32; 3]);
    fn uniform_4_f32(&mut self, location: Location, value: [f32; 4]);
    fn uniform_1_f32_slice(&mut self, location: Location, values: &[f32]);
    fn uniform_4_f32_slice(&mut self, location: Location, values: &[f32]);
    fn uniform_matrix_2_f32(&mut self, location: Location, values: &[f32; 4]);
    fn uniform_matrix_3_f32(&mut self, location: Location, values: &[f32; 9]);
    fn uniform_matrix_4_f32(&mut self, location: Location, values: &[f32; 16]);

    /// Draws `count` u32 indices from the bound index buffer starting at
    /// index `first`.
    fn draw_elements(&mut self, primitive: Primitive, count: usize, first: usize);
    fn draw_arrays(&mut self, primitive: Primitive, first: usize, count: usize);

    fn line_width(&mut self, width: f32);
    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    fn clear(&mut self, color: [f32; 4]);
    fn blend_mode(&mut self, mode: BlendMode);
    /// Standard straight-alpha blending plus program point size.
    fn init_state(&mut self);
    /// `None` when the driver exposes no memory query.
    fn memory_info(&mut self) -> Option<MemoryInfo>;
}
