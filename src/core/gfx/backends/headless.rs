use crate::core::gfx::SamplerDesc;
use crate::core::gfx::driver::{
    BlendMode, BufferTarget, BufferUsage, Driver, DriverInfo, Handle, Location, MemoryInfo,
    Primitive, ProgramSource, TextureImage, TextureKind,
};
use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};

/// One recorded driver call.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CreateBuffer(Handle),
    DeleteBuffers(Vec<Handle>),
    BindBuffer(BufferTarget, Handle),
    BufferData { target: BufferTarget, len: usize },
    BufferSubData { target: BufferTarget, offset: usize, len: usize },
    CreateVertexArray(Handle),
    DeleteVertexArrays(Vec<Handle>),
    BindVertexArray(Handle),
    VertexAttribPointer { index: u32, components: i32, stride: usize, offset: usize },
    CreateTexture(Handle),
    DeleteTextures(Vec<Handle>),
    ActiveTexture(u32),
    BindTexture(TextureKind, Handle),
    TexImage { kind: TextureKind, width: u32, height: u32, depth: u32 },
    TexSampler(TextureKind, SamplerDesc),
    GenerateMipmap(TextureKind),
    CreateFramebuffer(Handle),
    DeleteFramebuffers(Vec<Handle>),
    BindFramebuffer(Handle),
    FramebufferColorTexture { attachment: u32, texture: Handle },
    DrawBuffers(Vec<u32>),
    CreateRenderbuffer(Handle),
    DeleteRenderbuffers(Vec<Handle>),
    AttachDepthRenderbuffer { renderbuffer: Handle, width: u32, height: u32 },
    CreateQuery(Handle),
    DeleteQueries(Vec<Handle>),
    BeginQuery(Handle),
    EndQuery,
    CreateProgram(Handle),
    DeleteProgram(Handle),
    UseProgram(Handle),
    UniformLocation(Handle, String),
    Uniform1i(Location, i32),
    Uniform1f(Location, f32),
    Uniform2f(Location, [f32; 2]),
    Uniform3f(Location, [f32; 3]),
    Uniform4f(Location, [f32; 4]),
    UniformFloatArray(Location, usize),
    UniformVec4Array(Location, usize),
    UniformMatrix(Location, usize),
    DrawElements { primitive: Primitive, count: usize, first: usize },
    DrawArrays { primitive: Primitive, first: usize, count: usize },
    LineWidth(f32),
    Viewport(i32, i32, u32, u32),
    Clear([f32; 4]),
    Blend(BlendMode),
    InitState,
}

impl Call {
    #[inline(always)]
    pub const fn is_uniform(&self) -> bool {
        matches!(
            self,
            Self::Uniform1i(..)
                | Self::Uniform1f(..)
                | Self::Uniform2f(..)
                | Self::Uniform3f(..)
                | Self::Uniform4f(..)
                | Self::UniformFloatArray(..)
                | Self::UniformVec4Array(..)
                | Self::UniformMatrix(..)
        )
    }

    #[inline(always)]
    pub const fn is_draw(&self) -> bool {
        matches!(self, Self::DrawElements { .. } | Self::DrawArrays { .. })
    }
}

/// A driver with no GPU behind it.
///
/// Handles come from one monotonic counter, uniform locations are assigned by
/// scanning `uniform <type> <name>` declarations, and a source containing
/// `#error` fails to compile. Every call is recorded, and misuse a real driver
/// would flag with an error code lands in `take_errors`.
pub struct HeadlessDriver {
    next_handle: Handle,
    max_texture_units: usize,
    calls: Vec<Call>,
    live: FxHashSet<Handle>,
    programs: FxHashMap<Handle, FxHashMap<String, Location>>,
    buffer_sizes: FxHashMap<Handle, usize>,
    bound_buffers: [Handle; 2],
    bound_textures: FxHashMap<u32, (TextureKind, Handle)>,
    active_unit: u32,
    current_program: Handle,
    framebuffer: Handle,
    blend: BlendMode,
    errors: Vec<String>,
}

/// Reported by `memory_info`: 1 GiB, nothing used.
pub const HEADLESS_MEMORY_KB: u32 = 1 << 20;

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new(16)
    }
}

impl HeadlessDriver {
    pub fn new(max_texture_units: usize) -> Self {
        Self {
            next_handle: 1,
            max_texture_units,
            calls: Vec::new(),
            live: FxHashSet::default(),
            programs: FxHashMap::default(),
            buffer_sizes: FxHashMap::default(),
            bound_buffers: [0; 2],
            bound_textures: FxHashMap::default(),
            active_unit: 0,
            current_program: 0,
            framebuffer: 0,
            blend: BlendMode::Alpha,
            errors: Vec::new(),
        }
    }

    #[inline(always)]
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    #[inline(always)]
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Index counts of every recorded `draw_elements`, in order.
    pub fn element_draws(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::DrawElements { count, .. } => Some(*count),
                _ => None,
            })
            .collect()
    }

    #[inline(always)]
    pub fn is_live(&self, handle: Handle) -> bool {
        self.live.contains(&handle)
    }

    #[inline(always)]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    #[inline(always)]
    pub const fn current_program(&self) -> Handle {
        self.current_program
    }

    #[inline(always)]
    pub const fn blend(&self) -> BlendMode {
        self.blend
    }

    #[inline(always)]
    pub const fn bound_framebuffer(&self) -> Handle {
        self.framebuffer
    }

    pub fn bound_texture(&self, unit: u32) -> Option<(TextureKind, Handle)> {
        self.bound_textures.get(&unit).copied()
    }

    pub fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    fn alloc(&mut self) -> Handle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle);
        handle
    }

    fn release(&mut self, handles: &[Handle]) {
        for h in handles {
            if *h != 0 && !self.live.remove(h) {
                self.errors.push(format!("delete of unknown object {h}"));
            }
        }
    }

    #[inline(always)]
    const fn slot(target: BufferTarget) -> usize {
        match target {
            BufferTarget::Vertex => 0,
            BufferTarget::Index => 1,
        }
    }
}

fn scan_uniforms(source: &str, names: &mut Vec<String>) {
    for line in source.lines() {
        let Some(rest) = line.trim_start().strip_prefix("uniform ") else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        let _ty = parts.next();
        let Some(token) = parts.next() else {
            continue;
        };
        let name = token.split([';', '[', '=']).next().unwrap_or_default();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_owned());
        }
    }
}

impl Driver for HeadlessDriver {
    fn info(&self) -> DriverInfo {
        DriverInfo {
            vendor: "cgdf".to_owned(),
            renderer: "headless".to_owned(),
            version: "3.3 (recorded)".to_owned(),
            shading_language: "3.30".to_owned(),
            max_texture_size: 16384,
        }
    }

    fn max_texture_units(&self) -> usize {
        self.max_texture_units
    }

    fn create_buffer(&mut self) -> Result<Handle, String> {
        let h = self.alloc();
        self.buffer_sizes.insert(h, 0);
        self.calls.push(Call::CreateBuffer(h));
        Ok(h)
    }

    fn delete_buffers(&mut self, buffers: &[Handle]) {
        self.release(buffers);
        for h in buffers {
            self.buffer_sizes.remove(h);
            for bound in &mut self.bound_buffers {
                if bound == h {
                    *bound = 0;
                }
            }
        }
        self.calls.push(Call::DeleteBuffers(buffers.to_vec()));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Handle) {
        if buffer != 0 && !self.live.contains(&buffer) {
            self.errors.push(format!("bind of unknown buffer {buffer}"));
        }
        self.bound_buffers[Self::slot(target)] = buffer;
        self.calls.push(Call::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.buffer_data_size(target, data.len(), usage);
    }

    fn buffer_data_size(&mut self, target: BufferTarget, size: usize, _usage: BufferUsage) {
        let bound = self.bound_buffers[Self::slot(target)];
        if bound == 0 {
            self.errors.push("buffer_data with no buffer bound".to_owned());
        } else {
            self.buffer_sizes.insert(bound, size);
        }
        self.calls.push(Call::BufferData { target, len: size });
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        let bound = self.bound_buffers[Self::slot(target)];
        let size = self.buffer_sizes.get(&bound).copied().unwrap_or(0);
        if bound == 0 || offset + data.len() > size {
            self.errors.push(format!(
                "buffer_sub_data {}..{} outside buffer {bound} of {size} bytes",
                offset,
                offset + data.len()
            ));
        }
        self.calls.push(Call::BufferSubData { target, offset, len: data.len() });
    }

    fn create_vertex_array(&mut self) -> Result<Handle, String> {
        let h = self.alloc();
        self.calls.push(Call::CreateVertexArray(h));
        Ok(h)
    }

    fn delete_vertex_arrays(&mut self, arrays: &[Handle]) {
        self.release(arrays);
        self.calls.push(Call::DeleteVertexArrays(arrays.to_vec()));
    }

    fn bind_vertex_array(&mut self, array: Handle) {
        self.calls.push(Call::BindVertexArray(array));
    }

    fn vertex_attrib_pointer(&mut self, index: u32, components: i32, stride: usize, offset: usize) {
        self.calls.push(Call::VertexAttribPointer { index, components, stride, offset });
    }

    fn create_texture(&mut self) -> Result<Handle, String> {
        let h = self.alloc();
        self.calls.push(Call::CreateTexture(h));
        Ok(h)
    }

    fn delete_textures(&mut self, textures: &[Handle]) {
        self.release(textures);
        // Deleting a bound texture reverts that unit to 0.
        self.bound_textures.retain(|_, (_, t)| !textures.contains(t));
        self.calls.push(Call::DeleteTextures(textures.to_vec()));
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = unit;
        self.calls.push(Call::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, kind: TextureKind, texture: Handle) {
        if texture == 0 {
            self.bound_textures.remove(&self.active_unit);
        } else {
            self.bound_textures.insert(self.active_unit, (kind, texture));
        }
        self.calls.push(Call::BindTexture(kind, texture));
    }

    fn tex_image(&mut self, kind: TextureKind, image: &TextureImage<'_>) {
        match self.bound_textures.get(&self.active_unit) {
            Some((k, _)) if *k == kind => {}
            _ => self.errors.push("tex_image with no texture bound".to_owned()),
        }
        if let Some(data) = image.data {
            let expected = image.width as usize * image.height as usize * image.depth as usize * 4;
            if data.len() < expected {
                self.errors.push(format!(
                    "tex_image expected {expected} bytes, got {}",
                    data.len()
                ));
            }
        }
        self.calls.push(Call::TexImage {
            kind,
            width: image.width,
            height: image.height,
            depth: image.depth,
        });
    }

    fn tex_sampler(&mut self, kind: TextureKind, sampler: SamplerDesc) {
        self.calls.push(Call::TexSampler(kind, sampler));
    }

    fn generate_mipmap(&mut self, kind: TextureKind) {
        self.calls.push(Call::GenerateMipmap(kind));
    }

    fn create_framebuffer(&mut self) -> Result<Handle, String> {
        let h = self.alloc();
        self.calls.push(Call::CreateFramebuffer(h));
        Ok(h)
    }

    fn delete_framebuffers(&mut self, framebuffers: &[Handle]) {
        self.release(framebuffers);
        if framebuffers.contains(&self.framebuffer) {
            self.framebuffer = 0;
        }
        self.calls.push(Call::DeleteFramebuffers(framebuffers.to_vec()));
    }

    fn bind_framebuffer(&mut self, framebuffer: Handle) {
        if framebuffer != 0 && !self.live.contains(&framebuffer) {
            self.errors.push(format!("bind of unknown framebuffer {framebuffer}"));
        }
        self.framebuffer = framebuffer;
        self.calls.push(Call::BindFramebuffer(framebuffer));
    }

    fn framebuffer_color_texture(&mut self, attachment: u32, texture: Handle) {
        self.calls.push(Call::FramebufferColorTexture { attachment, texture });
    }

    fn framebuffer_complete(&mut self) -> bool {
        true
    }

    fn draw_buffers(&mut self, attachments: &[u32]) {
        if self.framebuffer == 0 {
            self.errors.push("draw_buffers on the default framebuffer".to_owned());
        }
        self.calls.push(Call::DrawBuffers(attachments.to_vec()));
    }

    fn create_renderbuffer(&mut self) -> Result<Handle, String> {
        let h = self.alloc();
        self.calls.push(Call::CreateRenderbuffer(h));
        Ok(h)
    }

    fn delete_renderbuffers(&mut self, renderbuffers: &[Handle]) {
        self.release(renderbuffers);
        self.calls.push(Call::DeleteRenderbuffers(renderbuffers.to_vec()));
    }

    fn attach_depth_renderbuffer(&mut self, renderbuffer: Handle, width: u32, height: u32) {
        self.calls.push(Call::AttachDepthRenderbuffer { renderbuffer, width, height });
    }

    fn create_query(&mut self) -> Result<Handle, String> {
        let h = self.alloc();
        self.calls.push(Call::CreateQuery(h));
        Ok(h)
    }

    fn delete_queries(&mut self, queries: &[Handle]) {
        self.release(queries);
        self.calls.push(Call::DeleteQueries(queries.to_vec()));
    }

    fn begin_primitives_query(&mut self, query: Handle) {
        self.calls.push(Call::BeginQuery(query));
    }

    fn end_primitives_query(&mut self) {
        self.calls.push(Call::EndQuery);
    }

    fn query_result(&mut self, query: Handle) -> u32 {
        // Count triangles submitted between the last begin/end pair.
        let start = self
            .calls
            .iter()
            .rposition(|c| *c == Call::BeginQuery(query))
            .unwrap_or(self.calls.len());
        self.calls[start..]
            .iter()
            .map(|c| match c {
                Call::DrawElements { primitive: Primitive::Triangles, count, .. }
                | Call::DrawArrays { primitive: Primitive::Triangles, count, .. } => {
                    (*count / 3) as u32
                }
                _ => 0,
            })
            .sum()
    }

    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<Handle, String> {
        let sources = [Some(source.vertex), Some(source.fragment), source.geometry];
        if let Some(bad) = sources.iter().flatten().find(|s| s.contains("#error")) {
            let line = bad.lines().find(|l| l.contains("#error")).unwrap_or_default();
            return Err(format!("0:1: error: {}", line.trim()));
        }
        let mut names = Vec::new();
        for s in sources.iter().flatten() {
            scan_uniforms(s, &mut names);
        }
        let h = self.alloc();
        let uniforms = names
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n, i as Location))
            .collect();
        self.programs.insert(h, uniforms);
        trace!("headless: program {h} linked");
        self.calls.push(Call::CreateProgram(h));
        Ok(h)
    }

    fn delete_program(&mut self, program: Handle) {
        self.release(&[program]);
        self.programs.remove(&program);
        if self.current_program == program {
            self.current_program = 0;
        }
        self.calls.push(Call::DeleteProgram(program));
    }

    fn use_program(&mut self, program: Handle) {
        if program != 0 && !self.programs.contains_key(&program) {
            self.errors.push(format!("use of unknown program {program}"));
        }
        self.current_program = program;
        self.calls.push(Call::UseProgram(program));
    }

    fn uniform_location(&mut self, program: Handle, name: &str) -> Option<Location> {
        self.calls.push(Call::UniformLocation(program, name.to_owned()));
        self.programs.get(&program)?.get(name).copied()
    }

    fn uniform_1_i32(&mut self, location: Location, value: i32) {
        self.calls.push(Call::Uniform1i(location, value));
    }

    fn uniform_1_f32(&mut self, location: Location, value: f32) {
        self.calls.push(Call::Uniform1f(location, value));
    }

    fn uniform_2_f32(&mut self, location: Location, value: [f32; 2]) {
        self.calls.push(Call::Uniform2f(location, value));
    }

    fn uniform_3_f32(&mut self, location: Location, value: [f32; 3]) {
        self.calls.push(Call::Uniform3f(location, value));
    }

    fn uniform_4_f32(&mut self, location: Location, value: [f32; 4]) {
        self.calls.push(Call::Uniform4f(location, value));
    }

    fn uniform_1_f32_slice(&mut self, location: Location, values: &[f32]) {
        self.calls.push(Call::UniformFloatArray(location, values.len()));
    }

    fn uniform_4_f32_slice(&mut self, location: Location, values: &[f32]) {
        self.calls.push(Call::UniformVec4Array(location, values.len() / 4));
    }

    fn uniform_matrix_2_f32(&mut self, location: Location, _values: &[f32; 4]) {
        self.calls.push(Call::UniformMatrix(location, 2));
    }

    fn uniform_matrix_3_f32(&mut self, location: Location, _values: &[f32; 9]) {
        self.calls.push(Call::UniformMatrix(location, 3));
    }

    fn uniform_matrix_4_f32(&mut self, location: Location, _values: &[f32; 16]) {
        self.calls.push(Call::UniformMatrix(location, 4));
    }

    fn draw_elements(&mut self, primitive: Primitive, count: usize, first: usize) {
        if self.current_program == 0 {
            self.errors.push("draw_elements with no program".to_owned());
        }
        let index_bytes = self.buffer_sizes.get(&self.bound_buffers[1]).copied().unwrap_or(0);
        if (first + count) * 4 > index_bytes {
            self.errors.push(format!(
                "draw_elements reads {} indices past a {index_bytes} byte index buffer",
                first + count
            ));
        }
        self.calls.push(Call::DrawElements { primitive, count, first });
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: usize, count: usize) {
        if self.current_program == 0 {
            self.errors.push("draw_arrays with no program".to_owned());
        }
        self.calls.push(Call::DrawArrays { primitive, first, count });
    }

    fn line_width(&mut self, width: f32) {
        self.calls.push(Call::LineWidth(width));
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.calls.push(Call::Viewport(x, y, width, height));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.calls.push(Call::Clear(color));
    }

    fn blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
        self.calls.push(Call::Blend(mode));
    }

    fn init_state(&mut self) {
        self.blend = BlendMode::Alpha;
        self.calls.push(Call::InitState);
    }

    fn memory_info(&mut self) -> Option<MemoryInfo> {
        Some(MemoryInfo { total_kb: HEADLESS_MEMORY_KB, free_kb: HEADLESS_MEMORY_KB })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERT: &str = "#version 330 core\nuniform mat4 u_proj;\nuniform float u_weights[4];\nvoid main() {}\n";
    const FRAG: &str = "#version 330 core\nuniform sampler2D u_texture;\nuniform mat4 u_proj;\nvoid main() {}\n";

    #[test]
    fn uniforms_are_scanned_once_per_name() {
        let mut d = HeadlessDriver::default();
        let p = d
            .create_program(&ProgramSource { vertex: VERT, fragment: FRAG, geometry: None })
            .unwrap();
        assert_eq!(d.uniform_location(p, "u_proj"), Some(0));
        assert_eq!(d.uniform_location(p, "u_weights"), Some(1));
        assert_eq!(d.uniform_location(p, "u_texture"), Some(2));
        assert_eq!(d.uniform_location(p, "u_missing"), None);
    }

    #[test]
    fn error_directive_fails_the_link() {
        let mut d = HeadlessDriver::default();
        let err = d
            .create_program(&ProgramSource {
                vertex: VERT,
                fragment: "#error broken\n",
                geometry: None,
            })
            .unwrap_err();
        assert!(err.contains("broken"));
        assert_eq!(d.live_count(), 0);
    }

    #[test]
    fn out_of_range_sub_data_is_flagged() {
        let mut d = HeadlessDriver::default();
        let b = d.create_buffer().unwrap();
        d.bind_buffer(BufferTarget::Vertex, b);
        d.buffer_data_size(BufferTarget::Vertex, 8, BufferUsage::Dynamic);
        d.buffer_sub_data(BufferTarget::Vertex, 4, &[0; 4]);
        assert!(d.take_errors().is_empty());
        d.buffer_sub_data(BufferTarget::Vertex, 4, &[0; 8]);
        assert_eq!(d.take_errors().len(), 1);
    }

    #[test]
    fn deleting_a_bound_texture_unbinds_it() {
        let mut d = HeadlessDriver::default();
        let t = d.create_texture().unwrap();
        d.active_texture(3);
        d.bind_texture(TextureKind::Texture2D, t);
        assert_eq!(d.bound_texture(3), Some((TextureKind::Texture2D, t)));
        d.delete_textures(&[t]);
        assert_eq!(d.bound_texture(3), None);
        assert!(!d.is_live(t));
    }
}
