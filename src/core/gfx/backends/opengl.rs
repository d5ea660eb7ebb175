use crate::core::gfx::driver::{
    BlendMode, BufferTarget, BufferUsage, Driver, DriverInfo, Handle, Location, MemoryInfo,
    Primitive, ProgramSource, TextureImage, TextureKind,
};
use crate::core::gfx::{SamplerDesc, SamplerFilter, SamplerWrap};
use glow::{HasContext, PixelUnpackData};
use glutin::{
    config::ConfigTemplateBuilder,
    context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version},
    display::{Display, DisplayApiPreference},
    prelude::*,
    surface::{Surface, SurfaceAttributesBuilder, WindowSurface},
};
use log::{debug, error, info, warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::{error::Error, ffi::CStr, num::NonZeroU32};
use winit::window::Window;

/// The window's GL surface and the context current on it.
pub struct GlWindowSurface {
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
}

impl GlWindowSurface {
    pub fn resize(&self, width: u32, height: u32) {
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            warn!("Ignoring resize to zero dimensions.");
            return;
        };
        self.surface.resize(&self.context, w, h);
    }

    pub fn present(&self) -> Result<(), Box<dyn Error>> {
        self.surface.swap_buffers(&self.context)?;
        Ok(())
    }
}

/// `Driver` over a live `glow` context.
pub struct GlDriver {
    gl: glow::Context,
    info: DriverInfo,
    max_texture_units: usize,
}

pub fn init(
    window: &Window,
    vsync_enabled: bool,
    gfx_debug_enabled: bool,
) -> Result<(GlWindowSurface, GlDriver), Box<dyn Error>> {
    info!("Initializing OpenGL backend...");
    if gfx_debug_enabled {
        info!("OpenGL debug context requested.");
    }
    let (surface, context, mut gl) =
        create_opengl_context(window, vsync_enabled, gfx_debug_enabled)?;
    if gfx_debug_enabled {
        enable_debug_output(&mut gl, DebugSeverity::Medium);
    }
    let driver = GlDriver::new(gl);
    info!("OpenGL backend initialized successfully.");
    Ok((GlWindowSurface { surface, context }, driver))
}

impl GlDriver {
    pub fn new(gl: glow::Context) -> Self {
        let (info, units) = unsafe {
            let info = DriverInfo {
                vendor: gl.get_parameter_string(glow::VENDOR),
                renderer: gl.get_parameter_string(glow::RENDERER),
                version: gl.get_parameter_string(glow::VERSION),
                shading_language: gl.get_parameter_string(glow::SHADING_LANGUAGE_VERSION),
                max_texture_size: gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE).max(0) as u32,
            };
            (info, gl.get_parameter_i32(glow::MAX_TEXTURE_IMAGE_UNITS).max(0) as usize)
        };
        Self { gl, info, max_texture_units: units }
    }
}

/// Lowest severity the debug callback is told about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugSeverity {
    Notification,
    Low,
    Medium,
    High,
}

impl DebugSeverity {
    const ALL: [(Self, u32); 4] = [
        (Self::Notification, glow::DEBUG_SEVERITY_NOTIFICATION),
        (Self::Low, glow::DEBUG_SEVERITY_LOW),
        (Self::Medium, glow::DEBUG_SEVERITY_MEDIUM),
        (Self::High, glow::DEBUG_SEVERITY_HIGH),
    ];
}

/// Routes driver debug messages into the log. Needs GL 4.3 or
/// `GL_KHR_debug`; without either it only says so.
pub fn enable_debug_output(gl: &mut glow::Context, min_severity: DebugSeverity) {
    let version = gl.version();
    let supported = (version.major, version.minor) >= (4, 3)
        || gl.supported_extensions().contains("GL_KHR_debug");
    if !supported {
        warn!("GL debug output unavailable (needs 4.3 or GL_KHR_debug).");
        return;
    }
    unsafe {
        gl.enable(glow::DEBUG_OUTPUT);
        gl.enable(glow::DEBUG_OUTPUT_SYNCHRONOUS);
        gl.debug_message_callback(|_source, kind, id, severity, message| {
            let kind = match kind {
                glow::DEBUG_TYPE_ERROR => "ERROR",
                glow::DEBUG_TYPE_DEPRECATED_BEHAVIOR => "DEPRECATED",
                glow::DEBUG_TYPE_UNDEFINED_BEHAVIOR => "UNDEFINED",
                glow::DEBUG_TYPE_PORTABILITY => "PORTABILITY",
                glow::DEBUG_TYPE_PERFORMANCE => "PERFORMANCE",
                glow::DEBUG_TYPE_MARKER => "MARKER",
                _ => "OTHER",
            };
            match severity {
                glow::DEBUG_SEVERITY_HIGH => error!("GL [{kind}<{id}>] {message}"),
                glow::DEBUG_SEVERITY_MEDIUM => warn!("GL [{kind}<{id}>] {message}"),
                glow::DEBUG_SEVERITY_LOW => info!("GL [{kind}<{id}>] {message}"),
                _ => debug!("GL [{kind}<{id}>] {message}"),
            }
        });
        gl.debug_message_control(glow::DONT_CARE, glow::DONT_CARE, glow::DONT_CARE, &[], false);
        for (level, severity) in DebugSeverity::ALL {
            if level >= min_severity {
                gl.debug_message_control(glow::DONT_CARE, glow::DONT_CARE, severity, &[], true);
            }
        }
    }
    info!("GL debug output enabled ({min_severity:?} and above).");
}

// NVX_gpu_memory_info / ATI_meminfo enums.
const GPU_MEMORY_INFO_TOTAL_AVAILABLE_MEMORY_NVX: u32 = 0x9048;
const GPU_MEMORY_INFO_CURRENT_AVAILABLE_VIDMEM_NVX: u32 = 0x9049;
const VBO_FREE_MEMORY_ATI: u32 = 0x87FB;

#[inline(always)]
const fn target(t: BufferTarget) -> u32 {
    match t {
        BufferTarget::Vertex => glow::ARRAY_BUFFER,
        BufferTarget::Index => glow::ELEMENT_ARRAY_BUFFER,
    }
}

#[inline(always)]
const fn usage(u: BufferUsage) -> u32 {
    match u {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
        BufferUsage::Stream => glow::STREAM_DRAW,
    }
}

#[inline(always)]
const fn texture_target(k: TextureKind) -> u32 {
    match k {
        TextureKind::Texture2D => glow::TEXTURE_2D,
        TextureKind::Texture3D => glow::TEXTURE_3D,
    }
}

#[inline(always)]
const fn mode(p: Primitive) -> u32 {
    match p {
        Primitive::Points => glow::POINTS,
        Primitive::Lines => glow::LINES,
        Primitive::LineStrip => glow::LINE_STRIP,
        Primitive::LineLoop => glow::LINE_LOOP,
        Primitive::Triangles => glow::TRIANGLES,
        Primitive::TriangleStrip => glow::TRIANGLE_STRIP,
        Primitive::TriangleFan => glow::TRIANGLE_FAN,
    }
}

#[inline(always)]
fn location(l: Location) -> Option<glow::UniformLocation> {
    (l >= 0).then_some(glow::NativeUniformLocation(l as u32))
}

macro_rules! object {
    ($name:ident, $ty:ident) => {
        #[inline(always)]
        fn $name(h: Handle) -> Option<glow::$ty> {
            NonZeroU32::new(h).map(glow::$ty)
        }
    };
}

object!(buffer, NativeBuffer);
object!(vertex_array, NativeVertexArray);
object!(texture, NativeTexture);
object!(framebuffer, NativeFramebuffer);
object!(renderbuffer, NativeRenderbuffer);
object!(query, NativeQuery);
object!(program, NativeProgram);

impl Driver for GlDriver {
    fn info(&self) -> DriverInfo {
        self.info.clone()
    }

    fn max_texture_units(&self) -> usize {
        self.max_texture_units
    }

    fn create_buffer(&mut self) -> Result<Handle, String> {
        unsafe { self.gl.create_buffer().map(|b| b.0.get()) }
    }

    fn delete_buffers(&mut self, buffers: &[Handle]) {
        for b in buffers.iter().filter_map(|h| buffer(*h)) {
            unsafe { self.gl.delete_buffer(b) };
        }
    }

    fn bind_buffer(&mut self, t: BufferTarget, b: Handle) {
        unsafe { self.gl.bind_buffer(target(t), buffer(b)) };
    }

    fn buffer_data(&mut self, t: BufferTarget, data: &[u8], u: BufferUsage) {
        unsafe { self.gl.buffer_data_u8_slice(target(t), data, usage(u)) };
    }

    fn buffer_data_size(&mut self, t: BufferTarget, size: usize, u: BufferUsage) {
        unsafe { self.gl.buffer_data_size(target(t), size as i32, usage(u)) };
    }

    fn buffer_sub_data(&mut self, t: BufferTarget, offset: usize, data: &[u8]) {
        unsafe { self.gl.buffer_sub_data_u8_slice(target(t), offset as i32, data) };
    }

    fn create_vertex_array(&mut self) -> Result<Handle, String> {
        unsafe { self.gl.create_vertex_array().map(|v| v.0.get()) }
    }

    fn delete_vertex_arrays(&mut self, arrays: &[Handle]) {
        for v in arrays.iter().filter_map(|h| vertex_array(*h)) {
            unsafe { self.gl.delete_vertex_array(v) };
        }
    }

    fn bind_vertex_array(&mut self, array: Handle) {
        unsafe { self.gl.bind_vertex_array(vertex_array(array)) };
    }

    fn vertex_attrib_pointer(&mut self, index: u32, components: i32, stride: usize, offset: usize) {
        unsafe {
            self.gl.enable_vertex_attrib_array(index);
            self.gl.vertex_attrib_pointer_f32(
                index,
                components,
                glow::FLOAT,
                false,
                stride as i32,
                offset as i32,
            );
        }
    }

    fn create_texture(&mut self) -> Result<Handle, String> {
        unsafe { self.gl.create_texture().map(|t| t.0.get()) }
    }

    fn delete_textures(&mut self, textures: &[Handle]) {
        for t in textures.iter().filter_map(|h| texture(*h)) {
            unsafe { self.gl.delete_texture(t) };
        }
    }

    fn active_texture(&mut self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) };
    }

    fn bind_texture(&mut self, kind: TextureKind, t: Handle) {
        unsafe { self.gl.bind_texture(texture_target(kind), texture(t)) };
    }

    fn tex_image(&mut self, kind: TextureKind, image: &TextureImage<'_>) {
        let pixels = PixelUnpackData::Slice(image.data);
        unsafe {
            match kind {
                TextureKind::Texture2D => self.gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    glow::RGBA8 as i32,
                    image.width as i32,
                    image.height as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    pixels,
                ),
                TextureKind::Texture3D => self.gl.tex_image_3d(
                    glow::TEXTURE_3D,
                    0,
                    glow::RGBA8 as i32,
                    image.width as i32,
                    image.height as i32,
                    image.depth as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    pixels,
                ),
            }
        }
    }

    fn tex_sampler(&mut self, kind: TextureKind, sampler: SamplerDesc) {
        let t = texture_target(kind);
        let wrap_mode = match sampler.wrap {
            SamplerWrap::Clamp => glow::CLAMP_TO_EDGE,
            SamplerWrap::Repeat => glow::REPEAT,
        };
        let (min_filter, mag_filter) = match (sampler.filter, sampler.mipmaps) {
            (SamplerFilter::Linear, false) => (glow::LINEAR, glow::LINEAR),
            (SamplerFilter::Linear, true) => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
            (SamplerFilter::Nearest, false) => (glow::NEAREST, glow::NEAREST),
            (SamplerFilter::Nearest, true) => (glow::NEAREST_MIPMAP_NEAREST, glow::NEAREST),
        };
        unsafe {
            self.gl.tex_parameter_i32(t, glow::TEXTURE_WRAP_S, wrap_mode as i32);
            self.gl.tex_parameter_i32(t, glow::TEXTURE_WRAP_T, wrap_mode as i32);
            if kind == TextureKind::Texture3D {
                self.gl.tex_parameter_i32(t, glow::TEXTURE_WRAP_R, wrap_mode as i32);
            }
            self.gl.tex_parameter_i32(t, glow::TEXTURE_MIN_FILTER, min_filter as i32);
            self.gl.tex_parameter_i32(t, glow::TEXTURE_MAG_FILTER, mag_filter as i32);
            self.gl.tex_parameter_i32(t, glow::TEXTURE_BASE_LEVEL, 0);
            if !sampler.mipmaps {
                self.gl.tex_parameter_i32(t, glow::TEXTURE_MAX_LEVEL, 0);
            }
        }
    }

    fn generate_mipmap(&mut self, kind: TextureKind) {
        unsafe { self.gl.generate_mipmap(texture_target(kind)) };
    }

    fn create_framebuffer(&mut self) -> Result<Handle, String> {
        unsafe { self.gl.create_framebuffer().map(|f| f.0.get()) }
    }

    fn delete_framebuffers(&mut self, framebuffers: &[Handle]) {
        for f in framebuffers.iter().filter_map(|h| framebuffer(*h)) {
            unsafe { self.gl.delete_framebuffer(f) };
        }
    }

    fn bind_framebuffer(&mut self, f: Handle) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer(f)) };
    }

    fn framebuffer_color_texture(&mut self, attachment: u32, t: Handle) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0 + attachment,
                glow::TEXTURE_2D,
                texture(t),
                0,
            );
        }
    }

    fn framebuffer_complete(&mut self) -> bool {
        unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE }
    }

    fn draw_buffers(&mut self, attachments: &[u32]) {
        unsafe {
            if attachments.is_empty() {
                self.gl.draw_buffer(glow::NONE);
            } else {
                let buffers: Vec<u32> =
                    attachments.iter().map(|a| glow::COLOR_ATTACHMENT0 + a).collect();
                self.gl.draw_buffers(&buffers);
            }
        }
    }

    fn create_renderbuffer(&mut self) -> Result<Handle, String> {
        unsafe { self.gl.create_renderbuffer().map(|r| r.0.get()) }
    }

    fn delete_renderbuffers(&mut self, renderbuffers: &[Handle]) {
        for r in renderbuffers.iter().filter_map(|h| renderbuffer(*h)) {
            unsafe { self.gl.delete_renderbuffer(r) };
        }
    }

    fn attach_depth_renderbuffer(&mut self, r: Handle, width: u32, height: u32) {
        let rb = renderbuffer(r);
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, rb);
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::DEPTH24_STENCIL8,
                width as i32,
                height as i32,
            );
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_STENCIL_ATTACHMENT,
                glow::RENDERBUFFER,
                rb,
            );
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
    }

    fn create_query(&mut self) -> Result<Handle, String> {
        unsafe { self.gl.create_query().map(|q| q.0.get()) }
    }

    fn delete_queries(&mut self, queries: &[Handle]) {
        for q in queries.iter().filter_map(|h| query(*h)) {
            unsafe { self.gl.delete_query(q) };
        }
    }

    fn begin_primitives_query(&mut self, q: Handle) {
        if let Some(q) = query(q) {
            unsafe { self.gl.begin_query(glow::PRIMITIVES_GENERATED, q) };
        }
    }

    fn end_primitives_query(&mut self) {
        unsafe { self.gl.end_query(glow::PRIMITIVES_GENERATED) };
    }

    fn query_result(&mut self, q: Handle) -> u32 {
        query(q).map_or(0, |q| unsafe { self.gl.get_query_parameter_u32(q, glow::QUERY_RESULT) })
    }

    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<Handle, String> {
        let gl = &self.gl;
        unsafe {
            let program = gl.create_program()?;
            let compile = |ty, src: &str| -> Result<glow::Shader, String> {
                let sh = gl.create_shader(ty)?;
                gl.shader_source(sh, src);
                gl.compile_shader(sh);
                if !gl.get_shader_compile_status(sh) {
                    let log = gl.get_shader_info_log(sh);
                    gl.delete_shader(sh);
                    return Err(log);
                }
                Ok(sh)
            };

            let stages = [
                (glow::VERTEX_SHADER, Some(source.vertex)),
                (glow::FRAGMENT_SHADER, Some(source.fragment)),
                (glow::GEOMETRY_SHADER, source.geometry),
            ];
            let mut shaders = Vec::with_capacity(stages.len());
            for (ty, src) in stages {
                let Some(src) = src else { continue };
                match compile(ty, src) {
                    Ok(sh) => shaders.push(sh),
                    Err(log) => {
                        for sh in shaders {
                            gl.delete_shader(sh);
                        }
                        gl.delete_program(program);
                        return Err(log);
                    }
                }
            }

            for &sh in &shaders {
                gl.attach_shader(program, sh);
            }
            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            let log = if linked { String::new() } else { gl.get_program_info_log(program) };
            for sh in shaders {
                gl.detach_shader(program, sh);
                gl.delete_shader(sh);
            }
            if !linked {
                gl.delete_program(program);
                return Err(log);
            }
            Ok(program.0.get())
        }
    }

    fn delete_program(&mut self, p: Handle) {
        if let Some(p) = program(p) {
            unsafe { self.gl.delete_program(p) };
        }
    }

    fn use_program(&mut self, p: Handle) {
        unsafe { self.gl.use_program(program(p)) };
    }

    fn uniform_location(&mut self, p: Handle, name: &str) -> Option<Location> {
        let p = program(p)?;
        unsafe { self.gl.get_uniform_location(p, name) }.map(|l| l.0 as Location)
    }

    fn uniform_1_i32(&mut self, l: Location, value: i32) {
        unsafe { self.gl.uniform_1_i32(location(l).as_ref(), value) };
    }

    fn uniform_1_f32(&mut self, l: Location, value: f32) {
        unsafe { self.gl.uniform_1_f32(location(l).as_ref(), value) };
    }

    fn uniform_2_f32(&mut self, l: Location, [x, y]: [f32; 2]) {
        unsafe { self.gl.uniform_2_f32(location(l).as_ref(), x, y) };
    }

    fn uniform_3_f32(&mut self, l: Location, [x, y, z]: [f32; 3]) {
        unsafe { self.gl.uniform_3_f32(location(l).as_ref(), x, y, z) };
    }

    fn uniform_4_f32(&mut self, l: Location, [x, y, z, w]: [f32; 4]) {
        unsafe { self.gl.uniform_4_f32(location(l).as_ref(), x, y, z, w) };
    }

    fn uniform_1_f32_slice(&mut self, l: Location, values: &[f32]) {
        unsafe { self.gl.uniform_1_f32_slice(location(l).as_ref(), values) };
    }

    fn uniform_4_f32_slice(&mut self, l: Location, values: &[f32]) {
        unsafe { self.gl.uniform_4_f32_slice(location(l).as_ref(), values) };
    }

    fn uniform_matrix_2_f32(&mut self, l: Location, values: &[f32; 4]) {
        unsafe { self.gl.uniform_matrix_2_f32_slice(location(l).as_ref(), false, values) };
    }

    fn uniform_matrix_3_f32(&mut self, l: Location, values: &[f32; 9]) {
        unsafe { self.gl.uniform_matrix_3_f32_slice(location(l).as_ref(), false, values) };
    }

    fn uniform_matrix_4_f32(&mut self, l: Location, values: &[f32; 16]) {
        unsafe { self.gl.uniform_matrix_4_f32_slice(location(l).as_ref(), false, values) };
    }

    fn draw_elements(&mut self, p: Primitive, count: usize, first: usize) {
        let offset = (first * std::mem::size_of::<u32>()) as i32;
        unsafe { self.gl.draw_elements(mode(p), count as i32, glow::UNSIGNED_INT, offset) };
    }

    fn draw_arrays(&mut self, p: Primitive, first: usize, count: usize) {
        unsafe { self.gl.draw_arrays(mode(p), first as i32, count as i32) };
    }

    fn line_width(&mut self, width: f32) {
        unsafe { self.gl.line_width(width) };
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        unsafe { self.gl.viewport(x, y, width as i32, height as i32) };
    }

    fn clear(&mut self, [r, g, b, a]: [f32; 4]) {
        unsafe {
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT);
        }
    }

    fn blend_mode(&mut self, mode: BlendMode) {
        let dst = match mode {
            BlendMode::Alpha => glow::ONE_MINUS_SRC_ALPHA,
            BlendMode::Additive => glow::ONE,
        };
        unsafe {
            self.gl.blend_func_separate(glow::SRC_ALPHA, dst, glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
        }
    }

    fn init_state(&mut self) {
        unsafe {
            self.gl.enable(glow::BLEND);
            self.gl.blend_equation(glow::FUNC_ADD);
            self.gl.blend_func_separate(
                glow::SRC_ALPHA,
                glow::ONE_MINUS_SRC_ALPHA,
                glow::ONE,
                glow::ONE_MINUS_SRC_ALPHA,
            );
            self.gl.enable(glow::PROGRAM_POINT_SIZE);
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        }
    }

    fn memory_info(&mut self) -> Option<MemoryInfo> {
        let extensions = self.gl.supported_extensions();
        if extensions.contains("GL_NVX_gpu_memory_info") {
            let (total, free) = unsafe {
                (
                    self.gl.get_parameter_i32(GPU_MEMORY_INFO_TOTAL_AVAILABLE_MEMORY_NVX),
                    self.gl.get_parameter_i32(GPU_MEMORY_INFO_CURRENT_AVAILABLE_VIDMEM_NVX),
                )
            };
            return Some(MemoryInfo { total_kb: total.max(0) as u32, free_kb: free.max(0) as u32 });
        }
        if extensions.contains("GL_ATI_meminfo") {
            // [free, largest free block, free auxiliary, largest auxiliary block].
            // No total is reported.
            let mut info = [0i32; 4];
            unsafe { self.gl.get_parameter_i32_slice(VBO_FREE_MEMORY_ATI, &mut info) };
            return Some(MemoryInfo { total_kb: 0, free_kb: info[0].max(0) as u32 });
        }
        None
    }
}

fn create_opengl_context(
    window: &Window,
    vsync_enabled: bool,
    gfx_debug_enabled: bool,
) -> Result<(Surface<WindowSurface>, PossiblyCurrentContext, glow::Context), Box<dyn Error>> {
    let display_handle = window.display_handle()?.as_raw();

    #[cfg(target_os = "windows")]
    let preference = {
        info!("Using WGL for OpenGL context.");
        DisplayApiPreference::Wgl(None)
    };
    #[cfg(target_os = "macos")]
    let preference = {
        info!("Using CGL for OpenGL context.");
        DisplayApiPreference::Cgl
    };
    #[cfg(all(unix, not(target_os = "macos")))]
    let preference = {
        info!("Using EGL for OpenGL context.");
        DisplayApiPreference::Egl
    };

    let display = unsafe { Display::new(display_handle, preference)? };

    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(0)
        .with_depth_size(24)
        .with_stencil_size(8)
        .with_transparency(false)
        .build();
    let config = unsafe { display.find_configs(template)?.next() }
        .ok_or("Failed to find a suitable GL config")?;

    let (width, height): (u32, u32) = window.inner_size().into();
    let (Some(width), Some(height)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
        return Err("Cannot create a GL surface for a zero-sized window".into());
    };
    let raw_window_handle = window.window_handle()?.as_raw();
    let surface_attributes =
        SurfaceAttributesBuilder::<WindowSurface>::new().build(raw_window_handle, width, height);
    let surface = unsafe { display.create_window_surface(&config, &surface_attributes)? };

    let context_attributes = ContextAttributesBuilder::new()
        .with_debug(gfx_debug_enabled)
        .with_profile(GlProfile::Core)
        .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
        .build(Some(raw_window_handle));
    let context =
        unsafe { display.create_context(&config, &context_attributes)? }.make_current(&surface)?;

    set_vsync(&display, &surface, &context, vsync_enabled);

    unsafe {
        let gl = glow::Context::from_loader_function_cstr(|s: &CStr| display.get_proc_address(s));
        Ok((surface, context, gl))
    }
}

#[cfg(target_os = "windows")]
fn set_vsync(
    display: &Display,
    _surface: &Surface<WindowSurface>,
    _context: &PossiblyCurrentContext,
    vsync_enabled: bool,
) {
    info!("Attempting to set VSync via wglSwapIntervalEXT...");
    type SwapIntervalFn = extern "system" fn(i32) -> i32;
    let proc = display.get_proc_address(c"wglSwapIntervalEXT");
    if proc.is_null() {
        warn!("wglSwapIntervalEXT function not found. Cannot control VSync.");
        return;
    }
    let f: SwapIntervalFn = unsafe { std::mem::transmute(proc) };
    if f(i32::from(vsync_enabled)) != 0 {
        info!("Successfully set VSync to: {}", if vsync_enabled { "on" } else { "off" });
    } else {
        warn!("wglSwapIntervalEXT call failed. VSync state may not be as requested.");
    }
}

#[cfg(not(target_os = "windows"))]
fn set_vsync(
    _display: &Display,
    surface: &Surface<WindowSurface>,
    context: &PossiblyCurrentContext,
    vsync_enabled: bool,
) {
    use glutin::surface::SwapInterval;
    let interval = if vsync_enabled {
        SwapInterval::Wait(NonZeroU32::MIN)
    } else {
        SwapInterval::DontWait
    };
    if let Err(e) = surface.set_swap_interval(context, interval) {
        warn!("Failed to set swap interval (VSync): {e:?}");
    } else {
        info!("Successfully set VSync to: {}", if vsync_enabled { "on" } else { "off" });
    }
}
