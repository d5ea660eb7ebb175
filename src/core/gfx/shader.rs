use crate::core::gfx::Renderer;
use crate::core::gfx::driver::{Driver, Handle, Location, NO_LOCATION, ProgramSource, TextureKind};
use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
use log::{debug, error, trace, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub const DEFAULT_VERTEX_SHADER: &str = include_str!("shaders/default.vert");
pub const DEFAULT_FRAGMENT_SHADER: &str = include_str!("shaders/default.frag");
pub const SPRITE_BATCH_VERTEX_SHADER: &str = include_str!("shaders/sprite_batch.vert");
pub const SPRITE_BATCH_FRAGMENT_SHADER: &str = include_str!("shaders/sprite_batch.frag");
pub const LIGHT2D_VERTEX_SHADER: &str = include_str!("shaders/light2d.vert");
pub const LIGHT2D_FRAGMENT_SHADER: &str = include_str!("shaders/light2d.frag");

/// Two float components closer than this count as equal for the value cache.
pub const UNIFORM_EPSILON: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

#[inline(always)]
fn close<const N: usize>(a: &[f32; N], b: &[f32; N]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= UNIFORM_EPSILON)
}

impl UniformValue {
    #[inline(always)]
    fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    fn approx_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => close(&[*a], &[*b]),
            (Self::Vec2(a), Self::Vec2(b)) => close(a, b),
            (Self::Vec3(a), Self::Vec3(b)) => close(a, b),
            (Self::Vec4(a), Self::Vec4(b)) => close(a, b),
            _ => false,
        }
    }

    fn upload(self, driver: &mut impl Driver, location: Location) {
        match self {
            Self::Bool(v) => driver.uniform_1_i32(location, i32::from(v)),
            Self::Int(v) => driver.uniform_1_i32(location, v),
            Self::Float(v) => driver.uniform_1_f32(location, v),
            Self::Vec2(v) => driver.uniform_2_f32(location, v),
            Self::Vec3(v) => driver.uniform_3_f32(location, v),
            Self::Vec4(v) => driver.uniform_4_f32(location, v),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct CachedValue {
    location: Location,
    value: UniformValue,
}

#[derive(Clone, Copy, Debug)]
struct SamplerBinding {
    location: Location,
    texture: Handle,
    kind: TextureKind,
    unit: usize,
}

/// A linked program plus its per-program caches: uniform name to location,
/// last uploaded scalar/vector value per location, and sampler to
/// (texture, unit) lease.
///
/// All caches are dropped on recompile, on `clear_caches`, and whenever the
/// renderer's cache generation moves (see `Renderer::clear_caches`).
#[derive(Debug)]
pub struct ShaderProgram {
    vertex: String,
    fragment: String,
    geometry: Option<String>,
    id: Handle,
    error: Option<String>,
    active: bool,
    previous: Handle,
    generation: u64,
    locations: FxHashMap<String, Location>,
    values: Vec<CachedValue>,
    samplers: SmallVec<[SamplerBinding; 4]>,
}

impl ShaderProgram {
    /// Holds the sources without touching the driver. Call `compile` next.
    pub fn new(vertex: &str, fragment: &str, geometry: Option<&str>) -> Self {
        Self {
            vertex: vertex.to_owned(),
            fragment: fragment.to_owned(),
            geometry: geometry.map(str::to_owned),
            id: 0,
            error: None,
            active: false,
            previous: 0,
            generation: 0,
            locations: FxHashMap::default(),
            values: Vec::new(),
            samplers: SmallVec::new(),
        }
    }

    /// Swaps the sources. Nothing changes on the driver until `compile`.
    pub fn set_sources(&mut self, vertex: &str, fragment: &str, geometry: Option<&str>) {
        vertex.clone_into(&mut self.vertex);
        fragment.clone_into(&mut self.fragment);
        self.geometry = geometry.map(str::to_owned);
    }

    /// `new` + `compile`. A failed compile is logged and kept in `error()`.
    pub fn create<D: Driver>(
        rnd: &mut Renderer<D>,
        vertex: &str,
        fragment: &str,
        geometry: Option<&str>,
    ) -> Self {
        let mut program = Self::new(vertex, fragment, geometry);
        let _ = program.compile(rnd);
        program
    }

    pub fn default_program<D: Driver>(rnd: &mut Renderer<D>) -> Self {
        Self::create(rnd, DEFAULT_VERTEX_SHADER, DEFAULT_FRAGMENT_SHADER, None)
    }

    pub fn sprite_batch_program<D: Driver>(rnd: &mut Renderer<D>) -> Self {
        Self::create(rnd, SPRITE_BATCH_VERTEX_SHADER, SPRITE_BATCH_FRAGMENT_SHADER, None)
    }

    pub fn light2d_program<D: Driver>(rnd: &mut Renderer<D>) -> Self {
        Self::create(rnd, LIGHT2D_VERTEX_SHADER, LIGHT2D_FRAGMENT_SHADER, None)
    }

    #[inline(always)]
    pub const fn id(&self) -> Handle {
        self.id
    }

    #[inline(always)]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[inline(always)]
    pub const fn is_compiled(&self) -> bool {
        self.id != 0 && self.error.is_none()
    }

    #[inline(always)]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// (Re)builds the program from its sources. Any previous program is
    /// deleted and all caches and unit leases held under its id are dropped.
    pub fn compile<D: Driver>(&mut self, rnd: &mut Renderer<D>) -> Result<(), String> {
        self.end(rnd);
        self.clear_caches(rnd);
        if self.id != 0 {
            if rnd.active_program() == self.id {
                rnd.use_program(0);
            }
            rnd.driver.delete_program(self.id);
            self.id = 0;
        }

        self.error = None;
        if self.vertex.is_empty() || self.fragment.is_empty() {
            let err = "vertex and fragment sources are both required".to_owned();
            error!("Shader compile failed: {err}");
            self.error = Some(err.clone());
            return Err(err);
        }

        let source = ProgramSource {
            vertex: &self.vertex,
            fragment: &self.fragment,
            geometry: self.geometry.as_deref(),
        };
        match rnd.driver.create_program(&source) {
            Ok(id) => {
                debug!("Shader program {id} linked.");
                self.id = id;
                self.generation = rnd.cache_generation();
                Ok(())
            }
            Err(log) => {
                error!("Shader compile failed: {log}");
                self.error = Some(log.clone());
                Err(log)
            }
        }
    }

    /// Makes this program current, remembering the one it replaces.
    pub fn begin<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if !self.is_compiled() {
            warn!(
                "Refusing to bind shader program: {}",
                self.error.as_deref().unwrap_or("not compiled")
            );
            return;
        }
        if self.active {
            return;
        }
        self.sync_generation(rnd);
        self.previous = rnd.active_program();
        if self.previous != self.id {
            rnd.use_program(self.id);
        }
        self.active = true;
    }

    /// Restores whichever program was current before `begin`.
    pub fn end<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        if !self.active {
            return;
        }
        if self.previous != self.id {
            rnd.use_program(self.previous);
        }
        self.previous = 0;
        self.active = false;
    }

    /// Resolves `name`, asking the driver at most once per name per program
    /// generation. Misses are remembered too.
    pub fn location<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str) -> Option<Location> {
        if self.id == 0 {
            return None;
        }
        self.sync_generation(rnd);
        let location = match self.locations.get(name) {
            Some(&loc) => loc,
            None => {
                let loc = rnd.driver.uniform_location(self.id, name).unwrap_or(NO_LOCATION);
                if loc < 0 {
                    debug!("Uniform '{name}' not found in program {}.", self.id);
                }
                self.locations.insert(name.to_owned(), loc);
                loc
            }
        };
        (location >= 0).then_some(location)
    }

    /// Drops all three caches and returns this program's unit leases.
    pub fn clear_caches<D: Driver>(&mut self, rnd: &mut Renderer<D>) {
        self.locations.clear();
        self.values.clear();
        self.samplers.clear();
        rnd.units.release_owner(self.id);
        self.generation = rnd.cache_generation();
    }

    pub fn destroy<D: Driver>(mut self, rnd: &mut Renderer<D>) {
        self.end(rnd);
        self.clear_caches(rnd);
        if self.id != 0 {
            if rnd.active_program() == self.id {
                rnd.use_program(0);
            }
            rnd.driver.delete_program(self.id);
            debug!("Shader program {} deleted.", self.id);
        }
    }

    // --- Cached setters ---

    pub fn set_bool<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: bool) {
        self.set_cached(rnd, name, UniformValue::Bool(value));
    }

    pub fn set_int<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: i32) {
        self.set_cached(rnd, name, UniformValue::Int(value));
    }

    pub fn set_float<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: f32) {
        self.set_cached(rnd, name, UniformValue::Float(value));
    }

    pub fn set_vec2<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: Vec2) {
        self.set_cached(rnd, name, UniformValue::Vec2(value.to_array()));
    }

    pub fn set_vec3<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: Vec3) {
        self.set_cached(rnd, name, UniformValue::Vec3(value.to_array()));
    }

    pub fn set_vec4<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: Vec4) {
        self.set_cached(rnd, name, UniformValue::Vec4(value.to_array()));
    }

    // --- Write-through setters ---

    pub fn set_mat2<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: &Mat2) {
        if let Some(loc) = self.current_location(rnd, name) {
            rnd.driver.uniform_matrix_2_f32(loc, &value.to_cols_array());
        }
    }

    pub fn set_mat3<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: &Mat3) {
        if let Some(loc) = self.current_location(rnd, name) {
            rnd.driver.uniform_matrix_3_f32(loc, &value.to_cols_array());
        }
    }

    pub fn set_mat4<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: &Mat4) {
        if let Some(loc) = self.current_location(rnd, name) {
            rnd.driver.uniform_matrix_4_f32(loc, &value.to_cols_array());
        }
    }

    pub fn set_float_array<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, values: &[f32]) {
        if values.is_empty() {
            return;
        }
        if let Some(loc) = self.current_location(rnd, name) {
            rnd.driver.uniform_1_f32_slice(loc, values);
        }
    }

    pub fn set_vec4_array<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, values: &[Vec4]) {
        if values.is_empty() {
            return;
        }
        if let Some(loc) = self.current_location(rnd, name) {
            let flat: Vec<f32> = values.iter().flat_map(|v| v.to_array()).collect();
            rnd.driver.uniform_4_f32_slice(loc, &flat);
        }
    }

    // --- Samplers ---

    pub fn set_texture_2d<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, texture: Handle) {
        self.set_texture(rnd, name, texture, TextureKind::Texture2D);
    }

    pub fn set_texture_3d<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, texture: Handle) {
        self.set_texture(rnd, name, texture, TextureKind::Texture3D);
    }

    /// Binds `texture` for sampler `name` on a unit leased to this program.
    ///
    /// The first call for a sampler leases a unit and points the sampler at
    /// it. Later calls only rebind when the texture changed or the unit no
    /// longer holds it. With no free unit the call is dropped.
    pub fn set_texture<D: Driver>(
        &mut self,
        rnd: &mut Renderer<D>,
        name: &str,
        texture: Handle,
        kind: TextureKind,
    ) {
        let Some(loc) = self.current_location(rnd, name) else {
            return;
        };

        if let Some(i) = self.samplers.iter().position(|b| b.location == loc) {
            let binding = self.samplers[i];
            if binding.texture == texture
                && binding.kind == kind
                && rnd.units.bound(binding.unit) == Some((texture, kind))
            {
                trace!("Sampler '{name}' already holds texture {texture}.");
                return;
            }
            match rnd.units.rebind_owned(&mut rnd.driver, self.id, loc, texture, kind) {
                Some(unit) => {
                    self.samplers[i] = SamplerBinding { location: loc, texture, kind, unit };
                    return;
                }
                // Lease lost; take a new one below.
                None => {
                    self.samplers.swap_remove(i);
                }
            }
        }

        // The pool warns on exhaustion.
        let Some(unit) = rnd.units.reserve(self.id, loc) else {
            return;
        };
        rnd.driver.uniform_1_i32(loc, unit as i32);
        rnd.units.rebind_owned(&mut rnd.driver, self.id, loc, texture, kind);
        self.samplers.push(SamplerBinding { location: loc, texture, kind, unit });
    }

    fn set_cached<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str, value: UniformValue) {
        let Some(loc) = self.current_location(rnd, name) else {
            return;
        };
        // One entry per location; a value of another kind replaces it.
        match self.values.iter_mut().find(|c| c.location == loc) {
            Some(cached) if cached.value.same_kind(&value) && cached.value.approx_eq(&value) => {
                trace!("Uniform '{name}' unchanged, skipped.");
                return;
            }
            Some(cached) => cached.value = value,
            None => self.values.push(CachedValue { location: loc, value }),
        }
        value.upload(&mut rnd.driver, loc);
    }

    /// Location of `name`, but only while this program is the current one.
    fn current_location<D: Driver>(&mut self, rnd: &mut Renderer<D>, name: &str) -> Option<Location> {
        if !self.active || rnd.active_program() != self.id {
            return None;
        }
        self.location(rnd, name)
    }

    fn sync_generation<D: Driver>(&mut self, rnd: &Renderer<D>) {
        if self.generation != rnd.cache_generation() {
            debug!("Program {} dropping caches after renderer cache reset.", self.id);
            self.locations.clear();
            self.values.clear();
            self.samplers.clear();
            self.generation = rnd.cache_generation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfx::RendererOptions;
    use crate::core::gfx::backends::headless::{Call, HeadlessDriver};

    const VERT: &str = "#version 330 core\nuniform mat4 u_proj;\nuniform float u_alpha;\nuniform vec4 u_tint;\nvoid main() {}\n";
    const FRAG: &str = "#version 330 core\nuniform sampler2D u_texture;\nuniform sampler2D u_mask;\nuniform bool u_flag;\nvoid main() {}\n";

    fn renderer(units: usize) -> Renderer<HeadlessDriver> {
        Renderer::new(HeadlessDriver::new(units), RendererOptions::default())
    }

    fn uniform_calls(rnd: &Renderer<HeadlessDriver>) -> usize {
        rnd.driver().count(Call::is_uniform)
    }

    #[test]
    fn equal_float_skips_the_driver() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        rnd.driver_mut().clear_calls();

        shd.set_float(&mut rnd, "u_alpha", 0.5);
        shd.set_float(&mut rnd, "u_alpha", 0.5);
        shd.set_float(&mut rnd, "u_alpha", 0.5 + 5e-7);
        assert_eq!(uniform_calls(&rnd), 1);

        shd.set_float(&mut rnd, "u_alpha", 0.75);
        assert_eq!(uniform_calls(&rnd), 2);
        assert_eq!(
            rnd.driver().count(|c| matches!(c, Call::UniformLocation(..))),
            1
        );
    }

    #[test]
    fn vector_and_bool_values_are_cached() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        rnd.driver_mut().clear_calls();

        shd.set_vec4(&mut rnd, "u_tint", Vec4::ONE);
        shd.set_vec4(&mut rnd, "u_tint", Vec4::ONE);
        shd.set_bool(&mut rnd, "u_flag", true);
        shd.set_bool(&mut rnd, "u_flag", true);
        assert_eq!(uniform_calls(&rnd), 2);
        shd.set_vec4(&mut rnd, "u_tint", Vec4::new(1.0, 1.0, 1.0, 0.5));
        assert_eq!(uniform_calls(&rnd), 3);
    }

    #[test]
    fn kind_change_at_one_location_invalidates_the_cached_value() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        let loc = shd.location(&mut rnd, "u_flag").unwrap();
        rnd.driver_mut().clear_calls();

        shd.set_int(&mut rnd, "u_flag", 1);
        shd.set_bool(&mut rnd, "u_flag", false);
        shd.set_int(&mut rnd, "u_flag", 1);
        assert_eq!(
            rnd.driver().calls(),
            &[Call::Uniform1i(loc, 1), Call::Uniform1i(loc, 0), Call::Uniform1i(loc, 1)]
        );
    }

    #[test]
    fn matrices_always_write_through() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        rnd.driver_mut().clear_calls();

        shd.set_mat4(&mut rnd, "u_proj", &Mat4::IDENTITY);
        shd.set_mat4(&mut rnd, "u_proj", &Mat4::IDENTITY);
        assert_eq!(uniform_calls(&rnd), 2);
    }

    #[test]
    fn setter_on_inactive_program_does_nothing() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        rnd.driver_mut().clear_calls();

        shd.set_float(&mut rnd, "u_alpha", 1.0);
        shd.set_texture_2d(&mut rnd, "u_texture", 5);
        assert!(rnd.driver().calls().is_empty());
        assert_eq!(rnd.texture_units().used(), 1);
    }

    #[test]
    fn missing_uniform_is_a_silent_no_op() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        assert_eq!(shd.location(&mut rnd, "u_nope"), None);
        rnd.driver_mut().clear_calls();
        shd.set_float(&mut rnd, "u_nope", 1.0);
        assert!(rnd.driver().calls().is_empty());
    }

    #[test]
    fn failed_compile_refuses_to_begin() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, "#error no fragment\n", None);
        assert!(!shd.is_compiled());
        assert!(shd.error().is_some_and(|e| e.contains("no fragment")));

        shd.begin(&mut rnd);
        assert!(!shd.is_active());
        assert_eq!(rnd.active_program(), 0);

        let mut empty = ShaderProgram::new("", FRAG, None);
        assert!(empty.compile(&mut rnd).is_err());
    }

    #[test]
    fn begin_end_restores_the_previous_program() {
        let mut rnd = renderer(8);
        let mut a = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        let mut b = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        a.begin(&mut rnd);
        b.begin(&mut rnd);
        assert_eq!(rnd.active_program(), b.id());
        b.end(&mut rnd);
        assert_eq!(rnd.active_program(), a.id());
        a.end(&mut rnd);
        assert_eq!(rnd.active_program(), 0);
        assert_eq!(rnd.driver().current_program(), 0);
    }

    #[test]
    fn sampler_leases_once_and_rebinds_on_change() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        let loc = shd.location(&mut rnd, "u_texture").unwrap();
        rnd.driver_mut().clear_calls();

        shd.set_texture_2d(&mut rnd, "u_texture", 11);
        let unit = rnd.texture_units().find(shd.id(), loc).unwrap();
        assert_ne!(unit, 0);
        assert!(rnd.driver().calls().contains(&Call::Uniform1i(loc, unit as i32)));
        assert_eq!(rnd.driver().bound_texture(unit as u32), Some((TextureKind::Texture2D, 11)));

        rnd.driver_mut().clear_calls();
        shd.set_texture_2d(&mut rnd, "u_texture", 11);
        assert!(rnd.driver().calls().is_empty());

        shd.set_texture_2d(&mut rnd, "u_texture", 12);
        assert_eq!(rnd.driver().count(|c| matches!(c, Call::BindTexture(..))), 1);
        assert_eq!(rnd.driver().count(Call::is_uniform), 0);
        assert_eq!(rnd.texture_units().used(), 2);
    }

    #[test]
    fn sampler_rebinds_after_its_texture_is_invalidated() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        shd.set_texture_2d(&mut rnd, "u_texture", 11);
        rnd.units.invalidate_texture(&mut rnd.driver, 11);
        rnd.driver_mut().clear_calls();

        shd.set_texture_2d(&mut rnd, "u_texture", 11);
        assert!(rnd.driver().calls().contains(&Call::BindTexture(TextureKind::Texture2D, 11)));
    }

    #[test]
    fn exhausted_pool_leaves_sampler_unbound() {
        // Unit 0 plus one leasable unit.
        let mut rnd = renderer(2);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        shd.set_texture_2d(&mut rnd, "u_texture", 11);
        rnd.driver_mut().clear_calls();

        shd.set_texture_2d(&mut rnd, "u_mask", 12);
        assert_eq!(rnd.driver().count(|c| matches!(c, Call::BindTexture(..))), 0);
        assert_eq!(rnd.texture_units().free(), 0);
    }

    #[test]
    fn recompile_drops_caches_and_leases() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        shd.set_float(&mut rnd, "u_alpha", 0.5);
        shd.set_texture_2d(&mut rnd, "u_texture", 11);
        let old = shd.id();
        assert_eq!(rnd.texture_units().used(), 2);

        shd.compile(&mut rnd).unwrap();
        assert_ne!(shd.id(), old);
        assert!(!rnd.driver().is_live(old));
        assert_eq!(rnd.texture_units().used(), 1);

        shd.begin(&mut rnd);
        rnd.driver_mut().clear_calls();
        shd.set_float(&mut rnd, "u_alpha", 0.5);
        assert_eq!(uniform_calls(&rnd), 1);
        assert_eq!(
            rnd.driver().count(|c| matches!(c, Call::UniformLocation(..))),
            1
        );
    }

    #[test]
    fn renderer_cache_reset_reaches_every_program() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        shd.set_float(&mut rnd, "u_alpha", 0.5);
        shd.set_texture_2d(&mut rnd, "u_texture", 11);

        rnd.clear_caches();
        assert_eq!(rnd.texture_units().used(), 1);
        rnd.driver_mut().clear_calls();
        shd.set_float(&mut rnd, "u_alpha", 0.5);
        shd.set_texture_2d(&mut rnd, "u_texture", 11);
        assert_eq!(rnd.driver().count(|c| matches!(c, Call::Uniform1f(..))), 1);
        assert_eq!(rnd.driver().count(|c| matches!(c, Call::BindTexture(..))), 1);
        assert_eq!(rnd.texture_units().used(), 2);
    }

    #[test]
    fn destroy_releases_leases_without_touching_units() {
        let mut rnd = renderer(8);
        let mut shd = ShaderProgram::create(&mut rnd, VERT, FRAG, None);
        shd.begin(&mut rnd);
        shd.set_texture_2d(&mut rnd, "u_texture", 11);
        let id = shd.id();
        shd.destroy(&mut rnd);
        assert_eq!(rnd.texture_units().used(), 1);
        assert!(!rnd.driver().is_live(id));
        assert_eq!(rnd.active_program(), 0);
    }
}
