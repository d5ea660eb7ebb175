use crate::core::gfx::driver::{Driver, Handle, TextureImage, TextureKind};
use crate::core::gfx::gc::ResourceKind;
use crate::core::gfx::{Renderer, SamplerDesc};
use image::RgbaImage;
use log::debug;
use std::path::Path;

/// RGBA8 texture. Uploads and parameter changes go through unit 0, which the
/// unit pool never leases out.
#[derive(Debug)]
pub struct Texture {
    id: Handle,
    kind: TextureKind,
    width: u32,
    height: u32,
    depth: u32,
    sampler: SamplerDesc,
}

impl Texture {
    pub fn from_image<D: Driver>(
        rnd: &mut Renderer<D>,
        image: &RgbaImage,
        sampler: SamplerDesc,
    ) -> Result<Self, String> {
        Self::from_rgba(rnd, image.width(), image.height(), image.as_raw(), sampler)
    }

    pub fn load<D: Driver>(
        rnd: &mut Renderer<D>,
        path: &Path,
        sampler: SamplerDesc,
    ) -> Result<Self, String> {
        let image = image::open(path)
            .map_err(|e| format!("Failed to load '{}': {e}", path.display()))?
            .to_rgba8();
        debug!("Loaded texture '{}' ({}x{}).", path.display(), image.width(), image.height());
        Self::from_image(rnd, &image, sampler)
    }

    pub fn from_rgba<D: Driver>(
        rnd: &mut Renderer<D>,
        width: u32,
        height: u32,
        data: &[u8],
        sampler: SamplerDesc,
    ) -> Result<Self, String> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(format!(
                "RGBA data for {width}x{height} must be {expected} bytes, got {}",
                data.len()
            ));
        }
        Self::upload(rnd, TextureKind::Texture2D, (width, height, 1), Some(data), sampler)
    }

    /// Storage only, e.g. a render target.
    pub fn empty<D: Driver>(
        rnd: &mut Renderer<D>,
        width: u32,
        height: u32,
        sampler: SamplerDesc,
    ) -> Result<Self, String> {
        Self::upload(rnd, TextureKind::Texture2D, (width, height, 1), None, sampler)
    }

    pub fn volume<D: Driver>(
        rnd: &mut Renderer<D>,
        size: (u32, u32, u32),
        data: Option<&[u8]>,
        sampler: SamplerDesc,
    ) -> Result<Self, String> {
        let expected = size.0 as usize * size.1 as usize * size.2 as usize * 4;
        if let Some(data) = data
            && data.len() != expected
        {
            return Err(format!("RGBA volume data must be {expected} bytes, got {}", data.len()));
        }
        Self::upload(rnd, TextureKind::Texture3D, size, data, sampler)
    }

    fn upload<D: Driver>(
        rnd: &mut Renderer<D>,
        kind: TextureKind,
        (width, height, depth): (u32, u32, u32),
        data: Option<&[u8]>,
        sampler: SamplerDesc,
    ) -> Result<Self, String> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(format!("Texture size {width}x{height}x{depth} is empty"));
        }
        let id = rnd.driver.create_texture()?;
        let d = &mut rnd.driver;
        d.active_texture(0);
        d.bind_texture(kind, id);
        d.tex_sampler(kind, sampler);
        d.tex_image(kind, &TextureImage { width, height, depth, data });
        if sampler.mipmaps && data.is_some() {
            d.generate_mipmap(kind);
        }
        d.bind_texture(kind, 0);
        Ok(Self { id, kind, width, height, depth, sampler })
    }

    #[inline(always)]
    pub const fn id(&self) -> Handle {
        self.id
    }

    #[inline(always)]
    pub const fn kind(&self) -> TextureKind {
        self.kind
    }

    #[inline(always)]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline(always)]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    #[inline(always)]
    pub const fn sampler(&self) -> SamplerDesc {
        self.sampler
    }

    pub fn set_sampler<D: Driver>(&mut self, rnd: &mut Renderer<D>, sampler: SamplerDesc) {
        if sampler == self.sampler {
            return;
        }
        let d = &mut rnd.driver;
        d.active_texture(0);
        d.bind_texture(self.kind, self.id);
        d.tex_sampler(self.kind, sampler);
        d.bind_texture(self.kind, 0);
        self.sampler = sampler;
    }

    /// Replaces the full image. Size must match.
    pub fn update<D: Driver>(&mut self, rnd: &mut Renderer<D>, image: &RgbaImage) -> Result<(), String> {
        if image.dimensions() != (self.width, self.height) || self.kind != TextureKind::Texture2D {
            return Err(format!(
                "Update of {}x{} into {}x{} texture",
                image.width(),
                image.height(),
                self.width,
                self.height
            ));
        }
        let d = &mut rnd.driver;
        d.active_texture(0);
        d.bind_texture(self.kind, self.id);
        d.tex_image(
            self.kind,
            &TextureImage { width: self.width, height: self.height, depth: 1, data: Some(image.as_raw()) },
        );
        if self.sampler.mipmaps {
            d.generate_mipmap(self.kind);
        }
        d.bind_texture(self.kind, 0);
        Ok(())
    }

    /// Reallocates 2D storage at a new size. Contents are undefined
    /// afterwards; framebuffer attachments keep pointing at this texture.
    pub fn resize<D: Driver>(&mut self, rnd: &mut Renderer<D>, width: u32, height: u32) -> Result<(), String> {
        if width == 0 || height == 0 || self.kind != TextureKind::Texture2D {
            return Err(format!("Cannot resize {:?} texture to {width}x{height}", self.kind));
        }
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let d = &mut rnd.driver;
        d.active_texture(0);
        d.bind_texture(self.kind, self.id);
        d.tex_image(self.kind, &TextureImage { width, height, depth: 1, data: None });
        d.bind_texture(self.kind, 0);
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn destroy<D: Driver>(self, rnd: &mut Renderer<D>) {
        rnd.gc.push(ResourceKind::Texture, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfx::backends::headless::{Call, HeadlessDriver};
    use crate::core::gfx::{RendererOptions, SamplerFilter};

    fn renderer() -> Renderer<HeadlessDriver> {
        Renderer::new(HeadlessDriver::default(), RendererOptions::default())
    }

    #[test]
    fn upload_goes_through_unit_zero_and_unbinds() {
        let mut rnd = renderer();
        let img = RgbaImage::from_pixel(4, 2, image::Rgba([255, 0, 0, 255]));
        let tex = Texture::from_image(&mut rnd, &img, SamplerDesc::default()).unwrap();
        assert_eq!(tex.size(), (4, 2));
        assert!(rnd.driver().calls().contains(&Call::ActiveTexture(0)));
        assert!(rnd.driver().calls().contains(&Call::TexImage {
            kind: TextureKind::Texture2D,
            width: 4,
            height: 2,
            depth: 1
        }));
        assert_eq!(rnd.driver().bound_texture(0), None);
        assert!(rnd.driver_mut().take_errors().is_empty());
    }

    #[test]
    fn wrong_sized_data_is_rejected() {
        let mut rnd = renderer();
        assert!(Texture::from_rgba(&mut rnd, 2, 2, &[0; 15], SamplerDesc::default()).is_err());
        assert!(Texture::empty(&mut rnd, 0, 4, SamplerDesc::default()).is_err());
        assert!(Texture::volume(&mut rnd, (2, 2, 2), Some(&[0; 16]), SamplerDesc::default()).is_err());
        assert_eq!(rnd.driver().live_count(), 0);
    }

    #[test]
    fn sampler_change_only_when_different() {
        let mut rnd = renderer();
        let mut tex = Texture::empty(&mut rnd, 8, 8, SamplerDesc::default()).unwrap();
        rnd.driver_mut().clear_calls();
        tex.set_sampler(&mut rnd, SamplerDesc::default());
        assert!(rnd.driver().calls().is_empty());
        let nearest = SamplerDesc { filter: SamplerFilter::Nearest, ..SamplerDesc::default() };
        tex.set_sampler(&mut rnd, nearest);
        assert_eq!(rnd.driver().count(|c| matches!(c, Call::TexSampler(..))), 1);
        assert_eq!(tex.sampler(), nearest);
    }

    #[test]
    fn resize_reallocates_only_on_a_new_size() {
        let mut rnd = renderer();
        let mut tex = Texture::empty(&mut rnd, 8, 8, SamplerDesc::default()).unwrap();
        rnd.driver_mut().clear_calls();
        tex.resize(&mut rnd, 8, 8).unwrap();
        assert!(rnd.driver().calls().is_empty());
        tex.resize(&mut rnd, 16, 4).unwrap();
        assert_eq!(tex.size(), (16, 4));
        assert!(rnd.driver().calls().contains(&Call::TexImage {
            kind: TextureKind::Texture2D,
            width: 16,
            height: 4,
            depth: 1
        }));
        assert!(tex.resize(&mut rnd, 0, 4).is_err());
        assert!(rnd.driver_mut().take_errors().is_empty());
    }

    #[test]
    fn deleting_a_leased_texture_clears_the_unit() {
        let mut rnd = renderer();
        let tex = Texture::empty(&mut rnd, 8, 8, SamplerDesc::default()).unwrap();
        let id = tex.id();
        let unit = rnd.units.reserve(99, 0).unwrap();
        rnd.units.rebind_owned(&mut rnd.driver, 99, 0, id, TextureKind::Texture2D);

        tex.destroy(&mut rnd);
        assert_eq!(rnd.texture_units().bound(unit), Some((id, TextureKind::Texture2D)));
        rnd.end_frame();
        assert_eq!(rnd.texture_units().bound(unit), Some((0, TextureKind::Texture2D)));
        assert!(!rnd.driver().is_live(id));
    }
}
