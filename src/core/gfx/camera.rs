use glam::{Mat4, Vec2, Vec3};

/// Pixels per world unit when `meter` is at its default.
pub const DEFAULT_METER: f32 = 100.0;

/// Origin-centered orthographic camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera2D {
    pub position: Vec2,
    /// Degrees, counter-clockwise.
    pub angle: f32,
    /// Values above 1 zoom out.
    pub zoom: f32,
    pub meter: f32,
    width: u32,
    height: u32,
}

impl Camera2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            position: Vec2::ZERO,
            angle: 0.0,
            zoom: 1.0,
            meter: DEFAULT_METER,
            width,
            height,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    #[inline(always)]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn projection(&self) -> Mat4 {
        let scale = self.meter / DEFAULT_METER * 0.5;
        let w = self.width as f32 * scale;
        let h = self.height as f32 * scale;
        Mat4::orthographic_rh_gl(-w, w, -h, h, -1.0, 1.0)
    }

    pub fn view(&self) -> Mat4 {
        let inv = if self.zoom != 0.0 { 1.0 / self.zoom } else { 0.0 };
        Mat4::from_scale(Vec3::new(inv, inv, 1.0))
            * Mat4::from_rotation_z(self.angle.to_radians())
            * Mat4::from_translation(-self.position.extend(0.0))
    }

    /// View placing (0, 0) at the bottom-left corner of the window, for
    /// screen-space overlays.
    pub fn screen_view(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(
            -(self.width as f32) * 0.5,
            -(self.height as f32) * 0.5,
            0.0,
        ))
    }
}
