/// Steps through `frames` sprite-sheet cells, `duration` seconds each,
/// looping back to the first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameAnimator2D {
    frames: u32,
    duration: f32,
    position: f32,
    paused: bool,
}

impl FrameAnimator2D {
    /// Starts paused on frame 0.
    pub const fn new(frames: u32, duration: f32) -> Self {
        Self { frames, duration, position: 0.0, paused: true }
    }

    pub fn update(&mut self, dt: f32) {
        if self.paused || self.frames == 0 || self.duration <= 0.0 {
            return;
        }
        self.position += dt / self.duration;
        if self.position as u32 >= self.frames {
            self.position = 0.0;
        }
    }

    /// Current cell index, always below `frames` (or 0 with no frames).
    #[inline(always)]
    pub fn frame(&self) -> u32 {
        self.position as u32
    }

    #[inline(always)]
    pub const fn frames(&self) -> u32 {
        self.frames
    }

    pub fn set_frames(&mut self, frames: u32) {
        self.frames = frames;
        if self.frame() >= frames {
            self.position = 0.0;
        }
    }

    /// Seconds per frame.
    #[inline(always)]
    pub const fn duration(&self) -> f32 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: f32) {
        self.duration = duration;
    }

    #[inline(always)]
    pub const fn is_active(&self) -> bool {
        !self.paused
    }

    pub fn start(&mut self) {
        self.paused = false;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Pauses and rewinds to frame 0.
    pub fn stop(&mut self) {
        self.paused = true;
        self.position = 0.0;
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_one_frame_per_duration_and_wraps() {
        let mut anim = FrameAnimator2D::new(4, 0.25);
        anim.start();
        anim.update(0.3);
        assert_eq!(anim.frame(), 1);
        anim.update(0.5);
        assert_eq!(anim.frame(), 3);
        anim.update(0.25);
        assert_eq!(anim.frame(), 0);
    }

    #[test]
    fn paused_until_started() {
        let mut anim = FrameAnimator2D::new(4, 0.1);
        anim.update(1.0);
        assert_eq!(anim.frame(), 0);
        assert!(!anim.is_active());

        anim.start();
        anim.update(0.15);
        anim.pause();
        anim.update(1.0);
        assert_eq!(anim.frame(), 1);
        anim.resume();
        assert!(anim.is_active());
    }

    #[test]
    fn stop_rewinds_and_reset_keeps_running() {
        let mut anim = FrameAnimator2D::new(8, 0.1);
        anim.start();
        anim.update(0.35);
        anim.stop();
        assert_eq!(anim.frame(), 0);
        assert!(!anim.is_active());

        anim.start();
        anim.update(0.25);
        anim.reset();
        assert_eq!(anim.frame(), 0);
        assert!(anim.is_active());
    }

    #[test]
    fn degenerate_setups_stay_on_frame_zero() {
        let mut none = FrameAnimator2D::new(0, 0.1);
        none.start();
        none.update(5.0);
        assert_eq!(none.frame(), 0);

        let mut instant = FrameAnimator2D::new(4, 0.0);
        instant.start();
        instant.update(5.0);
        assert_eq!(instant.frame(), 0);

        let mut shrink = FrameAnimator2D::new(8, 0.1);
        shrink.start();
        shrink.update(0.65);
        shrink.set_frames(4);
        assert_eq!(shrink.frame(), 0);
    }
}
