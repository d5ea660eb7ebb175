//! Texture image unit leasing.
//!
//! Unit 0 is never leased. It stays the shared scratch unit for uploads and
//! one-off binds, so a program sampling from a leased unit can't have its
//! texture swapped out from under it by unrelated code.

use crate::core::gfx::driver::{Driver, Handle, Location, TextureKind};
use log::{debug, warn};

pub const FALLBACK_TEXTURE_UNITS: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TextureUnit {
    owner: Handle,
    location: Location,
    texture: Handle,
    kind: TextureKind,
    in_use: bool,
}

#[derive(Debug)]
pub struct TextureUnits {
    units: Vec<TextureUnit>,
    used: usize,
}

impl TextureUnits {
    /// Builds the pool from the driver-reported unit count, using `fallback`
    /// when the driver reports none.
    pub fn new(reported: usize, fallback: usize) -> Self {
        let total = if reported == 0 {
            let fallback = fallback.max(2);
            warn!("Driver reported 0 texture units. Using fallback = {fallback}.");
            fallback
        } else {
            reported
        };
        let mut units = vec![TextureUnit::default(); total];
        units[0].in_use = true;
        debug!("Texture unit pool ready: {total} units (unit 0 reserved).");
        Self { units, used: 1 }
    }

    #[inline(always)]
    pub fn total(&self) -> usize {
        self.units.len()
    }

    #[inline(always)]
    pub const fn used(&self) -> usize {
        self.used
    }

    #[inline(always)]
    pub fn free(&self) -> usize {
        self.units.len() - self.used
    }

    /// Unit leased to (`owner`, `location`), if any.
    pub fn find(&self, owner: Handle, location: Location) -> Option<usize> {
        self.units
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, u)| u.in_use && u.owner == owner && u.location == location)
            .map(|(i, _)| i)
    }

    /// Texture and kind the pool believes is bound at `unit`.
    pub fn bound(&self, unit: usize) -> Option<(Handle, TextureKind)> {
        let u = self.units.get(unit)?;
        (unit != 0 && u.in_use).then_some((u.texture, u.kind))
    }

    /// Leases a unit to (`owner`, `location`). Idempotent; returns `None` for
    /// a zero owner, a negative location, or an exhausted pool. Nothing is
    /// bound.
    pub fn reserve(&mut self, owner: Handle, location: Location) -> Option<usize> {
        if owner == 0 || location < 0 {
            return None;
        }
        if let Some(unit) = self.find(owner, location) {
            return Some(unit);
        }
        let Some((index, unit)) = self.units.iter_mut().enumerate().skip(1).find(|(_, u)| !u.in_use)
        else {
            warn!(
                "No free texture units for program {owner} location {location} ({} in use).",
                self.used
            );
            return None;
        };
        *unit = TextureUnit { owner, location, texture: 0, kind: TextureKind::Texture2D, in_use: true };
        self.used += 1;
        Some(index)
    }

    /// Binds `texture` on the unit leased to (`owner`, `location`), skipping
    /// the driver when it already holds that texture. `None` if no lease.
    pub fn rebind_owned(
        &mut self,
        driver: &mut impl Driver,
        owner: Handle,
        location: Location,
        texture: Handle,
        kind: TextureKind,
    ) -> Option<usize> {
        if owner == 0 || location < 0 {
            return None;
        }
        let index = self.find(owner, location)?;
        let unit = &mut self.units[index];
        if unit.texture == texture && unit.kind == kind {
            return Some(index);
        }
        driver.active_texture(index as u32);
        driver.bind_texture(kind, texture);
        driver.active_texture(0);
        unit.texture = texture;
        unit.kind = kind;
        Some(index)
    }

    /// Frees every unit leased to `owner`. Makes no driver calls, so it is
    /// safe while the context is being torn down. The stale binding stays on
    /// the hardware unit until its next lessee rebinds it.
    pub fn release_owner(&mut self, owner: Handle) {
        if owner == 0 {
            return;
        }
        for unit in self.units.iter_mut().skip(1) {
            if unit.in_use && unit.owner == owner {
                *unit = TextureUnit::default();
                self.used -= 1;
            }
        }
    }

    /// Forgets `texture` in every unit holding it. Call before the texture is
    /// deleted; the driver drops those bindings on delete anyway.
    pub fn invalidate_texture(&mut self, driver: &mut impl Driver, texture: Handle) {
        if texture == 0 {
            return;
        }
        let mut touched = false;
        for (index, unit) in self.units.iter_mut().enumerate().skip(1) {
            if unit.in_use && unit.texture == texture {
                driver.active_texture(index as u32);
                driver.bind_texture(unit.kind, 0);
                unit.texture = 0;
                touched = true;
            }
        }
        if touched {
            driver.active_texture(0);
        }
    }

    /// Unbinds and frees every leased unit. Unit 0 stays reserved.
    pub fn unbind_all(&mut self, driver: &mut impl Driver) {
        for (index, unit) in self.units.iter_mut().enumerate().skip(1) {
            if unit.in_use && unit.texture != 0 {
                driver.active_texture(index as u32);
                driver.bind_texture(unit.kind, 0);
            }
            *unit = TextureUnit::default();
        }
        self.used = 1;
        driver.active_texture(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gfx::backends::headless::{Call, HeadlessDriver};

    #[test]
    fn zero_reported_units_uses_fallback() {
        let units = TextureUnits::new(0, FALLBACK_TEXTURE_UNITS);
        assert_eq!(units.total(), 16);
        assert_eq!(units.used(), 1);
        assert_eq!(units.free(), 15);
    }

    #[test]
    fn reserve_is_idempotent_and_never_hands_out_unit_zero() {
        let mut units = TextureUnits::new(8, FALLBACK_TEXTURE_UNITS);
        let a = units.reserve(3, 0).unwrap();
        assert_ne!(a, 0);
        assert_eq!(units.reserve(3, 0), Some(a));
        assert_eq!(units.used(), 2);
        assert_eq!(units.find(3, 0), Some(a));
        assert_eq!(units.find(3, 1), None);
    }

    #[test]
    fn invalid_owner_or_location_is_rejected() {
        let mut units = TextureUnits::new(8, FALLBACK_TEXTURE_UNITS);
        assert_eq!(units.reserve(0, 2), None);
        assert_eq!(units.reserve(4, -1), None);
        assert_eq!(units.used(), 1);
    }

    #[test]
    fn pool_of_four_exhausts_and_recovers() {
        let mut units = TextureUnits::new(4, FALLBACK_TEXTURE_UNITS);
        let leased: Vec<usize> = [(1, 0), (1, 1), (2, 0)]
            .iter()
            .map(|&(owner, loc)| units.reserve(owner, loc).unwrap())
            .collect();
        assert_eq!(leased, vec![1, 2, 3]);
        assert_eq!(units.reserve(3, 0), None);
        assert_eq!(units.free(), 0);

        units.release_owner(2);
        assert_eq!(units.used(), 3);
        assert_eq!(units.reserve(3, 0), Some(3));
    }

    #[test]
    fn rebind_skips_the_driver_for_the_same_texture() {
        let mut d = HeadlessDriver::default();
        let mut units = TextureUnits::new(8, FALLBACK_TEXTURE_UNITS);
        assert_eq!(units.rebind_owned(&mut d, 5, 0, 9, TextureKind::Texture2D), None);

        let unit = units.reserve(5, 0).unwrap();
        assert_eq!(units.rebind_owned(&mut d, 5, 0, 9, TextureKind::Texture2D), Some(unit));
        assert_eq!(units.rebind_owned(&mut d, 5, 0, 9, TextureKind::Texture2D), Some(unit));
        assert_eq!(d.count(|c| matches!(c, Call::BindTexture(..))), 1);
        assert_eq!(d.bound_texture(unit as u32), Some((TextureKind::Texture2D, 9)));
        assert_eq!(d.calls().last(), Some(&Call::ActiveTexture(0)));
        assert_eq!(units.bound(unit), Some((9, TextureKind::Texture2D)));
    }

    #[test]
    fn release_makes_no_driver_calls() {
        let mut d = HeadlessDriver::default();
        let mut units = TextureUnits::new(8, FALLBACK_TEXTURE_UNITS);
        units.reserve(5, 0);
        units.rebind_owned(&mut d, 5, 0, 9, TextureKind::Texture2D);
        d.clear_calls();
        units.release_owner(5);
        assert!(d.calls().is_empty());
        assert_eq!(units.used(), 1);
    }

    #[test]
    fn invalidate_clears_only_matching_units() {
        let mut d = HeadlessDriver::default();
        let mut units = TextureUnits::new(8, FALLBACK_TEXTURE_UNITS);
        let a = units.reserve(1, 0).unwrap();
        let b = units.reserve(2, 0).unwrap();
        units.rebind_owned(&mut d, 1, 0, 7, TextureKind::Texture2D);
        units.rebind_owned(&mut d, 2, 0, 8, TextureKind::Texture2D);

        units.invalidate_texture(&mut d, 7);
        assert_eq!(units.bound(a), Some((0, TextureKind::Texture2D)));
        assert_eq!(units.bound(b), Some((8, TextureKind::Texture2D)));
        // The lease itself survives.
        assert_eq!(units.find(1, 0), Some(a));
    }

    #[test]
    fn unbind_all_resets_to_only_unit_zero() {
        let mut d = HeadlessDriver::default();
        let mut units = TextureUnits::new(8, FALLBACK_TEXTURE_UNITS);
        units.reserve(1, 0);
        units.reserve(1, 1);
        units.rebind_owned(&mut d, 1, 0, 7, TextureKind::Texture3D);
        units.unbind_all(&mut d);
        assert_eq!(units.used(), 1);
        assert_eq!(units.find(1, 0), None);
        assert_eq!(d.bound_texture(1), None);
        assert_eq!(units.bound(0), None);
    }
}
