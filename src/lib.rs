//! Retained-mode 2D graphics core over a bind-then-draw driver: cached shader
//! programs, a texture unit pool, deferred GPU object deletion, a sprite batch
//! and immediate shape drawing.

pub mod app;
pub mod config;
pub mod core;
