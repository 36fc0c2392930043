// src/domain/mod.rs
pub mod charter;
pub mod draft;
pub mod media;
