pub mod asset;
pub mod error;
pub mod renderer;
