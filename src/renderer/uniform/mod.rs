pub mod camera;
pub mod instance;
pub mod joint;
