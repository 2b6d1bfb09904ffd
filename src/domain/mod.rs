pub mod models;
pub mod motion;
pub mod output_frame;
pub mod profile;
pub mod settings;
pub mod steering;
pub mod stick;
