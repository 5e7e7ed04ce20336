pub mod aggregate;
pub mod export;
pub mod measurement;
pub mod render;
pub mod settings;
pub mod survey;
