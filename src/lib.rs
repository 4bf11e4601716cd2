pub mod config;
pub mod pictures;
pub mod viewer;
