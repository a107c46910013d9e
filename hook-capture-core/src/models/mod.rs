pub mod audio_models;
pub mod config;
pub mod error;
pub mod session_info;
pub mod state;
