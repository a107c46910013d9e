pub mod audio_input;
pub mod capture_delegate;
pub mod effect_sink;
pub mod frame_stage;
