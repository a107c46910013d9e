pub mod frame_store;
pub mod metadata;
pub mod session_sink;
