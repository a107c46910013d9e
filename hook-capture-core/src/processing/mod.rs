pub mod analysis;
pub mod frame_queue;
pub mod pipeline;
pub mod transforms;
pub mod wav_format;
