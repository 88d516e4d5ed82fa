pub mod frame_decoder;
pub mod gemini;
