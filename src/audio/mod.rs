pub mod buffer;
pub mod decode;

pub use buffer::AudioBuffer;
pub use decode::decode_audio;
