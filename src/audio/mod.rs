pub mod codec;
pub mod frame;
pub mod wav;

pub use frame::{AudioFrame, PcmChunk};
