pub mod decoder;
pub mod display;
pub mod sink;

pub use decoder::{DecodedImage, ImageDecoder, JpegDecoder};
pub use display::DisplayBuffer;
pub use sink::{FrameSink, HeadlessSink, SnapshotSink};
