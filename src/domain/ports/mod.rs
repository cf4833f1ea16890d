mod image_subscriber_port;
mod key_codec_port;
mod transport_port;

pub use image_subscriber_port::ImageSubscriber;
pub use key_codec_port::KeyCodec;
pub use transport_port::{ByteStream, ImageTransport};

#[cfg(test)]
pub mod mocks {
    pub use super::image_subscriber_port::mock::RecordingSubscriber;
    pub use super::transport_port::mock::{StubTransport, png_bytes};
}
