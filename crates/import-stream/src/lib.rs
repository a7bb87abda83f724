mod budget;
mod decoder;
mod stream;
mod temp_buffer;

pub use budget::ByteBudget;
pub use decoder::{DecoderStream, Transform};
pub use stream::{ByteStream, FileStream, MemoryStream};
pub use temp_buffer::TemporaryBuffer;
