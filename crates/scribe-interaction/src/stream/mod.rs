//! Incremental parsing of the agent's stdout.

mod line_buffer;
mod normalize;
mod record;

pub use line_buffer::LineBuffer;
pub use normalize::StreamNormalizer;
pub use record::{ContentBlock, Envelope, StreamRecord, text_of};
