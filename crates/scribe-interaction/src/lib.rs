//! Agent-facing layer: locating the agent binary, parsing its stream
//! output and managing query sessions.

pub mod bridge;
pub mod resolver;
pub mod stream;

pub use bridge::{AgentBridge, build_args};
pub use resolver::{AGENT_BINARY, BinaryResolver, ResolutionSource, ResolvedBinary};
pub use stream::{LineBuffer, StreamNormalizer, StreamRecord};
