//! The realtime chat surface: handshake, per-turn pipeline and the
//! socket loop that drives it.

mod context;
mod handshake;
mod socket;
mod turn;

pub use context::assemble_context;
pub use handshake::cookie_token;
pub use socket::chat_socket;
pub use turn::{ReplySink, TurnPipeline};
