mod chat;
mod socket;

pub use chat::*;
pub use socket::*;
