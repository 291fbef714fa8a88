//! Wire protocol shared by the account endpoint, game-server link and chat
//! endpoint: framing, message ids, and the three message catalogues.

pub mod account;
pub mod chat;
pub mod error;
pub mod game;
pub mod ids;
pub mod status;
pub mod wire;

pub use error::CodecError;
pub use status::{AccessLevel, ErrorKind};
pub use wire::{Frame, MessageId, Reader, Writer};
