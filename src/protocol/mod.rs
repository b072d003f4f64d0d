//! WebSocket wire protocol (RFC 6455 subset): handshake, framing, masking.

pub mod frame;
pub mod handshake;
pub mod mask;

pub use frame::{decode, seal, seal_masked, unseal};
#[cfg(feature = "async-tokio")]
pub use handshake::negotiate;
pub use handshake::{HandshakeRequest, HandshakeResponse, WS_GUID, compute_accept_key};
pub use mask::{apply_mask, apply_mask_fast, random_mask};
