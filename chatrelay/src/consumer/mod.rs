// Stream consumer
//
// Client side of the relay: a per-session actor that submits the user's
// message, decodes the streamed response and grows the in-flight assistant
// turn as content arrives.

mod session;
mod transport;

pub use session::{ChatSession, Outcome, SendError, SessionConfig, SessionState, SessionView};
pub use transport::{ByteStream, ChatTransport, HttpTransport, TransportError};
