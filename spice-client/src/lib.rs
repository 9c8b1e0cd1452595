pub mod agent;
pub mod buffer;
pub mod channel;
pub mod error;
pub mod link;
pub mod logging;
pub mod session;
pub mod transport;

pub use error::{ClientError, ClientResult, ConfigError, DisconnectReason};
pub use session::{Session, SessionEvent, SessionHandle};
