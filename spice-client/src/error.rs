use spice_protocol::NetworkError;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ClientError {
    Network(NetworkError),
    Io(io::Error),
    Config(ConfigError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Network(err) => write!(f, "protocol error: {:?}", err),
            ClientError::Io(err) => write!(f, "io error: {}", err),
            ClientError::Config(err) => write!(f, "configuration error: {:?}", err),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<NetworkError> for ClientError {
    fn from(err: NetworkError) -> Self {
        ClientError::Network(err)
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Io(err)
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        ClientError::Config(err)
    }
}

/// Raised when a caller registers an inconsistent set of channel callbacks, e.g. supplying a
/// clipboard notice callback without a matching data callback.
#[derive(Debug, Eq, PartialEq)]
pub enum ConfigError {
    IncompleteClipboardCallbacks,
    ChannelNotConnected,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Why a channel went away, reported up through `Session::process` rather than collapsed into
/// a bare boolean.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum DisconnectReason {
    UserRequested,
    PeerClosed,
    ProtocolError,
    IoError,
}
