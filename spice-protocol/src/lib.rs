#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub const SPICE_MAGIC: u32 = 0x5245_4451; // "REDQ"
pub const SPICE_VERSION_MAJOR: u32 = 2;
pub const SPICE_VERSION_MINOR: u32 = 2;

pub mod error;
pub mod wire;
pub mod link;
pub mod header;
pub mod crypto;
pub mod messages;

pub use error::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
pub use link::PROTOCOL_COMMON_CAPS;
pub use wire::{Deserialize, PayloadBatch, Serialize, SizedRead, SizedWrite};
