mod money;
mod protocol;
mod secret;
mod traffic;

pub mod helpers;

pub use money::{Money, MoneyConversionError};
pub use protocol::{Protocol, ProtocolParseError};
pub use secret::Secret;
pub use traffic::{gb_to_bytes, BYTES_PER_GB};
