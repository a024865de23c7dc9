pub mod checksum;
pub mod error;
pub mod icmp;
pub mod reply;
pub mod socket;
pub mod validate;

pub use checksum::*;
pub use error::*;
pub use icmp::*;
pub use reply::*;
pub use socket::*;
pub use validate::*;
