pub mod engine;
pub mod transport;

pub use engine::*;
pub use transport::*;
