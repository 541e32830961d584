pub mod batch;
pub mod channel;
pub mod error;
pub mod packet;

pub use batch::*;
pub use channel::*;
pub use error::*;
pub use packet::*;
