mod error;
pub mod serve;

pub use error::Error;
