pub mod error;

pub use error::{BoxError, Error, Result};
