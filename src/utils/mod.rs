pub mod error;
pub mod limiters;
pub mod similarity;

pub use error::ApiError;
pub use limiters::Limiters;
