pub mod error;
pub mod mode;
pub mod progress;
pub mod range;
pub mod value_class;

pub use error::*;
pub use mode::*;
pub use progress::*;
pub use range::*;
pub use value_class::*;
