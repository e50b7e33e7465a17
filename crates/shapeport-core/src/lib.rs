pub mod artifact;
pub mod engine;
pub mod error;
pub mod spec;
pub mod tensor;

pub use artifact::*;
pub use engine::*;
pub use error::*;
pub use spec::*;
pub use tensor::*;
