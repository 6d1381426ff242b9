pub mod classifier;
pub mod domain;
pub mod protocol;
pub mod traits;
