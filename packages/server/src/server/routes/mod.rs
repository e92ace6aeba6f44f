pub mod health;
pub mod runs;

pub use health::*;
pub use runs::*;
