pub mod matcher;
pub mod swing;

pub use matcher::*;
pub use swing::*;
