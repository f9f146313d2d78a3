pub mod separated;
pub mod settings;
pub mod tracks;

pub use separated::*;
pub use settings::*;
pub use tracks::*;
