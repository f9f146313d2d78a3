pub mod audio;
pub mod notes;
pub mod separation;
pub mod storage;
pub mod tracks;
pub mod transcription;
pub mod types;

pub use audio::*;
pub use notes::*;
pub use separation::*;
pub use storage::*;
pub use tracks::*;
pub use transcription::*;
pub use types::*;
