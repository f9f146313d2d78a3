pub mod csv_import;
pub mod midi_import;
pub mod model;

pub use csv_import::*;
pub use midi_import::*;
pub use model::*;
