pub mod aggregator;
pub mod analysis_params;
pub mod app;
pub mod count_in;
pub mod diagnostics;
pub mod ipc;
pub mod pipeline;
pub mod recording_window;
pub mod status;
pub mod stream_engine;
pub mod transport;

pub use aggregator::*;
pub use analysis_params::*;
pub use app::*;
pub use count_in::*;
pub use diagnostics::*;
pub use ipc::*;
pub use pipeline::*;
pub use recording_window::*;
pub use status::*;
pub use stream_engine::*;
pub use transport::*;
