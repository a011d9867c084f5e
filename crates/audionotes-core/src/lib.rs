pub mod audio_graph;
pub mod audio_params;
pub mod ipc;
pub mod piano_roll;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use audio_graph::*;
pub use audio_params::*;
pub use ipc::*;
pub use piano_roll::*;
pub use scheduler::*;
pub use session::*;
pub use transport::*;
