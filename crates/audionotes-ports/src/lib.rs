pub mod accompaniment;
pub mod audio;
pub mod playback;
pub mod storage;
pub mod synth;
pub mod transcription;
pub mod types;
pub mod voice;

pub use accompaniment::*;
pub use audio::*;
pub use playback::*;
pub use storage::*;
pub use synth::*;
pub use transcription::*;
pub use types::*;
pub use voice::*;
