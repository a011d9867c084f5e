pub mod keys;
pub mod midi_export;
pub mod model;

pub use keys::*;
pub use midi_export::*;
pub use model::*;
