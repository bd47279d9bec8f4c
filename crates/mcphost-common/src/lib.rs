pub mod error;
pub mod transcript;

pub use error::{Error, Result};
pub use transcript::{ContentSegment, Role, Transcript, Turn};
