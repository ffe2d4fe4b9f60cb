//! Session language configuration and the sources it is resolved from.

pub mod descriptor;
pub mod source;

pub use descriptor::{LanguageTag, SessionConfig, default_voice};
#[cfg(feature = "http")]
pub use source::HttpSessionSource;
pub use source::{FileSessionSource, MetadataSessionSource, SessionSource};
