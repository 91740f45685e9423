//! Answer post-processing: structural validation, source linking, and
//! hallucination detection.

mod hallucination;
mod linker;
mod validator;

pub use hallucination::HallucinationDetector;
pub use linker::{LinkedSources, link_sources};
pub use validator::ResponseValidator;
