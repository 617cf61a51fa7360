pub mod converter;
pub mod fallback;
pub mod file_kind;
pub mod layout;
pub mod ocr;
pub mod orchestrator;
pub mod structure;
pub mod summary;
pub mod tabular;
pub mod temp;
pub mod types;

pub use orchestrator::Ingestor;
pub use structure::{Block, StructureTree};
pub use summary::StructureSummary;
pub use types::{ErrorKind, ExtractionMethod, NormalizedDocument};
