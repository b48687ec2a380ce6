pub mod walker;
pub mod loader;
pub mod chunker;
pub mod batch;
pub mod driver;

pub use walker::{list_directories, list_eligible_files};
pub use loader::{DocumentMetadata, Loader, PdfLoader, RawDocument};
pub use chunker::{CharacterSplitter, Chunk, ChunkMetadata, Splitter};
pub use batch::{plan_batches, UpsertBatch};
pub use driver::{
    DirectoryReport, DirectoryState, FileFailure, FileReport, IngestionDriver, RunReport, SkipReason,
};
