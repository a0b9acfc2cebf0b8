pub mod copy;
pub mod deprecated;
pub mod erasure;
pub mod fetch;
pub mod listing;
pub mod object_storage;
pub mod placement;
pub mod purge;
pub mod read;
pub mod reaper;
pub mod refresh;
pub mod snapshot;
pub mod storage_method;
pub mod upload;
pub mod write;

pub use fetch::{ByteRange, ByteStream, FetchOptions};
pub use object_storage::{Backends, LocateOptions, ObjectStorage, OrchestratorConfig, TrustLevel};
pub use upload::{CreatedObject, ObjectCreate};
pub use write::ObjectSource;
