pub mod models;
pub mod pool;
pub mod repository;

pub use models::{ChunkRow, ChunkSearchRow, NoteMetaRow, UserStatsRow};
pub use pool::DbPool;
pub use repository::Repository;
