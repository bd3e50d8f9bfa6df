pub mod error;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use sqlite::SqliteKvStore;
pub use traits::{GridPrefs, KeyValueStore, PREFS_KEY, PersistedDraftRow, draft_rows_key};
