pub mod clock;
pub mod error;
pub mod grid;
pub mod ids;
pub mod operation;
pub mod queue;
pub mod resource;

pub use clock::{DraftClock, Timestamp};
pub use error::CoreError;
pub use grid::{AggregationKey, Cell, GridModel, Row, SourceEntry};
pub use ids::*;
pub use operation::{DraftOperation, EntryBody, OpKind, RestCall, RestMethod};
pub use queue::{DraftQueue, SourceTag};
pub use resource::{ResourceKey, TempId};
