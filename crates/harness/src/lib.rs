pub mod fixture;
pub mod remote;

pub use fixture::TestBench;
pub use remote::{MockRemote, RecordedCall};
