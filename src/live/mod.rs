pub mod batch;
pub mod priority;
pub mod socket;

pub use batch::{BatchProcessor, MessageBuffer};
pub use priority::priority_subset;
pub use socket::{ConnectionManager, ConnectionState, FeedCommand, FeedHandle};
