//! Entity store (§4.G) and action store (§4.B): persistence, soft delete, status transition
//! guards, and dependency edges, behind a swappable [`StoreBackend`].
pub mod backend;
pub mod memory;

mod facade;

pub use self::backend::StoreBackend;
pub use self::facade::Store;
pub use self::facade::WaitResult;
