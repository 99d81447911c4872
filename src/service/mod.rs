//! Service layer: reconciliation and retention flows built on the
//! storage traits.

pub mod intermediate;
pub mod retention;

pub use intermediate::{ChainObserver, IntermediateTxCoordinator};
pub use retention::RetentionJob;
