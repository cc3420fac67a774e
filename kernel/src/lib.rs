// Rewind Kernel
//
// Reversible batch writes for revisioned document stores.

pub mod config;
pub mod error;
pub mod invariants;
pub mod log;
pub mod recorder;
pub mod revert;
pub mod store;
pub mod undo;

pub use config::{LeafPolicy, UndoConfig};
pub use error::UndoError;
pub use log::BatchId;
pub use recorder::BatchResult;
pub use revert::RevertResult;
pub use undo::{EnableUndo, UndoStore};
