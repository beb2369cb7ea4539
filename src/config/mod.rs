pub mod sync;

pub use sync::SyncConfig;
