//! Command implementations.

pub mod checkpoint;
pub mod harvest;
pub mod load;

pub use self::checkpoint::execute_checkpoint;
pub use self::harvest::execute_harvest;
pub use self::load::execute_load;
