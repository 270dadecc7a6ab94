//! Command implementations.

pub mod check;
pub mod decode;
pub mod metadata;
pub mod simulate;

pub use check::run_check;
pub use decode::run_decode;
pub use metadata::run_metadata;
pub use simulate::run_simulate;
