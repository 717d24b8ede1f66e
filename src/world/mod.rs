pub mod constants;
pub mod snapshot;
pub mod spatial;
