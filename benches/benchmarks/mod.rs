pub mod primitives;
pub mod scheduler;
