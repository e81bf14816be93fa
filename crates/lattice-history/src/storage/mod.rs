//! Low-level file primitives shared by the log and the partial store

pub mod atomic;
mod scanner;

pub use scanner::{Direction, LineScanner, ScannedLine};
