//! 공통 타입.

mod interval;

pub use interval::*;
