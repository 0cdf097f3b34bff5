//! TimeBase 도메인 모델.

mod capability;
mod point;
mod provider;
mod subscription;

pub use capability::*;
pub use point::*;
pub use provider::*;
pub use subscription::*;
