//! 파이프라인 전반에서 사용하는 공통 타입.

mod interval;
mod window;

pub use interval::*;
pub use window::*;
