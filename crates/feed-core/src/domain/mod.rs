//! 도메인 모델.

mod candle;
mod instrument;
mod outcome;

pub use candle::*;
pub use instrument::*;
pub use outcome::*;
