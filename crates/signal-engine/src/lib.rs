pub mod evaluator;
pub mod indicators;


pub use evaluator::*;
pub use indicators::*;
