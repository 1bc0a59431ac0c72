pub mod indicators;
pub mod setup;


pub use indicators::*;
pub use setup::*;
