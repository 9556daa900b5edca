pub mod cluster;
pub mod forecast;

pub use cluster::*;
pub use forecast::*;
