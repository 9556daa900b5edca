pub mod engine;
pub mod features;
pub mod policy;
pub mod weather;

pub use engine::*;
pub use features::*;
pub use policy::*;
pub use weather::*;
