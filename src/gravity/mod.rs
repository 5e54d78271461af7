mod multipole;
mod properties;

pub use multipole::*;
pub use properties::GravityConfig;
