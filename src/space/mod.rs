mod config;
mod shared;
#[allow(clippy::module_inception)]
mod space;

pub use config::SpaceConfig;
pub use shared::SharedSpace;
pub use space::Space;

#[cfg(test)]
mod space_tests;
