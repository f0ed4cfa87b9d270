pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubRegressor;

#[cfg(feature = "backend-tract")]
pub use tract::TractRegressor;
