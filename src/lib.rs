pub mod config;
pub mod driver;
pub mod error;
pub mod estimator;
pub mod messages;
pub mod peripherals;
pub mod robot;
pub mod runtime;
pub mod shaper;
pub mod stalk;
pub mod supervisor;
pub mod transforms;
