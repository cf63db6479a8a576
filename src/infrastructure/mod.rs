pub mod driver;
pub mod logging;
pub mod simulated;
pub mod store;
