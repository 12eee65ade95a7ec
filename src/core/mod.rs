// Core modules implementing the plugin record, host-service wrappers, and error modeling.
pub mod error;
pub mod features;
pub mod instance;
pub mod log;
pub mod paths;
pub mod probe;
pub mod sys;
pub mod urid;
pub mod variant;
