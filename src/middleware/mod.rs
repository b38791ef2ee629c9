// Middleware modules
pub mod logging;
pub mod tee;
