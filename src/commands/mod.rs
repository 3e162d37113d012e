pub mod devices;
pub mod shell;
