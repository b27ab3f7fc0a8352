pub mod screening;
pub mod settings;
pub mod stock;
