pub mod amdfw;
pub mod type_table;

pub use amdfw::AmdfwParser;
