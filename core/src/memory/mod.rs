pub mod factory;
pub mod file;

pub use factory::create_memory;
pub use file::FileMemory;
