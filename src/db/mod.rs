pub mod entities;
pub mod enums;
pub mod repository;
pub mod schema;
pub mod services;

#[cfg(test)]
pub mod memory;
