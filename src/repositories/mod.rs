// Repositories module - data access layer

pub mod pet_repository;
pub mod table_manager;

pub use pet_repository::{DynamoDbPetRepository, PetRepository};
pub use table_manager::TableManager;
