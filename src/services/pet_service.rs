use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{
    CreatePetRequest, Pet, PetChanges, RepositoryError, ServiceError, ServiceResult,
    ShowPetRequest, UpdatePetRequest, UserId, Validate,
};
use crate::repositories::PetRepository;

/// Service for managing pets on behalf of an authenticated caller
pub struct PetService {
    repository: Arc<dyn PetRepository>,
}

impl PetService {
    pub fn new(repository: Arc<dyn PetRepository>) -> Self {
        Self { repository }
    }

    /// List every pet owned by the caller
    #[instrument(skip(self), fields(caller = %caller))]
    pub async fn list_pets(&self, caller: &UserId) -> ServiceResult<Vec<Pet>> {
        crate::info_with_trace!("Listing pets for caller");

        let pets = self.repository.find_by_owner(caller).await?;

        crate::info_with_trace!("Found {} pets", pets.len());
        Ok(pets)
    }

    /// Look a pet up by name. Any authenticated caller may see any pet this way.
    #[instrument(skip(self, request))]
    pub async fn show_pet(&self, request: ShowPetRequest) -> ServiceResult<Pet> {
        request.validate()?;
        let name = request.name.unwrap_or_default();

        crate::info_with_trace!(name = %name, "Looking up pet by name");

        self.repository
            .find_one_by_name(&name)
            .await?
            .ok_or(ServiceError::PetNameNotFound { name })
    }

    /// Create a pet owned by the caller. Any owner in the request is ignored.
    #[instrument(skip(self, request), fields(caller = %caller))]
    pub async fn create_pet(
        &self,
        caller: &UserId,
        request: CreatePetRequest,
    ) -> ServiceResult<Pet> {
        let pet = Pet::new(request, caller.clone())?;

        crate::info_with_trace!(id = %pet.id, "Creating pet");

        let created = self.repository.create(pet).await?;

        crate::info_with_trace!(id = %created.id, "Pet created successfully");
        Ok(created)
    }

    /// Update a pet the caller owns.
    ///
    /// Ownership is checked against the stored record before any write is
    /// issued, and the write itself is conditioned on the same owner so a
    /// record removed in between is reported as not found.
    #[instrument(skip(self, request), fields(caller = %caller, id = %id))]
    pub async fn update_pet(
        &self,
        caller: &UserId,
        id: &str,
        request: UpdatePetRequest,
    ) -> ServiceResult<Pet> {
        let pet_id = parse_pet_id(id)?;
        let changes = PetChanges::try_from(request)?;

        let current = self.load_owned(caller, &pet_id).await?;

        if changes.is_empty() {
            crate::info_with_trace!("Update carries no field changes, refreshing timestamp only");
        }

        match self
            .repository
            .update_owned(&current.id, caller, &changes)
            .await
        {
            Ok(updated) => {
                crate::info_with_trace!("Pet updated successfully");
                Ok(updated)
            }
            Err(RepositoryError::ConditionFailed) => {
                crate::warn_with_trace!("Pet disappeared before the update was applied");
                Err(ServiceError::PetNotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a pet the caller owns
    #[instrument(skip(self), fields(caller = %caller, id = %id))]
    pub async fn delete_pet(&self, caller: &UserId, id: &str) -> ServiceResult<()> {
        let pet_id = parse_pet_id(id)?;

        let current = self.load_owned(caller, &pet_id).await?;

        match self.repository.delete_owned(&current.id, caller).await {
            Ok(()) => {
                crate::info_with_trace!("Pet deleted successfully");
                Ok(())
            }
            Err(RepositoryError::ConditionFailed) => {
                crate::warn_with_trace!("Pet disappeared before the delete was applied");
                Err(ServiceError::PetNotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load a pet and verify the caller owns it, without mutating anything
    async fn load_owned(&self, caller: &UserId, id: &Uuid) -> ServiceResult<Pet> {
        let pet = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::PetNotFound { id: id.to_string() })?;

        if !pet.is_owned_by(caller) {
            crate::warn_with_trace!(owner = %pet.owner, "Caller does not own pet");
            return Err(ServiceError::Forbidden {
                pet_id: id.to_string(),
                caller: caller.to_string(),
            });
        }

        Ok(pet)
    }
}

/// Pet ids are UUIDs; anything else cannot name a stored pet
fn parse_pet_id(id: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|_| ServiceError::PetNotFound { id: id.to_string() })
}
