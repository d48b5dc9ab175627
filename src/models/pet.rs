use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{validate_age, validate_pet_name, validate_pet_type, Validate};
use super::{UserId, ValidationError, ValidationResult};

/// Core pet record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub pet_type: String,
    pub age: f64,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request model for creating a pet.
///
/// All fields are optional at the wire level so that a missing field is
/// reported by name instead of as a generic decode failure. Any `owner`
/// supplied by the client is accepted and dropped; the owner always comes from
/// the authenticated caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePetRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub pet_type: Option<String>,
    pub age: Option<f64>,
    #[serde(rename = "owner", default)]
    pub discarded_owner: Option<IgnoredAny>,
}

/// Request model for updating a pet. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePetRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub pet_type: Option<String>,
    pub age: Option<f64>,
    #[serde(rename = "owner", default)]
    pub discarded_owner: Option<IgnoredAny>,
}

/// Request model for looking a pet up by name
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowPetRequest {
    pub name: Option<String>,
}

/// Validated set of field changes for an update. Never carries an owner.
#[derive(Debug, Clone, PartialEq)]
pub struct PetChanges {
    pub name: Option<String>,
    pub pet_type: Option<String>,
    pub age: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// `{"pet": ...}` body used by show, create and update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetEnvelope<T> {
    pub pet: T,
}

/// `{"pets": [...]}` body returned by list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetListResponse {
    pub pets: Vec<Pet>,
}

impl Pet {
    /// Build a new pet owned by `owner`, generating its id and timestamps
    pub fn new(request: CreatePetRequest, owner: UserId) -> ValidationResult<Self> {
        let name = required(request.name, "name")?;
        validate_pet_name(&name)?;

        let pet_type = required(request.pet_type, "type")?;
        validate_pet_type(&pet_type)?;

        let age = request.age.ok_or_else(|| ValidationError::RequiredField {
            field: "age".to_string(),
        })?;
        validate_age(age)?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            pet_type,
            age,
            owner,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether `caller` owns this pet
    pub fn is_owned_by(&self, caller: &UserId) -> bool {
        &self.owner == caller
    }
}

impl PetChanges {
    /// Copy the changes onto a pet. The owner and creation time are never touched.
    pub fn apply_to(&self, pet: &mut Pet) {
        if let Some(ref name) = self.name {
            pet.name = name.clone();
        }
        if let Some(ref pet_type) = self.pet_type {
            pet.pet_type = pet_type.clone();
        }
        if let Some(age) = self.age {
            pet.age = age;
        }
        pet.updated_at = self.updated_at;
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.pet_type.is_none() && self.age.is_none()
    }
}

impl TryFrom<UpdatePetRequest> for PetChanges {
    type Error = ValidationError;

    fn try_from(request: UpdatePetRequest) -> Result<Self, Self::Error> {
        request.validate()?;
        Ok(Self {
            name: request.name,
            pet_type: request.pet_type,
            age: request.age,
            updated_at: Utc::now(),
        })
    }
}

fn required(value: Option<String>, field: &str) -> ValidationResult<String> {
    value.ok_or_else(|| ValidationError::RequiredField {
        field: field.to_string(),
    })
}
