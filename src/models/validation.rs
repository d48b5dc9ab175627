use serde_json::Value;

use super::{ShowPetRequest, UpdatePetRequest, ValidationError, ValidationResult};

/// Trait for validating input models
pub trait Validate {
    fn validate(&self) -> ValidationResult<()>;
}

/// Validation constants
pub const MAX_PET_NAME_LENGTH: usize = 200;
pub const MAX_PET_TYPE_LENGTH: usize = 100;
pub const MAX_PET_AGE: f64 = 1000.0;
/// Smallest non-zero age. Anything finer cannot be stored as a DynamoDB number.
pub const MIN_NONZERO_PET_AGE: f64 = 1e-6;

impl Validate for UpdatePetRequest {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(name) = &self.name {
            validate_pet_name(name)?;
        }
        if let Some(pet_type) = &self.pet_type {
            validate_pet_type(pet_type)?;
        }
        if let Some(age) = self.age {
            validate_age(age)?;
        }
        Ok(())
    }
}

impl Validate for ShowPetRequest {
    fn validate(&self) -> ValidationResult<()> {
        match &self.name {
            Some(name) => validate_pet_name(name),
            None => Err(ValidationError::RequiredField {
                field: "name".to_string(),
            }),
        }
    }
}

/// Validate pet name
pub fn validate_pet_name(name: &str) -> ValidationResult<()> {
    validate_text(name, "name", MAX_PET_NAME_LENGTH)
}

/// Validate pet type
pub fn validate_pet_type(pet_type: &str) -> ValidationResult<()> {
    validate_text(pet_type, "type", MAX_PET_TYPE_LENGTH)
}

/// Validate pet age
pub fn validate_age(age: f64) -> ValidationResult<()> {
    if !age.is_finite() {
        return Err(ValidationError::InvalidValue {
            field: "age".to_string(),
            value: age.to_string(),
            reason: "Age must be a finite number".to_string(),
        });
    }

    if age < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "age".to_string(),
            value: age.to_string(),
            reason: "Age cannot be negative".to_string(),
        });
    }

    if age > MAX_PET_AGE {
        return Err(ValidationError::InvalidValue {
            field: "age".to_string(),
            value: age.to_string(),
            reason: format!("Age cannot exceed {}", MAX_PET_AGE),
        });
    }

    if age != 0.0 && age < MIN_NONZERO_PET_AGE {
        return Err(ValidationError::InvalidValue {
            field: "age".to_string(),
            value: age.to_string(),
            reason: format!("Non-zero age must be at least {}", MIN_NONZERO_PET_AGE),
        });
    }

    Ok(())
}

fn validate_text(value: &str, field: &str, max_length: usize) -> ValidationResult<()> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::RequiredField {
            field: field.to_string(),
        });
    }

    // The value is stored as given, padding included
    if value.len() > max_length {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max_length,
            actual_length: value.len(),
        });
    }

    if trimmed
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
    {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "Contains invalid control characters".to_string(),
        });
    }

    Ok(())
}

/// Remove empty-string fields from every object nested one level below the
/// body root, e.g. `{"pet": {"name": "", "age": 4}}` becomes `{"pet": {"age": 4}}`.
pub fn strip_blank_fields(body: &mut Value) {
    if let Value::Object(resources) = body {
        for resource in resources.values_mut() {
            if let Value::Object(fields) = resource {
                fields.retain(|_, value| !matches!(value, Value::String(s) if s.is_empty()));
            }
        }
    }
}
