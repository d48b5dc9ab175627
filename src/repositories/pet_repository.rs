use async_trait::async_trait;
use aws_sdk_dynamodb::operation::RequestId;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::{Client as DynamoDbClient, Error as DynamoDbError};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, Instrument};
use uuid::Uuid;

use crate::models::{Pet, PetChanges, RepositoryError, RepositoryResult, UserId};

/// Global secondary index keyed on `owner`, ranged on `created_at`
pub const OWNER_INDEX: &str = "OwnerIndex";

/// Global secondary index keyed on `name`, ranged on `created_at`
pub const NAME_INDEX: &str = "NameIndex";

/// Trait defining the interface for pet data access operations
#[async_trait]
pub trait PetRepository: Send + Sync {
    /// Persist a new pet
    async fn create(&self, pet: Pet) -> RepositoryResult<Pet>;

    /// Find every pet owned by `owner`
    async fn find_by_owner(&self, owner: &UserId) -> RepositoryResult<Vec<Pet>>;

    /// Find the earliest-created pet with the given name
    async fn find_one_by_name(&self, name: &str) -> RepositoryResult<Option<Pet>>;

    /// Find a pet by its ID
    async fn find_by_id(&self, id: &Uuid) -> RepositoryResult<Option<Pet>>;

    /// Apply `changes` to the pet only if it still exists and belongs to `owner`.
    /// Returns `RepositoryError::ConditionFailed` otherwise.
    async fn update_owned(
        &self,
        id: &Uuid,
        owner: &UserId,
        changes: &PetChanges,
    ) -> RepositoryResult<Pet>;

    /// Delete the pet only if it still exists and belongs to `owner`.
    /// Returns `RepositoryError::ConditionFailed` otherwise.
    async fn delete_owned(&self, id: &Uuid, owner: &UserId) -> RepositoryResult<()>;
}

/// DynamoDB implementation of the PetRepository trait
pub struct DynamoDbPetRepository {
    client: Arc<DynamoDbClient>,
    table_name: String,
    owner_index: String,
    name_index: String,
    region: String,
}

impl DynamoDbPetRepository {
    /// Create a new DynamoDB pet repository
    pub fn new(client: Arc<DynamoDbClient>, table_name: String, region: String) -> Self {
        Self {
            client,
            table_name,
            owner_index: OWNER_INDEX.to_string(),
            name_index: NAME_INDEX.to_string(),
            region,
        }
    }

    /// Create a DynamoDB client span carrying the database semantic attributes
    fn create_dynamodb_span(&self, operation: &str) -> tracing::Span {
        tracing::info_span!(
            "DynamoDB",
            "aws.service" = "DynamoDB",
            "aws.operation" = operation,
            "aws.region" = %self.region,
            "aws.dynamodb.table_name" = %self.table_name,
            "aws.request_id" = tracing::field::Empty,

            "otel.kind" = "client",
            "otel.name" = format!("DynamoDB.{}", operation),

            "rpc.system" = "aws-api",
            "rpc.service" = "AmazonDynamoDBv2",
            "rpc.method" = operation,

            "db.system" = "dynamodb",
            "db.name" = %self.table_name,
            "db.operation" = operation,
        )
    }

    /// Get the table name (for testing)
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Convert a Pet struct to DynamoDB attribute values
    pub fn pet_to_item(&self, pet: &Pet) -> HashMap<String, AttributeValue> {
        let mut item = HashMap::new();

        item.insert("id".to_string(), AttributeValue::S(pet.id.to_string()));
        item.insert("name".to_string(), AttributeValue::S(pet.name.clone()));
        item.insert(
            "pet_type".to_string(),
            AttributeValue::S(pet.pet_type.clone()),
        );
        item.insert("age".to_string(), AttributeValue::N(pet.age.to_string()));
        item.insert(
            "owner".to_string(),
            AttributeValue::S(pet.owner.to_string()),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(format_timestamp(&pet.created_at)),
        );
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S(format_timestamp(&pet.updated_at)),
        );

        item
    }

    /// Convert DynamoDB item to Pet struct
    pub fn item_to_pet(&self, item: HashMap<String, AttributeValue>) -> RepositoryResult<Pet> {
        let id = item
            .get("id")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| RepositoryError::InvalidItem {
                message: "Invalid id".to_string(),
            })?;

        let name = item
            .get("name")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| RepositoryError::InvalidItem {
                message: "Missing name".to_string(),
            })?
            .clone();

        let pet_type = item
            .get("pet_type")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| RepositoryError::InvalidItem {
                message: "Missing pet_type".to_string(),
            })?
            .clone();

        let age = item
            .get("age")
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| RepositoryError::InvalidItem {
                message: "Invalid age".to_string(),
            })?;

        let owner = item
            .get("owner")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| UserId::parse(s).ok())
            .ok_or_else(|| RepositoryError::InvalidItem {
                message: "Invalid owner".to_string(),
            })?;

        let created_at = item
            .get("created_at")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| parse_timestamp(s))
            .ok_or_else(|| RepositoryError::InvalidItem {
                message: "Invalid created_at".to_string(),
            })?;

        // Items written before updated_at was tracked fall back to created_at
        let updated_at = item
            .get("updated_at")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| parse_timestamp(s))
            .unwrap_or(created_at);

        Ok(Pet {
            id,
            name,
            pet_type,
            age,
            owner,
            created_at,
            updated_at,
        })
    }

    /// Convert a page of items, failing on the first one that does not parse
    fn items_to_pets(
        &self,
        items: Vec<HashMap<String, AttributeValue>>,
    ) -> RepositoryResult<Vec<Pet>> {
        items
            .into_iter()
            .map(|item| {
                self.item_to_pet(item).map_err(|e| {
                    error!("Failed to parse pet item: {}", e);
                    e
                })
            })
            .collect()
    }

    /// Convert DynamoDB error to RepositoryError
    fn map_dynamodb_error(&self, error: DynamoDbError) -> RepositoryError {
        match error {
            DynamoDbError::ConditionalCheckFailedException(_) => RepositoryError::ConditionFailed,
            DynamoDbError::ResourceNotFoundException(_) => {
                error!("DynamoDB table not found: {}", self.table_name);
                RepositoryError::TableNotFound {
                    table_name: self.table_name.clone(),
                }
            }
            DynamoDbError::ProvisionedThroughputExceededException(_)
            | DynamoDbError::RequestLimitExceeded(_) => RepositoryError::RateLimitExceeded,
            other => {
                error!("DynamoDB error: {:?}", other);
                RepositoryError::AwsSdk {
                    message: other.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl PetRepository for DynamoDbPetRepository {
    #[instrument(skip(self, pet), fields(table = %self.table_name, id = %pet.id))]
    async fn create(&self, pet: Pet) -> RepositoryResult<Pet> {
        info!("Creating new pet");

        let item = self.pet_to_item(&pet);
        let put_span = self.create_dynamodb_span("PutItem");

        async {
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .condition_expression("attribute_not_exists(id)")
                .send()
                .await
                .map_err(|e| self.map_dynamodb_error(e.into()))
        }
        .instrument(put_span)
        .await?;

        info!("Pet created successfully");
        Ok(pet)
    }

    #[instrument(skip(self), fields(table = %self.table_name, owner = %owner))]
    async fn find_by_owner(&self, owner: &UserId) -> RepositoryResult<Vec<Pet>> {
        info!("Finding pets by owner using GSI");

        let query_span = self.create_dynamodb_span("Query");

        let items = async {
            let mut items = Vec::new();
            let mut exclusive_start_key = None;

            loop {
                let response = self
                    .client
                    .query()
                    .table_name(&self.table_name)
                    .index_name(&self.owner_index)
                    .key_condition_expression("#owner = :owner")
                    .expression_attribute_names("#owner", "owner")
                    .expression_attribute_values(
                        ":owner",
                        AttributeValue::S(owner.to_string()),
                    )
                    .set_exclusive_start_key(exclusive_start_key.take())
                    .send()
                    .await
                    .map_err(|e| self.map_dynamodb_error(e.into()))?;

                if let Some(request_id) = response.request_id() {
                    tracing::Span::current().record("aws.request_id", request_id);
                }

                items.extend(response.items.unwrap_or_default());

                match response.last_evaluated_key {
                    Some(key) if !key.is_empty() => exclusive_start_key = Some(key),
                    _ => break,
                }
            }

            Ok::<_, RepositoryError>(items)
        }
        .instrument(query_span)
        .await?;

        let pets = self.items_to_pets(items)?;
        info!("Found {} pets for owner", pets.len());
        Ok(pets)
    }

    #[instrument(skip(self), fields(table = %self.table_name, name = %name))]
    async fn find_one_by_name(&self, name: &str) -> RepositoryResult<Option<Pet>> {
        info!("Finding pet by name using GSI");

        let query_span = self.create_dynamodb_span("Query");

        let response = async {
            self.client
                .query()
                .table_name(&self.table_name)
                .index_name(&self.name_index)
                .key_condition_expression("#name = :name")
                .expression_attribute_names("#name", "name")
                .expression_attribute_values(":name", AttributeValue::S(name.to_string()))
                .scan_index_forward(true)
                .limit(1)
                .send()
                .await
                .map_err(|e| self.map_dynamodb_error(e.into()))
        }
        .instrument(query_span)
        .await?;

        match response.items.and_then(|items| items.into_iter().next()) {
            Some(item) => {
                let pet = self.item_to_pet(item)?;
                info!("Pet found");
                Ok(Some(pet))
            }
            None => {
                info!("Pet not found");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(table = %self.table_name, id = %id))]
    async fn find_by_id(&self, id: &Uuid) -> RepositoryResult<Option<Pet>> {
        info!("Finding pet by ID");

        let get_span = self.create_dynamodb_span("GetItem");

        let response = async {
            let result = self
                .client
                .get_item()
                .table_name(&self.table_name)
                .key("id", AttributeValue::S(id.to_string()))
                .consistent_read(true)
                .send()
                .await;

            match &result {
                Ok(output) => {
                    if let Some(request_id) = output.request_id() {
                        tracing::Span::current().record("aws.request_id", request_id);
                    }
                }
                Err(e) => {
                    error!("DynamoDB GetItem failed: {}", e);
                }
            }

            result.map_err(|e| self.map_dynamodb_error(e.into()))
        }
        .instrument(get_span)
        .await?;

        match response.item {
            Some(item) => {
                let pet = self.item_to_pet(item)?;
                info!("Pet found");
                Ok(Some(pet))
            }
            None => {
                info!("Pet not found");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, changes), fields(table = %self.table_name, id = %id, owner = %owner))]
    async fn update_owned(
        &self,
        id: &Uuid,
        owner: &UserId,
        changes: &PetChanges,
    ) -> RepositoryResult<Pet> {
        info!("Updating pet");

        let mut assignments = vec!["updated_at = :updated_at".to_string()];
        let mut values = HashMap::from([
            (
                ":updated_at".to_string(),
                AttributeValue::S(format_timestamp(&changes.updated_at)),
            ),
            (":owner".to_string(), AttributeValue::S(owner.to_string())),
        ]);
        let mut names = HashMap::from([("#owner".to_string(), "owner".to_string())]);

        if let Some(ref name) = changes.name {
            assignments.push("#name = :name".to_string());
            names.insert("#name".to_string(), "name".to_string());
            values.insert(":name".to_string(), AttributeValue::S(name.clone()));
        }
        if let Some(ref pet_type) = changes.pet_type {
            assignments.push("pet_type = :pet_type".to_string());
            values.insert(":pet_type".to_string(), AttributeValue::S(pet_type.clone()));
        }
        if let Some(age) = changes.age {
            assignments.push("age = :age".to_string());
            values.insert(":age".to_string(), AttributeValue::N(age.to_string()));
        }

        let update_span = self.create_dynamodb_span("UpdateItem");

        let response = async {
            self.client
                .update_item()
                .table_name(&self.table_name)
                .key("id", AttributeValue::S(id.to_string()))
                .update_expression(format!("SET {}", assignments.join(", ")))
                .condition_expression("attribute_exists(id) AND #owner = :owner")
                .set_expression_attribute_names(Some(names))
                .set_expression_attribute_values(Some(values))
                .return_values(ReturnValue::AllNew)
                .send()
                .await
                .map_err(|e| self.map_dynamodb_error(e.into()))
        }
        .instrument(update_span)
        .await?;

        let item = response.attributes.ok_or(RepositoryError::NotFound)?;
        let pet = self.item_to_pet(item)?;

        info!("Pet updated successfully");
        Ok(pet)
    }

    #[instrument(skip(self), fields(table = %self.table_name, id = %id, owner = %owner))]
    async fn delete_owned(&self, id: &Uuid, owner: &UserId) -> RepositoryResult<()> {
        info!("Deleting pet");

        let delete_span = self.create_dynamodb_span("DeleteItem");

        async {
            self.client
                .delete_item()
                .table_name(&self.table_name)
                .key("id", AttributeValue::S(id.to_string()))
                .condition_expression("attribute_exists(id) AND #owner = :owner")
                .expression_attribute_names("#owner", "owner")
                .expression_attribute_values(":owner", AttributeValue::S(owner.to_string()))
                .send()
                .await
                .map_err(|e| self.map_dynamodb_error(e.into()))?;

            info!("Pet deleted successfully");
            Ok(())
        }
        .instrument(delete_span)
        .await
    }
}

/// Fixed-width RFC 3339 so that index range keys sort chronologically
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreatePetRequest;

    fn create_test_repository() -> DynamoDbPetRepository {
        let config = aws_sdk_dynamodb::Config::builder()
            .region(aws_sdk_dynamodb::config::Region::new("us-east-1"))
            .behavior_version(aws_sdk_dynamodb::config::BehaviorVersion::latest())
            .build();
        let client = Arc::new(aws_sdk_dynamodb::Client::from_conf(config));
        DynamoDbPetRepository::new(client, "test-pets".to_string(), "us-east-1".to_string())
    }

    fn create_test_pet() -> Pet {
        let request = CreatePetRequest {
            name: Some("Rex".to_string()),
            pet_type: Some("dog".to_string()),
            age: Some(3.0),
            discarded_owner: None,
        };
        Pet::new(request, UserId::parse("user-a").unwrap()).unwrap()
    }

    #[test]
    fn test_pet_to_item_conversion() {
        let repo = create_test_repository();
        let pet = create_test_pet();

        let item = repo.pet_to_item(&pet);

        for key in [
            "id",
            "name",
            "pet_type",
            "age",
            "owner",
            "created_at",
            "updated_at",
        ] {
            assert!(item.contains_key(key), "missing {}", key);
        }

        if let Some(AttributeValue::N(age)) = item.get("age") {
            assert_eq!(age, "3");
        } else {
            panic!("Expected number value for age");
        }

        if let Some(AttributeValue::S(owner)) = item.get("owner") {
            assert_eq!(owner, "user-a");
        } else {
            panic!("Expected string value for owner");
        }
    }

    #[test]
    fn test_item_to_pet_conversion() {
        let repo = create_test_repository();
        let mut pet = create_test_pet();
        pet.age = 2.5;

        let item = repo.pet_to_item(&pet);
        let converted = repo.item_to_pet(item).unwrap();

        assert_eq!(converted.id, pet.id);
        assert_eq!(converted.name, pet.name);
        assert_eq!(converted.pet_type, pet.pet_type);
        assert_eq!(converted.age, 2.5);
        assert_eq!(converted.owner, pet.owner);
        assert_eq!(converted.created_at, pet.created_at);
    }

    #[test]
    fn test_item_to_pet_missing_updated_at() {
        let repo = create_test_repository();
        let pet = create_test_pet();

        let mut item = repo.pet_to_item(&pet);
        item.remove("updated_at");

        let converted = repo.item_to_pet(item).unwrap();
        assert_eq!(converted.updated_at, converted.created_at);
    }

    #[test]
    fn test_item_to_pet_rejects_malformed_items() {
        let repo = create_test_repository();
        let pet = create_test_pet();

        let mut item = repo.pet_to_item(&pet);
        item.insert("age".to_string(), AttributeValue::S("three".to_string()));
        assert!(matches!(
            repo.item_to_pet(item),
            Err(RepositoryError::InvalidItem { .. })
        ));

        let mut item = repo.pet_to_item(&pet);
        item.remove("owner");
        assert!(repo.item_to_pet(item).is_err());
    }

    #[test]
    fn test_items_to_pets_fails_on_any_malformed_item() {
        let repo = create_test_repository();
        let good = repo.pet_to_item(&create_test_pet());
        let mut bad = repo.pet_to_item(&create_test_pet());
        bad.remove("name");

        let pets = repo.items_to_pets(vec![good.clone(), good.clone()]).unwrap();
        assert_eq!(pets.len(), 2);

        assert!(matches!(
            repo.items_to_pets(vec![good.clone(), bad, good]),
            Err(RepositoryError::InvalidItem { .. })
        ));
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let later = parse_timestamp("2024-01-01T00:00:00.5Z").unwrap();

        assert!(format_timestamp(&earlier) < format_timestamp(&later));
        assert_eq!(format_timestamp(&earlier).len(), format_timestamp(&later).len());
    }

    #[test]
    fn test_repository_creation() {
        let repo = create_test_repository();

        assert_eq!(repo.table_name(), "test-pets");
        assert_eq!(repo.owner_index, OWNER_INDEX);
        assert_eq!(repo.name_index, NAME_INDEX);
    }
}
