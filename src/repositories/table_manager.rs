use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType,
    Projection, ProjectionType, ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::{Client as DynamoDbClient, Error as DynamoDbError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::pet_repository::{NAME_INDEX, OWNER_INDEX};
use crate::models::{RepositoryError, RepositoryResult};

const MAX_ACTIVATION_ATTEMPTS: u32 = 30;
const ACTIVATION_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Manages DynamoDB table creation for local and development environments
pub struct TableManager {
    client: Arc<DynamoDbClient>,
    poll_interval: Duration,
}

impl TableManager {
    pub fn new(client: Arc<DynamoDbClient>) -> Self {
        Self {
            client,
            poll_interval: ACTIVATION_POLL_INTERVAL,
        }
    }

    /// Create the pets table with its owner and name indexes, unless it already exists
    #[instrument(skip(self), fields(table_name = %table_name))]
    pub async fn ensure_pets_table(&self, table_name: &str) -> RepositoryResult<()> {
        if self.table_exists(table_name).await? {
            info!("Table {} already exists", table_name);
            return Ok(());
        }

        info!("Creating pets table");

        let attribute_definitions = vec![
            attribute("id", ScalarAttributeType::S)?,
            attribute("owner", ScalarAttributeType::S)?,
            attribute("name", ScalarAttributeType::S)?,
            attribute("created_at", ScalarAttributeType::S)?,
        ];

        self.client
            .create_table()
            .table_name(table_name)
            .set_attribute_definitions(Some(attribute_definitions))
            .key_schema(key("id", KeyType::Hash)?)
            .global_secondary_indexes(index(OWNER_INDEX, "owner")?)
            .global_secondary_indexes(index(NAME_INDEX, "name")?)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| self.map_dynamodb_error(e.into()))?;

        info!("Table creation initiated, waiting for table to become active");
        self.wait_for_table_active(table_name).await?;
        info!("Pets table created successfully");

        Ok(())
    }

    /// Check if a table exists
    #[instrument(skip(self), fields(table_name = %table_name))]
    pub async fn table_exists(&self, table_name: &str) -> RepositoryResult<bool> {
        match self.client.describe_table().table_name(table_name).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    info!("Table {} does not exist", table_name);
                    Ok(false)
                } else {
                    error!("Error checking table existence: {}", service_error);
                    Err(RepositoryError::ConnectionFailed)
                }
            }
        }
    }

    #[instrument(skip(self), fields(table_name = %table_name))]
    async fn wait_for_table_active(&self, table_name: &str) -> RepositoryResult<()> {
        for _ in 0..MAX_ACTIVATION_ATTEMPTS {
            let response = self
                .client
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|e| self.map_dynamodb_error(e.into()))?;

            match response.table.and_then(|table| table.table_status) {
                Some(TableStatus::Active) => {
                    info!("Table {} is now active", table_name);
                    return Ok(());
                }
                Some(status) => info!("Table {} status: {:?}, waiting...", table_name, status),
                None => warn!("Table {} status unknown, waiting...", table_name),
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        error!("Timeout waiting for table {} to become active", table_name);
        Err(RepositoryError::Timeout)
    }

    fn map_dynamodb_error(&self, error: DynamoDbError) -> RepositoryError {
        error!("DynamoDB error: {:?}", error);
        RepositoryError::AwsSdk {
            message: error.to_string(),
        }
    }
}

fn attribute(name: &str, kind: ScalarAttributeType) -> RepositoryResult<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(kind)
        .build()
        .map_err(|e| RepositoryError::AwsSdk {
            message: format!("Failed to build attribute definition: {}", e),
        })
}

fn key(name: &str, key_type: KeyType) -> RepositoryResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(|e| RepositoryError::AwsSdk {
            message: format!("Failed to build key schema: {}", e),
        })
}

/// Index on `hash_key`, ranged on creation time so the oldest match sorts first
fn index(index_name: &str, hash_key: &str) -> RepositoryResult<GlobalSecondaryIndex> {
    GlobalSecondaryIndex::builder()
        .index_name(index_name)
        .key_schema(key(hash_key, KeyType::Hash)?)
        .key_schema(key("created_at", KeyType::Range)?)
        .projection(
            Projection::builder()
                .projection_type(ProjectionType::All)
                .build(),
        )
        .build()
        .map_err(|e| RepositoryError::AwsSdk {
            message: format!("Failed to build GSI: {}", e),
        })
}
