#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use pets_rs::auth::TokenVerifier;
use pets_rs::config::ServerConfig;
use pets_rs::models::{Pet, PetChanges, RepositoryError, RepositoryResult, UserId};
use pets_rs::repositories::PetRepository;
use pets_rs::services::PetService;
use pets_rs::{create_app, Metrics};

pub const TEST_SECRET: &str = "integration-test-secret";

/// In-memory pet store with the same conditional-write semantics as the DynamoDB repository
#[derive(Default)]
pub struct InMemoryPetRepository {
    pets: Mutex<HashMap<Uuid, Pet>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryPetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<Pet> {
        self.pets.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.pets.lock().unwrap().len()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Any repository call at all
    pub fn accesses(&self) -> usize {
        self.reads() + self.writes()
    }
}

#[async_trait]
impl PetRepository for InMemoryPetRepository {
    async fn create(&self, pet: Pet) -> RepositoryResult<Pet> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.pets.lock().unwrap().insert(pet.id, pet.clone());
        Ok(pet)
    }

    async fn find_by_owner(&self, owner: &UserId) -> RepositoryResult<Vec<Pet>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut pets: Vec<Pet> = self
            .pets
            .lock()
            .unwrap()
            .values()
            .filter(|pet| &pet.owner == owner)
            .cloned()
            .collect();
        pets.sort_by_key(|pet| pet.created_at);
        Ok(pets)
    }

    async fn find_one_by_name(&self, name: &str) -> RepositoryResult<Option<Pet>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pets
            .lock()
            .unwrap()
            .values()
            .filter(|pet| pet.name == name)
            .min_by_key(|pet| pet.created_at)
            .cloned())
    }

    async fn find_by_id(&self, id: &Uuid) -> RepositoryResult<Option<Pet>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(id))
    }

    async fn update_owned(
        &self,
        id: &Uuid,
        owner: &UserId,
        changes: &PetChanges,
    ) -> RepositoryResult<Pet> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut pets = self.pets.lock().unwrap();
        match pets.get_mut(id) {
            Some(pet) if &pet.owner == owner => {
                changes.apply_to(pet);
                Ok(pet.clone())
            }
            _ => Err(RepositoryError::ConditionFailed),
        }
    }

    async fn delete_owned(&self, id: &Uuid, owner: &UserId) -> RepositoryResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut pets = self.pets.lock().unwrap();
        match pets.get(id) {
            Some(pet) if &pet.owner == owner => {
                pets.remove(id);
                Ok(())
            }
            _ => Err(RepositoryError::ConditionFailed),
        }
    }
}

pub fn test_server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_seconds: 5,
        max_request_size: 64 * 1024,
    }
}

/// Full application router over an in-memory repository
pub struct TestApp {
    pub router: Router,
    pub repository: Arc<InMemoryPetRepository>,
    pub verifier: Arc<TokenVerifier>,
    pub metrics: Arc<Metrics>,
}

impl TestApp {
    pub fn new() -> Self {
        let repository = Arc::new(InMemoryPetRepository::new());
        let verifier = Arc::new(TokenVerifier::new(TEST_SECRET, 0).unwrap());
        let metrics = Arc::new(Metrics::new().unwrap());
        let pet_service = Arc::new(PetService::new(repository.clone()));

        let router = create_app(
            pet_service,
            verifier.clone(),
            metrics.clone(),
            &test_server_config(),
        );

        Self {
            router,
            repository,
            verifier,
            metrics,
        }
    }

    pub fn token(&self, user: &str) -> String {
        self.verifier
            .issue(&UserId::parse(user).unwrap(), chrono::Duration::minutes(10))
            .unwrap()
    }

    /// Send a request and return the status with the decoded JSON body (`Null` when empty)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    /// Create a pet as `user` and return its JSON document
    pub async fn create_pet(&self, user: &str, name: &str, pet_type: &str, age: f64) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/pets",
                Some(&self.token(user)),
                Some(serde_json::json!({
                    "pet": { "name": name, "type": pet_type, "age": age }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        body["pet"].clone()
    }
}
