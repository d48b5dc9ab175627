use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use pets_rs::{
    auth::TokenVerifier,
    create_app, init_observability,
    observability::Metrics,
    repositories::{DynamoDbPetRepository, TableManager},
    services::PetService,
    shutdown_observability, Config,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging is not up until the configuration is known
    let config = Config::from_environment().await?;

    init_observability(&config.observability)?;

    info!(
        "Starting {} v{}",
        config.observability.service_name, config.observability.service_version
    );
    info!("Region: {}", config.aws.region);
    info!("DynamoDB table: {}", config.database.pets_table_name);

    let metrics = Arc::new(Metrics::new()?);

    let dynamodb_client = Arc::new(config.aws.dynamodb_client.clone());

    if config.database.auto_create_table {
        TableManager::new(dynamodb_client.clone())
            .ensure_pets_table(&config.database.pets_table_name)
            .await?;
    }

    let repository = Arc::new(DynamoDbPetRepository::new(
        dynamodb_client,
        config.database.pets_table_name.clone(),
        config.database.region.clone(),
    ));
    let pet_service = Arc::new(PetService::new(repository));

    let secret = config.jwt_secret().await?;
    let verifier = Arc::new(TokenVerifier::new(
        &secret,
        config.auth.jwt_leeway_seconds,
    )?);
    info!("Token verifier initialized");

    let app = create_app(pet_service, verifier, metrics, &config.server);

    let listener = TcpListener::bind(config.server.bind_address()).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_observability().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
