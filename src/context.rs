use std::sync::Arc;
use std::time::Duration;
use tracing::{info, debug, error};
use crate::{
    application::{ingestion_service::IngestionService, provisioner::AccountProvisioner},
    config::{Config, DatabaseConfig},
    domain::{error::IngestionError, ports::DataRepository, registry::DestinationRegistry},
    infrastructure::{
        dynamodb::data_repo::DynamoDataRepository,
        identity::http_provider::HttpIdentityProvider,
        memory::data_repo::InMemoryDataRepository,
        mongodb::data_repo::MongoDataRepository,
    },
};

/// Everything a request handler needs, built once at startup.
pub struct AppContext {
    pub ingestion: Arc<IngestionService>,
    pub provisioner: Option<Arc<AccountProvisioner>>,
}

impl AppContext {
    pub async fn from_config(config: &Config) -> Result<Self, IngestionError> {
        debug!("Building application context");
        let registry = Arc::new(DestinationRegistry::builtin());
        info!("Ingestion open for: {}", registry.allowed_names().join(", "));

        let data_repo = connect_data_repository(&config.database).await?;
        let ingestion = Arc::new(IngestionService::new(registry, data_repo));

        let provisioner = match &config.identity {
            Some(identity) => {
                info!("Identity provider: {}", identity.base_url);
                let provider = Arc::new(HttpIdentityProvider::new(
                    identity.base_url.clone(),
                    identity.service_key.clone(),
                ));
                let delay = Duration::from_millis(config.provision_delay_ms);
                Some(Arc::new(AccountProvisioner::new(provider, delay)?))
            }
            None => {
                info!("No identity provider configured; account provisioning disabled");
                None
            }
        };

        Ok(Self { ingestion, provisioner })
    }
}

async fn connect_data_repository(database: &DatabaseConfig) -> Result<Arc<dyn DataRepository>, IngestionError> {
    match database {
        DatabaseConfig::Mongodb { uri, database, use_transactions } => {
            info!("Using MongoDB database: {}", database);
            debug!("Connecting to MongoDB");
            let client = mongodb::Client::with_uri_str(uri).await
                .map_err(|e| {
                    error!("Failed to connect to MongoDB: {}", e);
                    IngestionError::Database(e.to_string())
                })?;
            Ok(Arc::new(MongoDataRepository::new(client, database.clone(), *use_transactions)))
        }
        DatabaseConfig::Dynamodb { endpoint_url } => {
            info!("Using DynamoDB");
            let mut aws_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(endpoint_url) = endpoint_url {
                info!("Using custom AWS endpoint: {}", endpoint_url);
                aws_config_builder = aws_config_builder.endpoint_url(endpoint_url);
            }
            let aws_config = aws_config_builder.load().await;
            debug!("AWS region: {:?}", aws_config.region());
            let client = aws_sdk_dynamodb::Client::new(&aws_config);
            Ok(Arc::new(DynamoDataRepository::new(client)))
        }
        DatabaseConfig::Memory => {
            info!("Using in-memory store; nothing will be persisted");
            Ok(Arc::new(InMemoryDataRepository::new()))
        }
    }
}
