pub mod aggregator;
pub mod ingestion_service;
pub mod provisioner;
pub mod validator;
