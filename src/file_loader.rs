use std::path::Path;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, debug, warn};
use crate::{
    application::ingestion_service::IngestionService,
    domain::{
        error::IngestionError,
        models::{ExecutionMode, IngestionResult},
        ports::DataParser,
    },
};

/// Options for loading one prepared file into a destination.
#[derive(Debug, Clone)]
pub struct LoadRequest<'a> {
    pub destination: &'a str,
    pub path: &'a Path,
    pub clear_first: bool,
    pub mode: Option<ExecutionMode>,
}

/// Reads a CSV or JSON file and runs its records through the same validation
/// and execution path as the HTTP endpoint.
pub async fn load_file(
    service: &IngestionService,
    parser: &dyn DataParser,
    load: LoadRequest<'_>,
    cancel: &CancellationToken,
) -> Result<IngestionResult, IngestionError> {
    let records = read_records(parser, load.path).await?;
    info!("Loaded {} records from {}", records.len(), load.path.display());

    let mut request = json!({
        "destination": load.destination,
        "records": records,
        "clearFirst": load.clear_first,
    });
    if let Some(mode) = load.mode {
        request["mode"] = serde_json::to_value(mode).map_err(|e| IngestionError::Unexpected(e.to_string()))?;
    }

    service.ingest(request, cancel).await
}

/// Reads the records of a CSV or JSON file.
pub async fn read_records(parser: &dyn DataParser, path: &Path) -> Result<Vec<Value>, IngestionError> {
    let file_type = extract_file_type(path);
    debug!("Detected file type '{}' for {}", file_type, path.display());

    let bytes = tokio::fs::read(path).await?;
    info!("Read {} bytes from {}", bytes.len(), path.display());
    parser.parse(&bytes, &file_type)
}

fn extract_file_type(path: &Path) -> String {
    let file_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    if file_type.is_empty() {
        warn!("No file extension found in path: {}", path.display());
    }

    file_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use crate::domain::registry::DestinationRegistry;
    use crate::infrastructure::{memory::data_repo::InMemoryDataRepository, parser_adapter::ParserAdapter};

    fn write_tmp_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::Builder::new().suffix(suffix).tempfile().expect("create temp file");
        write!(tmp, "{}", contents).expect("write file");
        tmp
    }

    fn service(repo: Arc<InMemoryDataRepository>) -> IngestionService {
        IngestionService::new(Arc::new(DestinationRegistry::builtin()), repo)
    }

    #[tokio::test]
    async fn loads_a_csv_file() {
        let repo = Arc::new(InMemoryDataRepository::new());
        let tmp = write_tmp_file(".csv", "venue,spot,depth\nLoch Leven,North Bay,4\nLoch Leven,,2\n");

        let result = load_file(
            &service(repo.clone()),
            &ParserAdapter::new(),
            LoadRequest { destination: "venue_spots", path: tmp.path(), clear_first: false, mode: None },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.errors, vec!["Row 1: required column 'spot' is null"]);
        assert_eq!(repo.rows("venue_spots")[0]["depth"], json!("4"));
    }

    #[tokio::test]
    async fn loads_a_json_file_with_a_mode_override() {
        let repo = Arc::new(InMemoryDataRepository::new());
        let tmp = write_tmp_file(".JSON", r#"[{"term": "dun"}, {"term": 7}, {"nope": 1}]"#);

        let result = load_file(
            &service(repo.clone()),
            &ParserAdapter::new(),
            LoadRequest { destination: "terminology", path: tmp.path(), clear_first: true, mode: Some(ExecutionMode::Row) },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(result.cleared);
        assert_eq!((result.succeeded, result.failed), (2, 1));
    }

    #[tokio::test]
    async fn unsupported_extensions_are_rejected() {
        let tmp = write_tmp_file(".xlsx", "binary");
        let err = read_records(&ParserAdapter::new(), tmp.path()).await.unwrap_err();
        assert!(matches!(err, IngestionError::Parse(ref m) if m.contains("xlsx")));
    }
}
