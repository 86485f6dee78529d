use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE,
};
use http::{Method, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, debug, error, warn};
use crate::{
    application::{ingestion_service::IngestionService, provisioner::AccountProvisioner, validator},
    context::AppContext,
    domain::{
        error::IngestionError,
        models::ErrorBody,
    },
};

pub type ResponseBody = BoxBody<Bytes, IngestionError>;

/// HTTP entry point: routing, CORS, body limits and status mapping around the
/// ingestion core.
#[derive(Clone)]
pub struct IngestionHttpService {
    ingestion: Arc<IngestionService>,
    provisioner: Option<Arc<AccountProvisioner>>,
    cors_origin: HeaderValue,
    max_body_bytes: usize,
}

impl IngestionHttpService {
    pub fn new(context: AppContext, cors_origin: &str, max_body_bytes: usize) -> Result<Self, IngestionError> {
        let cors_origin = HeaderValue::from_str(cors_origin)
            .map_err(|e| IngestionError::Config(format!("invalid CORS origin '{cors_origin}': {e}")))?;
        Ok(Self {
            ingestion: context.ingestion,
            provisioner: context.provisioner,
            cors_origin,
            max_body_bytes,
        })
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!("Received {} {}", method, path);

        let response = match (&method, path.as_str()) {
            (&Method::OPTIONS, _) => preflight(),
            (&Method::GET, "/health") => json_response(StatusCode::OK, &json!({"status": "ok"})),
            (&Method::POST, "/ingest") => self.ingest(req).await,
            (&Method::POST, "/provision") => self.provision(req).await,
            (_, "/health" | "/ingest" | "/provision") => {
                error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
            }
            _ => error_response(StatusCode::NOT_FOUND, "Not found"),
        };

        info!("{} {} -> {}", method, path, response.status().as_u16());
        self.with_cors(response)
    }

    async fn ingest<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let request = match self.read_json(req).await {
            Ok(request) => request,
            Err(response) => return response,
        };

        // The batch runs in its own task. If the client goes away this handler
        // is dropped, the guard cancels the token, and the task stops at the
        // next record boundary.
        let cancel = CancellationToken::new();
        let _disconnect_guard = cancel.clone().drop_guard();
        let ingestion = self.ingestion.clone();
        let task = tokio::spawn(async move { ingestion.ingest(request, &cancel).await });

        match task.await {
            Ok(Ok(result)) => json_response(StatusCode::OK, &result),
            Ok(Err(e)) => failure_response(e),
            Err(e) => failure_response(IngestionError::Unexpected(format!("ingestion task failed: {e}"))),
        }
    }

    async fn provision<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let Some(provisioner) = self.provisioner.clone() else {
            return failure_response(IngestionError::Config(
                "identity provider not configured".to_string(),
            ));
        };

        let request = match self.read_json(req).await {
            Ok(request) => request,
            Err(response) => return response,
        };
        let entries = match validator::validate_accounts(request) {
            Ok(entries) => entries,
            Err(e) => return failure_response(e.into()),
        };

        let cancel = CancellationToken::new();
        let _disconnect_guard = cancel.clone().drop_guard();
        let task = tokio::spawn(async move { provisioner.provision(&entries, &cancel).await });

        match task.await {
            Ok(result) => json_response(StatusCode::OK, &result),
            Err(e) => failure_response(IngestionError::Unexpected(format!("provisioning task failed: {e}"))),
        }
    }

    async fn read_json<B>(&self, req: Request<B>) -> Result<Value, Response<ResponseBody>>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let bytes = match Limited::new(req.into_body(), self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                warn!("Request body exceeds {} bytes", self.max_body_bytes);
                return Err(error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"));
            }
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                return Err(error_response(StatusCode::BAD_REQUEST, "Failed to read request body"));
            }
        };

        validator::parse_body(&bytes).map_err(|e| failure_response(e.into()))
    }

    fn with_cors(&self, mut response: Response<ResponseBody>) -> Response<ResponseBody> {
        response
            .headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.cors_origin.clone());
        response
    }
}

impl Service<Request<Incoming>> for IngestionHttpService {
    type Response = Response<ResponseBody>;
    type Error = IngestionError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

pub async fn run_http_service(host: &str, port: u16, service: IngestionHttpService) -> Result<(), IngestionError> {
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    info!("Listening on {}:{}", host, port);
    let service = Arc::new(service);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service.clone();

        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                debug!("Connection from {} ended with error: {}", peer_addr, e);
            }
        });
    }
}

fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).map_err(|e| match e {}).boxed()
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    let (status, bytes) = match serde_json::to_vec(value) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"Internal server error"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(full(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response<ResponseBody> {
    json_response(status, &ErrorBody { error: message.into() })
}

fn failure_response(err: IngestionError) -> Response<ResponseBody> {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Request failed: {:?}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    error_response(status, err.public_message())
}

fn preflight() -> Response<ResponseBody> {
    let mut response = Response::new(full(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("authorization, content-type, apikey, x-client-info"),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}
