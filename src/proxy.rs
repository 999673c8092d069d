mod handlers;
mod response;
mod routes;
mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Error;
use crate::registry::RegistryClient;
use crate::repack::{ArchivePipeline, ArchiveRepacker};
use crate::tarball::TarballFetcher;
use crate::upstream::UpstreamClient;

use response::{Failure, respond_text};
use routes::RouteMatch;

pub use types::{Operation, RequestContext};
use types::RequestTrace;

/// Go module proxy serving npm packages.
#[derive(Clone)]
pub struct ModProxy {
    config: Arc<Config>,
    registry: RegistryClient,
    pipeline: ArchivePipeline,
}

impl ModProxy {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream).context("building upstream client")?;
        let registry = RegistryClient::new(upstream.clone());
        let pipeline = ArchivePipeline::new(
            TarballFetcher::new(upstream),
            ArchiveRepacker::new(config.module.base_path.clone()),
            config.storage.staging_dir.clone(),
        );

        Ok(Self {
            config,
            registry,
            pipeline,
        })
    }

    /// Every path goes through [`ModProxy::handle`]; the route table is data,
    /// not axum routes.
    pub fn router(self) -> Router {
        Router::new().fallback(dispatch).with_state(Arc::new(self))
    }

    fn base_path(&self) -> &str {
        &self.config.module.base_path
    }

    async fn handle(&self, trace: &mut RequestTrace) -> Response {
        if trace.method == Method::DELETE {
            return respond_text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
        }
        if trace.method == Method::GET && trace.path == "/up" {
            return respond_text(StatusCode::OK, "ok\n");
        }

        let (operation, context) = match routes::resolve(&trace.path, self.base_path()) {
            RouteMatch::Matched { operation, context } => (operation, context),
            RouteMatch::NotFound => return respond_text(StatusCode::NOT_FOUND, "not found\n"),
            RouteMatch::Invalid(reason) => {
                return Failure {
                    what: "decoding module path",
                    error: Error::InvalidRequest(reason),
                }
                .into_response(self.config.server.expose_errors);
            }
        };
        trace.operation = Some(operation);
        debug!(%operation, %context, "dispatching request");

        let outcome = match operation {
            Operation::List => handlers::list(self, &context).await,
            Operation::Info => handlers::info(self, &context).await,
            Operation::Manifest => handlers::manifest(self, &context).await,
            Operation::Archive => handlers::archive(self, &context).await,
        };
        outcome.unwrap_or_else(|failure| failure.into_response(self.config.server.expose_errors))
    }
}

async fn dispatch(State(proxy): State<Arc<ModProxy>>, method: Method, uri: Uri) -> Response {
    let mut trace = RequestTrace::new(method, uri.path().to_owned());
    let response = proxy.handle(&mut trace).await;

    info!(
        summary = %trace.summary(),
        operation = trace.operation.map(Operation::as_str),
        response_code = response.status().as_u16(),
        duration_ms = trace.start.elapsed().as_millis(),
        "request handled"
    );
    response
}
