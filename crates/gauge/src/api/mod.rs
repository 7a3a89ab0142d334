//! The API service.
//!
//! A persistent TCP endpoint serving IDE/editor integrations: step
//! autocomplete, spec listings, refactoring, formatting. Each connection
//! carries length-prefixed [`ApiMessage`]s; requests on one connection are
//! answered in receive order, connections proceed independently.
//!
//! The service reads from the gatherer, which does its own locking, and
//! otherwise delegates to the refactor/extract/format collaborators.

pub mod info_gatherer;
pub mod watcher;

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use eyre::{Result, WrapErr, eyre};
use gauge_proto::framing::{read_message, write_message};
use gauge_proto::{ApiMessage, ApiPayload};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{API_PORT_ENV, GaugeConfig};
use crate::convert::{to_proto_spec, to_proto_step_value};
use crate::api::info_gatherer::SpecInfoGatherer;
use crate::api::watcher::SpecWatcher;
use crate::runner::Runner;
use crate::{extractor, formatter, plugin, refactor};

/// A running API service.
pub struct ApiHandle {
    /// The port actually bound; differs from the requested one when the
    /// request was port 0.
    pub port: u16,
    /// Closing this ends the service.
    pub kill_tx: watch::Sender<bool>,
    _watcher: Option<SpecWatcher>,
}

struct ApiService {
    config: Arc<GaugeConfig>,
    gatherer: Arc<SpecInfoGatherer>,
    /// Ids for error responses to messages that never decoded; they must
    /// not collide with anything a client would echo.
    next_error_id: AtomicI64,
}

/// Bind the service, publish the port, populate the gatherer, and start
/// accepting connections.
///
/// With `port` 0 an ephemeral free port is bound and advertised through
/// `GAUGE_API_PORT` so plugins spawned later can find the service.
pub async fn start_api_service(
    config: Arc<GaugeConfig>,
    port: u16,
    runner: Option<&Runner>,
) -> Result<ApiHandle> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .wrap_err_with(|| format!("failed to bind API port {port}"))?;
    let bound_port = listener.local_addr()?.port();
    if port == 0 {
        // Safety: the port is published before any worker threads are
        // spawned by this process that could read the environment.
        unsafe { std::env::set_var(API_PORT_ENV, bound_port.to_string()) };
    }
    info!(port = bound_port, "API service listening");

    let gatherer = SpecInfoGatherer::new(config.specs_dir());
    let spec_watcher = gatherer
        .make_list_of_available_steps(runner, config.runner_request_timeout)
        .await;

    let service = Arc::new(ApiService {
        config,
        gatherer,
        next_error_id: AtomicI64::new(-1),
    });
    let (kill_tx, kill_rx) = watch::channel(false);

    tokio::spawn(accept_loop(listener, service, kill_rx));

    Ok(ApiHandle {
        port: bound_port,
        kill_tx,
        _watcher: spec_watcher,
    })
}

async fn accept_loop(
    listener: TcpListener,
    service: Arc<ApiService>,
    mut kill_rx: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            changed = kill_rx.changed() => {
                // A dropped sender counts as a kill.
                if changed.is_err() || *kill_rx.borrow() {
                    info!("API service shutting down");
                    return;
                }
                continue;
            }
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "API connection accepted");
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    if let Err(error) = service.serve_connection(stream).await {
                        warn!(%error, %peer, "API connection ended with error");
                    }
                });
            }
            Err(error) => error!(%error, "failed to accept API connection"),
        }
    }
}

impl ApiService {
    /// Serve one connection until the peer closes it. Messages are
    /// answered strictly in receive order.
    async fn serve_connection(&self, mut stream: TcpStream) -> Result<()> {
        loop {
            let message = match read_message::<_, ApiMessage>(&mut stream).await? {
                None => return Ok(()),
                Some(Ok(message)) => message,
                Some(Err(decode)) => {
                    // The frame arrived but the envelope did not decode, so
                    // there is no id to echo; answer with a fresh one.
                    warn!(%decode, "undecodable API message");
                    let response = ApiMessage {
                        message_id: self.next_error_id.fetch_sub(1, Ordering::Relaxed),
                        payload: ApiPayload::ErrorResponse {
                            error: decode.to_string(),
                        },
                    };
                    write_message(&mut stream, &response).await?;
                    continue;
                }
            };
            debug!(id = message.message_id, "API request received");
            let response = self.dispatch(message).await;
            write_message(&mut stream, &response).await?;
        }
    }

    /// Route a request to its handler. Every arm produces a response
    /// echoing the request id; business failures become error responses.
    async fn dispatch(&self, message: ApiMessage) -> ApiMessage {
        use ApiPayload::*;
        let id = message.message_id;
        let payload = match message.payload {
            GetProjectRootRequest => GetProjectRootResponse {
                project_root: self.config.project_root.to_string_lossy().into_owned(),
            },
            GetInstallationRootRequest => match plugin::installation_prefix(&self.config) {
                Ok(root) => GetInstallationRootResponse {
                    installation_root: root.to_string_lossy().into_owned(),
                },
                Err(error) => error_payload(error),
            },
            GetAllStepsRequest => GetAllStepsResponse {
                steps: self
                    .gatherer
                    .available_steps()
                    .await
                    .iter()
                    .map(to_proto_step_value)
                    .collect(),
            },
            GetAllSpecsRequest => GetAllSpecsResponse {
                specs: self
                    .gatherer
                    .available_specs()
                    .await
                    .iter()
                    .map(to_proto_spec)
                    .collect(),
            },
            GetStepValueRequest {
                step_text,
                has_inline_table,
            } => match gauge_core::extract_step_value_and_params(&step_text, has_inline_table) {
                Ok(step_value) => GetStepValueResponse {
                    step_value: to_proto_step_value(&step_value),
                },
                Err(error) => error_payload(eyre!(error)),
            },
            GetLanguagePluginLibPathRequest { language } => {
                match plugin::language_lib_path(&self.config, &language) {
                    Ok(path) => GetLanguagePluginLibPathResponse {
                        path: path.to_string_lossy().into_owned(),
                    },
                    Err(error) => error_payload(error),
                }
            }
            GetAllConceptsRequest => GetAllConceptsResponse {
                concepts: self.gatherer.concept_infos().await,
            },
            PerformRefactoringRequest { old_step, new_step } => {
                let result = refactor::perform_rephrase_refactoring(
                    &old_step,
                    &new_step,
                    &self.config.specs_dir(),
                );
                if result.success {
                    info!(%old_step, %new_step, "refactoring done");
                } else {
                    warn!(errors = ?result.errors, "refactoring failed");
                }
                PerformRefactoringResponse {
                    success: result.success,
                    errors: result.errors,
                    files_changed: result.files_changed,
                }
            }
            ExtractConceptRequest {
                concept_name,
                concept_file_name,
                spec_file_name,
                begin_line,
                end_line,
            } => match extractor::extract_concept(
                &concept_name,
                concept_file_name.as_ref(),
                spec_file_name.as_ref(),
                begin_line as usize,
                end_line as usize,
            ) {
                Ok(files_changed) => ExtractConceptResponse {
                    success: true,
                    error: None,
                    files_changed,
                },
                Err(error) => ExtractConceptResponse {
                    success: false,
                    error: Some(error.to_string()),
                    files_changed: Vec::new(),
                },
            },
            FormatSpecsRequest { specs } => {
                let files: Vec<std::path::PathBuf> =
                    specs.iter().map(std::path::PathBuf::from).collect();
                let results = formatter::format_spec_files(&files);
                let mut warnings = Vec::new();
                let mut errors = Vec::new();
                for result in results {
                    warnings.extend(result.warnings);
                    if let Some(error) = result.error {
                        errors.push(error);
                    }
                }
                FormatSpecsResponse { warnings, errors }
            }
            // Anything we do not recognise gets the dedicated response, not
            // a protocol error.
            Unknown { message_type, .. } => {
                debug!(message_type, "unsupported API message");
                UnsupportedApiMessageResponse
            }
            // Clients should not send response payloads; treat them like
            // unknown messages.
            other => {
                debug!(message_type = other.message_type(), "unsupported API message");
                UnsupportedApiMessageResponse
            }
        };
        ApiMessage {
            message_id: id,
            payload,
        }
    }
}

fn error_payload(error: eyre::Report) -> ApiPayload {
    ApiPayload::ErrorResponse {
        error: error.to_string(),
    }
}

// ============================================================================
// Daemon mode
// ============================================================================

/// Run the API service as a background daemon until a fatal error.
///
/// The port comes from the argument or `GAUGE_API_PORT`. A supervisor task
/// polls the parent process once per second; when the parent goes away the
/// daemon aborts with an error, which the caller turns into a non-zero
/// exit.
pub async fn run_in_background(config: Arc<GaugeConfig>, port: Option<u16>) -> Result<()> {
    let port = match port.or(config.api_port) {
        Some(port) => port,
        None => eyre::bail!("no API port given and {API_PORT_ENV} is not set"),
    };

    let (error_tx, mut error_rx) = mpsc::channel::<eyre::Report>(1);

    // The daemon keeps a runner alive for step discovery. A project
    // without a working runner still serves every query that does not
    // need implemented steps.
    let runner = match Runner::start(&config).await {
        Ok(runner) => Some(runner),
        Err(error) => {
            warn!(%error, "starting without a runner connection");
            None
        }
    };

    let handle = start_api_service(Arc::clone(&config), port, runner.as_ref()).await?;
    info!(port = handle.port, "gauge daemon ready");

    tokio::spawn(check_parent_is_alive(error_tx));

    let outcome = match error_rx.recv().await {
        Some(error) => Err(error),
        None => Ok(()),
    };
    // Terminating the daemon takes the runner with it.
    if let Some(runner) = runner {
        if let Err(error) = runner.kill().await {
            warn!(%error, "failed to stop runner during shutdown");
        }
    }
    let _ = handle.kill_tx.send(true);
    outcome
}

#[cfg(unix)]
async fn check_parent_is_alive(error_tx: mpsc::Sender<eyre::Report>) {
    let parent = std::os::unix::process::parent_id();
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        // Once the parent dies this process is re-parented, so a changed
        // ppid is the death signal.
        if std::os::unix::process::parent_id() != parent {
            let _ = error_tx
                .send(eyre!("parent process with pid {parent} has terminated"))
                .await;
            return;
        }
    }
}

#[cfg(not(unix))]
async fn check_parent_is_alive(_error_tx: mpsc::Sender<eyre::Report>) {
    // Parent-liveness supervision is only implemented for unix hosts.
    std::future::pending::<()>().await;
}
