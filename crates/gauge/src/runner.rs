//! The language-runner subprocess handle.
//!
//! The host binds an ephemeral callback port, spawns the runner named by
//! the project manifest with that port in its environment, and waits for
//! the runner to dial back. From then on the connection carries
//! length-prefixed [`RunnerMessage`]s in request/response lockstep.

use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use eyre::{Result, WrapErr, bail, eyre};
use gauge_proto::framing::{read_message, write_message};
use gauge_proto::{ProtoHookFailure, ProtoSpec, ProtoSpecResult, RunnerMessage, RunnerPayload};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::{GaugeConfig, INTERNAL_PORT_ENV, PROJECT_ROOT_ENV};
use crate::plugin;

/// How long a freshly spawned runner gets to dial back.
const RUNNER_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
/// Grace period between the kill message and a hard kill.
const RUNNER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A connected runner subprocess.
pub struct Runner {
    child: Child,
    connection: tokio::sync::Mutex<TcpStream>,
    next_id: AtomicI64,
    request_timeout: Duration,
}

impl Runner {
    /// Spawn the project's runner and wait for it to connect back.
    pub async fn start(config: &GaugeConfig) -> Result<Runner> {
        let manifest = plugin::project_manifest(config)?;
        let descriptor = plugin::runner_descriptor(config, &manifest.language)?;
        let install_dir = plugin::runner_install_dir(config, &manifest.language)?;

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .wrap_err("failed to bind runner callback port")?;
        let port = listener.local_addr()?.port();

        info!(
            language = %manifest.language,
            version = %descriptor.version,
            port,
            "starting runner"
        );

        let (program, args) = descriptor
            .command
            .split_first()
            .ok_or_else(|| eyre!("runner descriptor has an empty command"))?;
        let child = Command::new(program)
            .args(args)
            .current_dir(&install_dir)
            .env(INTERNAL_PORT_ENV, port.to_string())
            .env(PROJECT_ROOT_ENV, &config.project_root)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .wrap_err_with(|| format!("failed to spawn runner command '{program}'"))?;

        let (connection, peer) =
            tokio::time::timeout(RUNNER_CONNECTION_TIMEOUT, listener.accept())
                .await
                .map_err(|_| eyre!("runner did not connect within {RUNNER_CONNECTION_TIMEOUT:?}"))?
                .wrap_err("failed to accept runner connection")?;
        debug!(%peer, "runner connected");

        Ok(Runner {
            child,
            connection: tokio::sync::Mutex::new(connection),
            next_id: AtomicI64::new(1),
            request_timeout: config.runner_request_timeout,
        })
    }

    /// Send one request and wait for the runner's answer, bounded by the
    /// given timeout.
    pub async fn request(
        &self,
        payload: RunnerPayload,
        timeout: Duration,
    ) -> Result<RunnerPayload> {
        let message = RunnerMessage {
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            payload,
        };
        let mut connection = self.connection.lock().await;
        write_message(&mut *connection, &message)
            .await
            .wrap_err("failed to write to runner")?;
        let response = tokio::time::timeout(timeout, read_message::<_, RunnerMessage>(&mut *connection))
            .await
            .map_err(|_| eyre!("runner did not answer within {timeout:?}"))?
            .wrap_err("failed to read from runner")?;
        match response {
            Some(Ok(response)) => {
                if response.message_id != message.message_id {
                    warn!(
                        expected = message.message_id,
                        got = response.message_id,
                        "runner answered out of order"
                    );
                }
                Ok(response.payload)
            }
            Some(Err(decode)) => Err(eyre!("undecodable runner response: {decode}")),
            None => bail!("runner closed the connection"),
        }
    }

    /// The step texts the runner has implementations for.
    pub async fn step_names(&self, timeout: Duration) -> Result<Vec<String>> {
        match self.request(RunnerPayload::StepNamesRequest, timeout).await? {
            RunnerPayload::StepNamesResponse { steps } => Ok(steps),
            other => bail!("unexpected runner response to step names request: {other:?}"),
        }
    }

    /// Run one spec to completion inside the runner.
    pub async fn execute_spec(&self, spec: ProtoSpec) -> Result<ProtoSpecResult> {
        // Spec execution is open-ended; the per-request timeout does not
        // apply here, only transport failures end the stream.
        let payload = self
            .request(
                RunnerPayload::ExecuteSpecRequest { spec },
                Duration::from_secs(60 * 60),
            )
            .await?;
        match payload {
            RunnerPayload::SpecExecutionResponse { result } => Ok(result),
            other => bail!("unexpected runner response to execute request: {other:?}"),
        }
    }

    /// Fire the runner's before-suite hooks.
    pub async fn suite_begin(&self) -> Result<Option<ProtoHookFailure>> {
        self.suite_hook(RunnerPayload::SuiteExecutionBeginRequest).await
    }

    /// Fire the runner's after-suite hooks.
    pub async fn suite_end(&self) -> Result<Option<ProtoHookFailure>> {
        self.suite_hook(RunnerPayload::SuiteExecutionEndRequest).await
    }

    async fn suite_hook(&self, request: RunnerPayload) -> Result<Option<ProtoHookFailure>> {
        match self.request(request, self.request_timeout).await? {
            RunnerPayload::SuiteHookResponse { hook_failure } => Ok(hook_failure),
            other => bail!("unexpected runner response to suite hook request: {other:?}"),
        }
    }

    /// Ask the runner to exit, then make sure it does.
    pub async fn kill(mut self) -> Result<()> {
        let kill = RunnerMessage {
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            payload: RunnerPayload::KillProcessRequest,
        };
        {
            let mut connection = self.connection.lock().await;
            // The runner may already be gone; that is what the hard kill
            // below is for.
            let _ = write_message(&mut *connection, &kill).await;
        }
        match tokio::time::timeout(RUNNER_SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(status) => {
                debug!(?status, "runner exited");
                Ok(())
            }
            Err(_) => {
                warn!("runner ignored the kill message, terminating it");
                self.child.kill().await.wrap_err("failed to kill runner")
            }
        }
    }
}
