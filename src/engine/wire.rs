//! Stdio wire protocol between the orchestrator and an out-of-process engine.
//!
//! Every message is one NDJSON line. The engine opens with a single ready
//! line; after that the orchestrator sends requests and the engine answers
//! each one with a response carrying the same `id`.
//!
//! | Method          | Params                | Result                 |
//! |-----------------|-----------------------|------------------------|
//! | `load`          | `{ "payload": path }` | `null`                 |
//! | `import_state`  | `{ "state": [u8] }`   | `null`                 |
//! | `execute_batch` | `{ "batch_size": n }` | `{ "output": text }`   |
//! | `export_state`  | `{}`                  | `{ "state": [u8] }`    |
//! | `shutdown`      | `{}`                  | `null`                 |
//!
//! Failures come back as `{ "id": n, "error": "message" }`. A response whose
//! `id` does not match the outstanding request is skipped.
//!
//! A request whose caller stopped waiting (timeout, cancellation) is
//! *abandoned*: the engine may still be working on it, so its state no
//! longer matches anything the caller observed. A [`RemoteEngine`] with an
//! abandoned request refuses further calls and closes without the
//! `shutdown` exchange.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use super::codec::EngineCodec;
use super::{Engine, EngineBackend, EngineFuture};
use crate::models::batch::BatchResult;
use crate::models::state::StateBlob;
use crate::{AppError, Result};

/// Protocol revision announced in the ready line.
pub const PROTOCOL_VERSION: u32 = 1;

/// How long [`RemoteEngine::shutdown`] waits for the engine's acknowledgement.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Request envelope (orchestrator → engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Correlation identifier, unique per connection.
    pub id: u64,
    /// Operation name.
    pub method: String,
    /// Method-specific parameters.
    #[serde(default)]
    pub params: Value,
}

/// Response envelope (engine → orchestrator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Identifier of the request being answered.
    pub id: u64,
    /// Success value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: u64, message: String) -> Self {
        Self {
            id,
            result: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LoadParams {
    payload: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateParams {
    state: StateBlob,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExecuteParams {
    batch_size: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExecuteOutput {
    output: String,
}

/// Encode `message` as one line and flush it.
async fn send<W, T>(writer: &mut FramedWrite<W, EngineCodec>, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    writer
        .send(message)
        .await
        .map_err(|err| AppError::Protocol(format!("write failed: {}", err.message())))
}

// ── Client side ──────────────────────────────────────────────────────────────

/// [`Engine`] implementation that forwards every call over the wire.
///
/// Generic over the transport so it runs the same over a child's stdio and
/// over an in-memory duplex.
pub struct RemoteEngine<R, W> {
    reader: FramedRead<R, EngineCodec>,
    writer: FramedWrite<W, EngineCodec>,
    next_id: u64,
    pending: Option<u64>,
    released: bool,
}

impl<R, W> RemoteEngine<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Connect with the default message cap. See [`connect_with`](Self::connect_with).
    ///
    /// # Errors
    ///
    /// Same as [`connect_with`](Self::connect_with).
    pub async fn connect(
        reader: R,
        writer: W,
        payload: &Path,
        startup_timeout: Duration,
    ) -> Result<Self> {
        Self::connect_with(reader, writer, EngineCodec::new(), payload, startup_timeout).await
    }

    /// Wait for the engine's ready line, then load `payload` into it.
    ///
    /// `codec` bounds inbound messages, and with them the output of a
    /// single batch.
    ///
    /// # Errors
    ///
    /// - `AppError::Acquisition("startup timeout …")` if no ready line
    ///   arrives within `startup_timeout`.
    /// - `AppError::Acquisition` if the stream closes early or `load` fails.
    pub async fn connect_with(
        reader: R,
        writer: W,
        codec: EngineCodec,
        payload: &Path,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let limit = codec.max_message_bytes();
        let mut engine = Self {
            reader: FramedRead::new(reader, codec),
            writer: FramedWrite::new(writer, EngineCodec::with_limit(limit)),
            next_id: 0,
            pending: None,
            released: false,
        };

        match tokio::time::timeout(startup_timeout, engine.reader.next()).await {
            Ok(Some(Ok(line))) => {
                info!(ready_line = line.trim(), "engine emitted ready signal");
            }
            Ok(Some(Err(err))) => {
                return Err(AppError::Acquisition(format!(
                    "failed to read engine ready signal: {err}"
                )));
            }
            Ok(None) => {
                return Err(AppError::Acquisition(
                    "engine exited before ready signal".into(),
                ));
            }
            Err(_elapsed) => {
                return Err(AppError::Acquisition(format!(
                    "startup timeout: engine did not emit ready signal within {startup_timeout:?}"
                )));
            }
        }

        engine
            .call(
                "load",
                serde_json::to_value(LoadParams {
                    payload: payload.to_path_buf(),
                })?,
            )
            .await
            .map_err(|err| {
                AppError::Acquisition(format!("engine rejected payload: {}", err.message()))
            })?;

        Ok(engine)
    }

    /// Identifier of a request whose caller stopped waiting for it.
    #[must_use]
    pub fn abandoned_request(&self) -> Option<u64> {
        self.pending
    }

    /// Send one request and wait for the matching response.
    ///
    /// If the returned future is dropped before it resolves, or the stream
    /// fails mid-response, the request stays outstanding and every later
    /// call fails.
    ///
    /// # Errors
    ///
    /// - `AppError::Execution` carrying the engine's error message, or when
    ///   an earlier request was abandoned.
    /// - `AppError::Protocol` on write failure, malformed JSON, or EOF.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        if self.released {
            return Err(AppError::Execution("engine already released".into()));
        }
        if let Some(abandoned) = self.pending {
            return Err(AppError::Execution(format!(
                "engine state indeterminate: request {abandoned} was abandoned mid-flight"
            )));
        }

        self.next_id += 1;
        let id = self.next_id;
        let request = Request {
            id,
            method: method.to_owned(),
            params,
        };
        self.pending = Some(id);
        send(&mut self.writer, &request).await?;

        loop {
            let line = match self.reader.next().await {
                Some(Ok(line)) => line,
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(AppError::Protocol(format!(
                        "engine closed its output while awaiting `{method}`"
                    )));
                }
            };

            let response: Response = serde_json::from_str(&line)?;
            if response.id != id {
                debug!(
                    expected = id,
                    received = response.id,
                    "skipping stale engine response"
                );
                continue;
            }
            self.pending = None;

            return match (response.result, response.error) {
                (_, Some(message)) => Err(AppError::Execution(message)),
                (Some(value), None) => Ok(value),
                (None, None) => Ok(Value::Null),
            };
        }
    }

    /// Ask the engine to shut down. Idempotent.
    ///
    /// With an abandoned request outstanding the engine is busy, so the
    /// exchange is skipped and the connection is simply marked closed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the exchange fails or is not
    /// acknowledged within [`SHUTDOWN_GRACE`].
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        if let Some(abandoned) = self.pending {
            self.released = true;
            warn!(
                request = abandoned,
                "engine busy with abandoned request, closing without shutdown"
            );
            return Ok(());
        }

        let outcome = match tokio::time::timeout(SHUTDOWN_GRACE, self.call("shutdown", json!({})))
            .await
        {
            Ok(result) => result.map(|_| ()),
            Err(_elapsed) => Err(AppError::Protocol(format!(
                "engine did not acknowledge shutdown within {SHUTDOWN_GRACE:?}"
            ))),
        };
        self.released = true;
        outcome
    }
}

impl<R, W> Engine for RemoteEngine<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn import_state(&mut self, blob: StateBlob) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            self.call("import_state", serde_json::to_value(StateParams { state: blob })?)
                .await
                .map(|_| ())
        })
    }

    fn execute_batch(&mut self, batch_size: u32) -> EngineFuture<'_, BatchResult> {
        Box::pin(async move {
            let started = Instant::now();
            let value = self
                .call("execute_batch", serde_json::to_value(ExecuteParams { batch_size })?)
                .await?;
            let ExecuteOutput { output } = serde_json::from_value(value)?;
            Ok(BatchResult::new(output, started.elapsed()))
        })
    }

    fn export_state(&mut self) -> EngineFuture<'_, StateBlob> {
        Box::pin(async move {
            let value = self.call("export_state", json!({})).await?;
            let StateParams { state } = serde_json::from_value(value)?;
            Ok(state)
        })
    }

    fn release(&mut self) -> EngineFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}

// ── Server side ──────────────────────────────────────────────────────────────

/// Serve an engine from `backend` with the default message cap.
///
/// # Errors
///
/// Same as [`serve_with`].
pub async fn serve<R, W>(reader: R, writer: W, backend: &dyn EngineBackend) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    serve_with(reader, writer, EngineCodec::new(), backend).await
}

/// Serve an engine from `backend` over a reader/writer pair until `shutdown`
/// or end of input.
///
/// The engine is acquired on `load`; calls before that fail with an error
/// response. Malformed request lines are logged and skipped.
///
/// # Errors
///
/// Returns `AppError::Protocol` if writing a response fails or the input
/// stream yields a codec error.
pub async fn serve_with<R, W>(
    reader: R,
    writer: W,
    codec: EngineCodec,
    backend: &dyn EngineBackend,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let limit = codec.max_message_bytes();
    let mut frames = FramedRead::new(reader, codec);
    let mut writer = FramedWrite::new(writer, EngineCodec::with_limit(limit));

    send(
        &mut writer,
        &json!({ "ready": true, "protocol": PROTOCOL_VERSION, "backend": backend.name() }),
    )
    .await?;

    let mut engine: Option<Box<dyn Engine>> = None;
    let session_id = std::env::var("BATCH_CONDUCTOR_SESSION_ID").unwrap_or_default();

    while let Some(line) = frames.next().await {
        let line = line?;
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "skipping malformed request line");
                continue;
            }
        };

        let is_shutdown = request.method == "shutdown";
        let response = match dispatch(&mut engine, backend, &session_id, &request).await {
            Ok(value) => Response::ok(request.id, value),
            Err(err) => Response::err(request.id, err.message().to_owned()),
        };
        send(&mut writer, &response).await?;

        if is_shutdown {
            break;
        }
    }

    if let Some(mut engine) = engine.take() {
        if let Err(err) = engine.release().await {
            warn!(%err, "engine release failed after input closed");
        }
    }

    Ok(())
}

async fn dispatch(
    engine: &mut Option<Box<dyn Engine>>,
    backend: &dyn EngineBackend,
    session_id: &str,
    request: &Request,
) -> Result<Value> {
    if request.method == "load" {
        let LoadParams { payload } = serde_json::from_value(request.params.clone())?;
        if let Some(mut previous) = engine.take() {
            previous.release().await?;
        }
        *engine = Some(backend.acquire(&payload, session_id).await?);
        return Ok(Value::Null);
    }

    if request.method == "shutdown" {
        if let Some(mut live) = engine.take() {
            live.release().await?;
        }
        return Ok(Value::Null);
    }

    let live = engine
        .as_mut()
        .ok_or_else(|| AppError::Execution("no payload loaded".into()))?;

    match request.method.as_str() {
        "import_state" => {
            let StateParams { state } = serde_json::from_value(request.params.clone())?;
            live.import_state(state).await?;
            Ok(Value::Null)
        }
        "execute_batch" => {
            let ExecuteParams { batch_size } = serde_json::from_value(request.params.clone())?;
            let result = live.execute_batch(batch_size).await?;
            Ok(serde_json::to_value(ExecuteOutput {
                output: result.raw_output,
            })?)
        }
        "export_state" => {
            let state = live.export_state().await?;
            Ok(serde_json::to_value(StateParams { state })?)
        }
        other => Err(AppError::Protocol(format!("unknown method `{other}`"))),
    }
}
