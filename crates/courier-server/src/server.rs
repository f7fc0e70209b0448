//! Envelope routing and the NDJSON serve loop.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use courier_core::{CoreError, RequestEnvelope, RequestId, ResponseEnvelope};
use courier_dispatch::Dispatcher;

use crate::catalog::{OperationInfo, catalog};

/// Control verbs the server answers itself, without touching the dispatcher
/// pipeline. Everything else is an operation call.
const VERB_LIST_OPERATIONS: &str = "list_operations";
const VERB_CONFIRM: &str = "confirm";
const VERB_CANCEL: &str = "cancel";
const VERB_PENDING: &str = "pending_confirmations";

/// The control-channel server: one per account session.
pub struct BridgeServer {
    dispatcher: Arc<Dispatcher>,
}

impl BridgeServer {
    /// Wrap a dispatcher.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// The operation catalog.
    #[must_use]
    pub fn operations(&self) -> Vec<OperationInfo> {
        catalog(self.dispatcher.registry())
    }

    /// Route one envelope to its terminal response.
    ///
    /// Control verbs (`list_operations`, `confirm`, `cancel`,
    /// `pending_confirmations`) are answered directly; operation calls go
    /// through the dispatcher pipeline.
    pub async fn handle(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        match envelope.operation.as_str() {
            VERB_LIST_OPERATIONS => {
                let id = envelope.id.unwrap_or_else(RequestId::generate);
                match serde_json::to_value(self.operations()) {
                    Ok(operations) => {
                        ResponseEnvelope::result(id, json!({"operations": operations}))
                    },
                    Err(e) => ResponseEnvelope::error(
                        id,
                        &CoreError::Internal(format!("catalog serialization failed: {e}")),
                    ),
                }
            },
            VERB_CONFIRM => {
                let id = envelope.id.unwrap_or_else(RequestId::generate);
                match confirm_args(&envelope.arguments) {
                    Ok((target, approved)) => {
                        let resolved = self.dispatcher.resolve_confirmation(&target, approved);
                        if !resolved {
                            debug!(target = %target, "confirm verdict found nothing pending");
                        }
                        ResponseEnvelope::result(id, json!({"resolved": resolved}))
                    },
                    Err(err) => ResponseEnvelope::error(id, &err),
                }
            },
            VERB_CANCEL => {
                let id = envelope.id.unwrap_or_else(RequestId::generate);
                match id_arg(&envelope.arguments) {
                    Ok(target) => {
                        let cancelled = self.dispatcher.cancel(&target);
                        ResponseEnvelope::result(id, json!({"cancelled": cancelled}))
                    },
                    Err(err) => ResponseEnvelope::error(id, &err),
                }
            },
            VERB_PENDING => {
                let id = envelope.id.unwrap_or_else(RequestId::generate);
                let pending: Vec<Value> = self
                    .dispatcher
                    .pending_confirmations()
                    .into_iter()
                    .map(|p| {
                        json!({
                            "id": p.id,
                            "operation": p.operation,
                            "requested_at": p.requested_at.to_rfc3339(),
                        })
                    })
                    .collect();
                ResponseEnvelope::result(id, json!({"pending": pending}))
            },
            _ => self.dispatcher.dispatch(envelope).await,
        }
    }

    /// Serve newline-delimited JSON envelopes until EOF.
    ///
    /// Each envelope runs on its own task, so a request parked on
    /// confirmation never blocks the `confirm` verb that will release it.
    /// Responses are funneled through a single writer task; malformed lines
    /// get a validation error envelope with a generated id. Returns once the
    /// reader reaches EOF and every in-flight response has been written.
    ///
    /// # Errors
    ///
    /// Returns an IO error from the reader; writer failures end the loop
    /// silently (the peer is gone).
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<ResponseEnvelope>(64);

        let writer_task = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                let line = match serde_json::to_string(&response) {
                    Ok(mut line) => {
                        line.push('\n');
                        line
                    },
                    Err(e) => {
                        error!(error = %e, "failed to serialize response envelope");
                        continue;
                    },
                };
                if writer.write_all(line.as_bytes()).await.is_err() {
                    warn!("control channel writer closed, dropping remaining responses");
                    break;
                }
                let _ = writer.flush().await;
            }
        });

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<RequestEnvelope>(trimmed) {
                Ok(envelope) => {
                    let server = Arc::clone(&self);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let response = server.handle(envelope).await;
                        let _ = tx.send(response).await;
                    });
                },
                Err(e) => {
                    let err = CoreError::InvalidArguments {
                        reason: format!("malformed request line: {e}"),
                    };
                    let _ = tx
                        .send(ResponseEnvelope::error(RequestId::generate(), &err))
                        .await;
                },
            }
        }

        info!("control channel reached EOF, draining responses");
        drop(tx);
        let _ = writer_task.await;
        Ok(())
    }
}

fn id_arg(arguments: &courier_core::JsonMap) -> Result<RequestId, CoreError> {
    arguments
        .get("id")
        .and_then(Value::as_str)
        .map(RequestId::new)
        .ok_or_else(|| CoreError::InvalidArguments {
            reason: "missing required string argument 'id'".to_string(),
        })
}

fn confirm_args(arguments: &courier_core::JsonMap) -> Result<(RequestId, bool), CoreError> {
    let id = id_arg(arguments)?;
    let approved = arguments
        .get("approved")
        .and_then(Value::as_bool)
        .ok_or_else(|| CoreError::InvalidArguments {
            reason: "missing required boolean argument 'approved'".to_string(),
        })?;
    Ok((id, approved))
}

impl std::fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeServer")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
