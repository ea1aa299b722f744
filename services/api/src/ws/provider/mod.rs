//! The realtime client: one connection to the hosted realtime model per session.
//!
//! [`connect`] opens and configures the connection, then spawns a task that
//! pumps events both ways. The session talks to that task through
//! [`RealtimeHandle`] and receives [`RealtimeUpdate`]s on the channel it passed
//! in.

mod azure;

use super::events::RealtimeUpdate;
use crate::{config::AzureRealtimeConfig, handlers::summarize_tools};
use anyhow::{Result, anyhow};
use async_openai::types::realtime::ToolDefinition;
use rmcp::model::Tool;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{error, info};

/// An internal event passed to the active realtime provider task.
#[derive(Debug)]
pub enum RealtimeClientEvent {
    /// Microphone audio at the realtime API's sample rate.
    Audio(Vec<i16>),
    /// A user turn given as text.
    UserText(String),
    /// The return value of a tool call.
    ToolOutput { call_id: String, output: String },
}

/// Everything needed to configure a new realtime session.
#[derive(Debug, Clone)]
pub struct RealtimeSessionSettings {
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
}

/// Converts MCP tool listings into realtime function definitions.
pub fn realtime_tools(tools: Vec<Tool>) -> Result<Vec<ToolDefinition>> {
    Ok(summarize_tools(tools)?
        .into_iter()
        .map(|t| ToolDefinition::Function {
            name: t.name,
            description: t.description,
            parameters: t.parameters,
        })
        .collect())
}

/// A live realtime connection.
pub struct RealtimeHandle {
    tx: mpsc::Sender<RealtimeClientEvent>,
    handle: JoinHandle<()>,
}

impl RealtimeHandle {
    pub(crate) fn from_parts(tx: mpsc::Sender<RealtimeClientEvent>, handle: JoinHandle<()>) -> Self {
        Self { tx, handle }
    }

    /// True until the provider task ends or is aborted.
    pub fn is_connected(&self) -> bool {
        !self.handle.is_finished() && !self.tx.is_closed()
    }

    pub async fn send(&self, event: RealtimeClientEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow!("realtime provider task has stopped"))
    }

    /// Like [`send`](Self::send) but fails instead of waiting when the
    /// provider's queue is full.
    pub fn try_send(&self, event: RealtimeClientEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => anyhow!("realtime provider is backed up"),
            TrySendError::Closed(_) => anyhow!("realtime provider task has stopped"),
        })
    }

    pub fn disconnect(self) {
        self.handle.abort();
    }
}

/// Connects to the realtime deployment and starts the provider task.
///
/// Returns once the connection is open and the session has been configured,
/// so connection failures surface to the caller.
pub async fn connect(
    config: &AzureRealtimeConfig,
    settings: RealtimeSessionSettings,
    updates: mpsc::Sender<RealtimeUpdate>,
) -> Result<RealtimeHandle> {
    let connection = azure::open(config, &settings).await?;
    let (tx, rx) = mpsc::channel(128);

    let handle = tokio::spawn(async move {
        match azure::run(connection, rx, updates.clone()).await {
            Ok(()) => info!("Realtime provider task finished."),
            Err(e) => {
                error!(error = ?e, "Realtime provider task failed");
                let _ = updates
                    .send(RealtimeUpdate::Error(format!("Voice connection failed: {}", e)))
                    .await;
            }
        }
    });

    Ok(RealtimeHandle::from_parts(tx, handle))
}
