//! Assistant Tools
//!
//! Tools the realtime model may call during a session, exposed through the
//! Model Context Protocol (MCP). The web service runs [`CallbackService`] as an
//! in-process MCP server and forwards model-issued function calls to it.

use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Arguments for the `schedule_callback` tool.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone)]
pub struct ScheduleCallbackArgs {
    /// The unique identifier for the customer
    #[schemars(description = "The unique identifier for the customer")]
    pub customer_id: String,
    /// Preferred time for the callback in ISO 8601 format
    #[schemars(description = "Preferred time for the callback in ISO 8601 format")]
    pub callback_time: String,
}

/// A rich message a tool wants shown in the chat, alongside its return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolNotice {
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Substitutes `{customer_id}` and `{callback_time}` in `template`.
///
/// Substitution is literal; any other braces in the template are left as-is.
pub fn render_callback_template(template: &str, args: &ScheduleCallbackArgs) -> String {
    template
        .replace("{customer_id}", &args.customer_id)
        .replace("{callback_time}", &args.callback_time)
}

async fn load_template(path: &Path) -> Result<String, ToolError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ToolError::Template {
            path: path.to_path_buf(),
            source,
        })
}

/// MCP server exposing the assistant's tools.
pub struct CallbackService {
    template_path: PathBuf,
    /// Receives the rendered confirmation for display in the chat.
    notice_tx: Option<mpsc::Sender<ToolNotice>>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for CallbackService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl CallbackService {
    pub fn new(template_path: PathBuf, notice_tx: Option<mpsc::Sender<ToolNotice>>) -> Self {
        Self {
            template_path,
            notice_tx,
            tool_router: Self::tool_router(),
        }
    }

    /// Definitions of every tool this service serves.
    pub fn definitions() -> Vec<Tool> {
        Self::tool_router().list_all()
    }

    /// Schedules a callback with a customer service representative.
    ///
    /// Renders the callback template into the chat and returns a short
    /// confirmation the model can read back to the user.
    #[tool(description = "Schedule a callback with a customer service representative")]
    pub async fn schedule_callback(
        &self,
        args: Parameters<ScheduleCallbackArgs>,
    ) -> Result<String, String> {
        let args = args.0;
        info!(customer_id = %args.customer_id, callback_time = %args.callback_time, "Executing tool 'schedule_callback'");

        let template = load_template(&self.template_path)
            .await
            .map_err(|e| e.to_string())?;
        let html = render_callback_template(&template, &args);

        if let Some(tx) = &self.notice_tx {
            let notice = ToolNotice {
                content: format!(
                    "Your callback has been scheduled. Here are the details:\n{}",
                    html
                ),
            };
            if tx.send(notice).await.is_err() {
                warn!("Failed to post callback confirmation: receiver dropped.");
            }
        }

        Ok(format!(
            "Callback scheduled for customer {} at {}. A representative will contact you then.",
            args.customer_id, args.callback_time
        ))
    }
}
