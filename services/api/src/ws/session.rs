//! Manages the WebSocket connection lifecycle for an assistant session.
//!
//! A [`Session`] owns everything scoped to one browser connection: the current
//! playback track, the realtime client (if voice mode is on), and the tool
//! server. Browser messages, realtime updates and tool notices are handled one
//! at a time from a single `select!` loop.

use super::{
    events::RealtimeUpdate,
    protocol::{ClientMessage, ServerMessage},
    provider::{self, RealtimeClientEvent, RealtimeHandle, RealtimeSessionSettings},
};
use crate::{
    audio_utils::{self, InputResampler, Pcm16Decoder, REALTIME_API_PCM16_SAMPLE_RATE},
    models::ChatMessage,
    state::AppState,
};
use anyhow::Result;
use async_openai::types::realtime::ToolDefinition;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use deco_core::{
    gate::{self, GateDecision, UserInput, VOICE_COMMAND_NOTICE},
    prompt::{VOICE_GREETING, VOICE_MODE_REQUIRED, WELCOME_MESSAGE},
    tools::{CallbackService, ToolNotice},
    track::TrackId,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use rmcp::{
    ServiceExt,
    model::{CallToolRequestParam, RawContent},
    service::{RoleClient, RunningService},
};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id: u32 = rand::random();
    tracing::Span::current().record("session_id", session_id);
    info!("New WebSocket connection.");

    let (socket_tx, socket_rx) = socket.split();
    let (update_tx, update_rx) = mpsc::channel(128);
    let (notice_tx, notice_rx) = mpsc::channel(8);

    let session = match Session::start(state, socket_tx, update_tx, notice_tx).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = ?e, "Session bootstrap failed.");
            return;
        }
    };
    if let Err(e) = session.run(socket_rx, update_rx, notice_rx).await {
        error!(error = ?e, "Session terminated with error.");
    }
    info!("Session finished.");
}

/// Starts the in-process MCP tool server and connects a client to it.
async fn start_tool_server(
    template_path: PathBuf,
    notice_tx: mpsc::Sender<ToolNotice>,
) -> Result<(RunningService<RoleClient, ()>, JoinHandle<()>)> {
    let service = CallbackService::new(template_path, Some(notice_tx));
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let handle = tokio::spawn(async move {
        if let Ok(service) = service.serve(server_transport).await {
            let _ = service.waiting().await;
        }
    });
    let mcp_client = ().serve(client_transport).await?;
    Ok((mcp_client, handle))
}

pub(crate) struct Session<S> {
    state: Arc<AppState>,
    socket_tx: S,
    track: TrackId,
    instructions: String,
    tools: Vec<ToolDefinition>,
    realtime: Option<RealtimeHandle>,
    resampler: Option<InputResampler>,
    pcm_decoder: Pcm16Decoder,
    update_tx: mpsc::Sender<RealtimeUpdate>,
    mcp_client: RunningService<RoleClient, ()>,
    tool_server: JoinHandle<()>,
}

impl<S> Session<S>
where
    S: Sink<Message> + Unpin,
    S::Error: Into<anyhow::Error>,
{
    /// Chat start: greet the user and prepare everything the realtime client
    /// will need once voice mode is switched on.
    pub(crate) async fn start(
        state: Arc<AppState>,
        mut socket_tx: S,
        update_tx: mpsc::Sender<RealtimeUpdate>,
        notice_tx: mpsc::Sender<ToolNotice>,
    ) -> Result<Self> {
        send_msg(
            &mut socket_tx,
            ServerMessage::Message(ChatMessage::assistant(WELCOME_MESSAGE)),
        )
        .await?;

        let (mcp_client, tool_server) =
            start_tool_server(state.config.callback_template_path.clone(), notice_tx).await?;
        let tools = provider::realtime_tools(mcp_client.list_all_tools().await?)?;
        let instructions = state
            .system_prompt
            .instructions_for(&state.config.customer_id);
        info!(tools = tools.len(), "Session initialized.");

        Ok(Self {
            state,
            socket_tx,
            track: TrackId::new(),
            instructions,
            tools,
            realtime: None,
            resampler: None,
            pcm_decoder: Pcm16Decoder::default(),
            update_tx,
            mcp_client,
            tool_server,
        })
    }

    /// Runs the session until the browser goes away, then tears it down.
    pub(crate) async fn run<R>(
        mut self,
        socket_rx: R,
        update_rx: mpsc::Receiver<RealtimeUpdate>,
        notice_rx: mpsc::Receiver<ToolNotice>,
    ) -> Result<()>
    where
        R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let result = self.event_loop(socket_rx, update_rx, notice_rx).await;

        self.on_end();
        self.tool_server.abort();
        info!("WebSocket connection closed and session terminated.");
        result
    }

    async fn event_loop<R>(
        &mut self,
        mut socket_rx: R,
        mut update_rx: mpsc::Receiver<RealtimeUpdate>,
        mut notice_rx: mpsc::Receiver<ToolNotice>,
    ) -> Result<()>
    where
        R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                // Handle messages from the client WebSocket.
                msg_result = socket_rx.next() => {
                    match msg_result {
                        Some(Ok(ws_msg)) => {
                            if !self.handle_frame(ws_msg).await? {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!("Error receiving from client WebSocket: {:?}", e);
                            break;
                        }
                        None => {
                            info!("Client disconnected.");
                            break;
                        }
                    }
                },
                // Handle events from the realtime client.
                Some(update) = update_rx.recv() => self.apply_update(update).await?,
                // Handle rich messages posted by tools.
                Some(notice) = notice_rx.recv() => self.post(ChatMessage::assistant(notice.content)).await?,
            }
        }
        Ok(())
    }

    /// Returns `false` when the client closed the connection.
    async fn handle_frame(&mut self, ws_msg: Message) -> Result<bool> {
        match ws_msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => self.dispatch(msg).await?,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed client message.");
                    self.send(ServerMessage::Error {
                        message: format!("Malformed message: {}", e),
                    })
                    .await?;
                }
            },
            Message::Binary(data) => self.on_audio_chunk(&data).await?,
            Message::Close(_) => {
                info!("Client sent close frame. Shutting down session.");
                return Ok(false);
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
        Ok(true)
    }

    async fn dispatch(&mut self, msg: ClientMessage) -> Result<()> {
        match msg {
            ClientMessage::UserMessage { content, metadata } => {
                let channel = ClientMessage::input_channel(metadata.as_ref());
                self.on_message(UserInput { channel, content }).await
            }
            ClientMessage::AudioStart { sample_rate } => self.on_audio_start(sample_rate).await,
            ClientMessage::AudioChunk { data } => {
                self.on_audio_chunk(&audio_utils::decode_base64(&data))
                    .await
            }
            ClientMessage::AudioEnd | ClientMessage::Stop => {
                self.on_end();
                Ok(())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.realtime.as_ref().is_some_and(|rt| rt.is_connected())
    }

    // --- UI-side callbacks ---

    async fn on_message(&mut self, input: UserInput) -> Result<()> {
        let track = self.track.regenerate();
        debug!(%track, "New message; switched playback track.");
        self.send(ServerMessage::AudioInterrupt).await?;

        if self.is_connected() {
            self.route_input(input).await
        } else {
            self.post(ChatMessage::system(VOICE_MODE_REQUIRED)).await
        }
    }

    async fn on_audio_start(&mut self, sample_rate: Option<u32>) -> Result<()> {
        let rate = sample_rate.unwrap_or(REALTIME_API_PCM16_SAMPLE_RATE);
        self.pcm_decoder.reset();
        self.resampler = match InputResampler::for_rate(rate) {
            Ok(resampler) => resampler,
            Err(e) => {
                warn!(rate, error = ?e, "Rejected audio sample rate.");
                self.post(ChatMessage::error(format!(
                    "Unsupported audio sample rate {}: {}",
                    rate, e
                )))
                .await?;
                return self.send(ServerMessage::AudioStarted { connected: false }).await;
            }
        };

        if self.is_connected() {
            info!("Realtime client already connected; keeping it.");
            return self.send(ServerMessage::AudioStarted { connected: true }).await;
        }

        let settings = RealtimeSessionSettings {
            instructions: self.instructions.clone(),
            tools: self.tools.clone(),
        };
        match provider::connect(&self.state.config.azure, settings, self.update_tx.clone()).await {
            Ok(realtime) => {
                info!("Connected to OpenAI realtime");
                if let Err(e) = realtime
                    .send(RealtimeClientEvent::UserText(VOICE_GREETING.to_string()))
                    .await
                {
                    warn!(error = ?e, "Failed to send voice greeting.");
                }
                self.realtime = Some(realtime);
                self.send(ServerMessage::AudioStarted { connected: true }).await
            }
            Err(e) => {
                error!(error = ?e, "Failed to connect to OpenAI realtime");
                self.post(ChatMessage::error(format!(
                    "Failed to connect to OpenAI realtime: {}",
                    e
                )))
                .await?;
                self.send(ServerMessage::AudioStarted { connected: false }).await
            }
        }
    }

    async fn on_audio_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(realtime) = self.realtime.as_ref().filter(|rt| rt.is_connected()) else {
            info!("RealtimeClient is not connected");
            return Ok(());
        };

        let mut samples = self.pcm_decoder.decode(bytes);
        if let Some(resampler) = self.resampler.as_mut() {
            samples = resampler.process(&samples);
        }
        if samples.is_empty() {
            return Ok(());
        }
        // Never wait on the provider here: it may itself be waiting on us.
        if let Err(e) = realtime.try_send(RealtimeClientEvent::Audio(samples)) {
            warn!(error = %e, "Dropped audio chunk.");
        }
        Ok(())
    }

    /// Audio end, stop and chat end all close the realtime connection.
    fn on_end(&mut self) {
        self.resampler = None;
        self.pcm_decoder.reset();
        if let Some(realtime) = self.realtime.take() {
            if realtime.is_connected() {
                info!("Disconnecting realtime client.");
            }
            realtime.disconnect();
        }
    }

    // --- Realtime event handlers ---

    async fn apply_update(&mut self, update: RealtimeUpdate) -> Result<()> {
        match update {
            RealtimeUpdate::AudioDelta(data) => {
                self.send(ServerMessage::pcm16_chunk(data, self.track)).await
            }
            RealtimeUpdate::ItemCompleted { transcript } => {
                self.post(ChatMessage::assistant(transcript)).await
            }
            RealtimeUpdate::Interrupted => {
                let track = self.track.regenerate();
                debug!(%track, "User interrupted; switched playback track.");
                self.send(ServerMessage::AudioInterrupt).await
            }
            RealtimeUpdate::InputTranscription { transcript } => {
                if transcript.is_empty() {
                    return Ok(());
                }
                self.post(ChatMessage::voice_transcript(transcript.clone()))
                    .await?;
                self.route_input(UserInput::voice(transcript)).await
            }
            RealtimeUpdate::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                let output = self.call_tool(&name, &arguments).await;
                self.forward(RealtimeClientEvent::ToolOutput { call_id, output })
                    .await;
                Ok(())
            }
            RealtimeUpdate::Error(message) => {
                error!(%message, "Realtime API error");
                Ok(())
            }
        }
    }

    /// Applies the workflow gate and forwards what it lets through.
    async fn route_input(&mut self, input: UserInput) -> Result<()> {
        let decision = gate::evaluate(&input);
        info!(channel = %input.channel, ?decision, "Routing user input.");
        match decision {
            GateDecision::AdvanceWorkflow | GateDecision::GeneralChat => {
                self.forward(RealtimeClientEvent::UserText(input.content))
                    .await;
                Ok(())
            }
            GateDecision::RejectVoiceCommand => {
                self.post(ChatMessage::system(VOICE_COMMAND_NOTICE)).await
            }
            GateDecision::Ignore => {
                debug!("Input is not a command; not forwarding.");
                Ok(())
            }
        }
    }

    async fn forward(&self, event: RealtimeClientEvent) {
        match self.realtime.as_ref().filter(|rt| rt.is_connected()) {
            Some(realtime) => {
                if let Err(e) = realtime.send(event).await {
                    warn!(error = ?e, "Failed to forward to realtime client.");
                }
            }
            None => info!("RealtimeClient is not connected"),
        }
    }

    /// Runs a model-requested tool and returns the text fed back to the model.
    async fn call_tool(&self, name: &str, arguments: &str) -> String {
        info!(tool = %name, "Model requested tool call.");
        let arguments =
            match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(arguments) {
                Ok(arguments) => arguments,
                Err(e) => {
                    warn!(tool = %name, error = %e, "Tool arguments are not a JSON object.");
                    return json!({ "error": format!("Invalid arguments: {}", e) }).to_string();
                }
            };

        let result = self
            .mcp_client
            .peer()
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(arguments),
            })
            .await;

        match result {
            Ok(result) => match result.content.and_then(|mut content| content.pop()) {
                Some(annotated_content) => match annotated_content.raw {
                    RawContent::Text(text_content) => text_content.text,
                    _ => "{\"error\": \"Unexpected content type from tool\"}".to_string(),
                },
                None => "{\"error\": \"Tool call returned no content\"}".to_string(),
            },
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool call failed.");
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }

    async fn post(&mut self, message: ChatMessage) -> Result<()> {
        self.send(ServerMessage::Message(message)).await
    }

    async fn send(&mut self, msg: ServerMessage) -> Result<()> {
        send_msg(&mut self.socket_tx, msg).await
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg<S>(socket_tx: &mut S, msg: ServerMessage) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Into<anyhow::Error>,
{
    let serialized = serde_json::to_string(&msg)?;
    socket_tx
        .send(Message::Text(serialized.into()))
        .await
        .map_err(Into::<anyhow::Error>::into)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AzureRealtimeConfig, Config},
        ws::provider::test_support::fake_deployment,
    };
    use deco_core::{gate::SYSTEM_ORDER_MARKER, prompt::SystemPrompt};
    use futures::{
        FutureExt,
        channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded},
    };
    use serde_json::Value;
    use std::io::Write;
    use tracing::Level;

    type TestSession = Session<UnboundedSender<Message>>;

    struct Harness {
        session: TestSession,
        outbox: UnboundedReceiver<Message>,
        notice_rx: mpsc::Receiver<ToolNotice>,
        _template: tempfile::NamedTempFile,
    }

    /// Nothing listens here, so connecting fails fast.
    const UNREACHABLE_ENDPOINT: &str = "http://127.0.0.1:1";

    fn test_state(template_path: PathBuf, endpoint: &str) -> Arc<AppState> {
        let config = Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            azure: AzureRealtimeConfig {
                api_key: "test-key".to_string(),
                endpoint: endpoint.to_string(),
                deployment: "rt".to_string(),
                api_version: "2024-10-01-preview".to_string(),
                voice: "alloy".to_string(),
            },
            customer_id: "12121".to_string(),
            log_level: Level::INFO,
            prompts_path: PathBuf::from("./prompts"),
            callback_template_path: template_path,
        };
        Arc::new(AppState {
            system_prompt: SystemPrompt::new("You are the Deco Networking Assistant."),
            config: Arc::new(config),
        })
    }

    async fn harness() -> Harness {
        harness_with_endpoint(UNREACHABLE_ENDPOINT).await
    }

    async fn harness_with_endpoint(endpoint: &str) -> Harness {
        let mut template = tempfile::NamedTempFile::new().unwrap();
        template
            .write_all(b"<p>{customer_id}</p><p>{callback_time}</p>")
            .unwrap();

        let (socket_tx, outbox) = unbounded();
        let (update_tx, _update_rx) = mpsc::channel(8);
        let (notice_tx, notice_rx) = mpsc::channel(8);
        let session = Session::start(
            test_state(template.path().to_path_buf(), endpoint),
            socket_tx,
            update_tx,
            notice_tx,
        )
        .await
        .unwrap();

        Harness {
            session,
            outbox,
            notice_rx,
            _template: template,
        }
    }

    /// Plugs a fake realtime connection into the session.
    fn connect_fake(session: &mut TestSession) -> mpsc::Receiver<RealtimeClientEvent> {
        connect_fake_with_capacity(session, 16)
    }

    fn connect_fake_with_capacity(
        session: &mut TestSession,
        capacity: usize,
    ) -> mpsc::Receiver<RealtimeClientEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(std::future::pending::<()>());
        session.realtime = Some(RealtimeHandle::from_parts(tx, handle));
        rx
    }

    fn drain(outbox: &mut UnboundedReceiver<Message>) -> Vec<Value> {
        let mut sent = Vec::new();
        while let Some(Some(Message::Text(text))) = outbox.next().now_or_never() {
            sent.push(serde_json::from_str(text.as_str()).unwrap());
        }
        sent
    }

    fn user_text(event: RealtimeClientEvent) -> String {
        match event {
            RealtimeClientEvent::UserText(text) => text,
            other => panic!("expected UserText, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_greets_and_registers_tools() {
        let mut h = harness().await;
        let sent = drain(&mut h.outbox);

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["type"], "message");
        assert_eq!(sent[0]["content"], WELCOME_MESSAGE);
        assert_eq!(h.session.tools.len(), 1);
        assert!(h.session.instructions.ends_with("Customer ID: 12121"));
        assert!(!h.session.is_connected());
    }

    #[tokio::test]
    async fn test_text_command_is_forwarded_verbatim() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake(&mut h.session);
        drain(&mut h.outbox);
        let track_before = h.session.track;

        h.session
            .on_message(UserInput::text("SYSTEM ORDER I agree"))
            .await
            .unwrap();

        assert_ne!(h.session.track, track_before);
        let sent = drain(&mut h.outbox);
        assert_eq!(sent, vec![json!({"type": "audio_interrupt"})]);
        assert_eq!(
            user_text(realtime_rx.try_recv().unwrap()),
            "SYSTEM ORDER I agree"
        );
    }

    #[tokio::test]
    async fn test_typed_text_without_marker_is_not_forwarded() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake(&mut h.session);
        drain(&mut h.outbox);

        for content in ["I agree", "Where should I place the Deco?"] {
            h.session.on_message(UserInput::text(content)).await.unwrap();
        }

        assert!(realtime_rx.try_recv().is_err());
        let sent = drain(&mut h.outbox);
        assert_eq!(
            sent,
            vec![
                json!({"type": "audio_interrupt"}),
                json!({"type": "audio_interrupt"})
            ]
        );
    }

    #[tokio::test]
    async fn test_voice_tagged_chat_message_cannot_advance() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake(&mut h.session);
        drain(&mut h.outbox);

        let frame = json!({
            "type": "user_message",
            "content": SYSTEM_ORDER_MARKER,
            "metadata": {"type": "audio_transcript", "input_method": "voice"},
        });
        assert!(
            h.session
                .handle_frame(Message::Text(frame.to_string().into()))
                .await
                .unwrap()
        );

        assert!(realtime_rx.try_recv().is_err());
        let sent = drain(&mut h.outbox);
        assert_eq!(sent[0]["type"], "audio_interrupt");
        assert_eq!(sent[1]["content"], VOICE_COMMAND_NOTICE);
    }

    #[tokio::test]
    async fn test_message_without_voice_mode() {
        let mut h = harness().await;
        drain(&mut h.outbox);

        h.session
            .on_message(UserInput::text("SYSTEM ORDER next"))
            .await
            .unwrap();

        let sent = drain(&mut h.outbox);
        assert_eq!(sent[0]["type"], "audio_interrupt");
        assert_eq!(sent[1]["content"], VOICE_MODE_REQUIRED);
    }

    #[tokio::test]
    async fn test_spoken_command_is_rejected() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake(&mut h.session);
        drain(&mut h.outbox);

        h.session
            .apply_update(RealtimeUpdate::InputTranscription {
                transcript: SYSTEM_ORDER_MARKER.to_string(),
            })
            .await
            .unwrap();

        let sent = drain(&mut h.outbox);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["author"], "You");
        assert_eq!(sent[0]["content"], SYSTEM_ORDER_MARKER);
        assert_eq!(sent[0]["metadata"]["input_method"], "voice");
        assert_eq!(sent[1]["content"], VOICE_COMMAND_NOTICE);
        assert!(realtime_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spoken_question_is_forwarded() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake(&mut h.session);

        h.session
            .apply_update(RealtimeUpdate::InputTranscription {
                transcript: "What is PPPoE?".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(user_text(realtime_rx.try_recv().unwrap()), "What is PPPoE?");
    }

    #[tokio::test]
    async fn test_empty_transcription_is_ignored() {
        let mut h = harness().await;
        drain(&mut h.outbox);

        h.session
            .apply_update(RealtimeUpdate::InputTranscription {
                transcript: String::new(),
            })
            .await
            .unwrap();

        assert!(drain(&mut h.outbox).is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_switches_track_for_following_audio() {
        let mut h = harness().await;
        drain(&mut h.outbox);
        let old_track = h.session.track;

        h.session
            .apply_update(RealtimeUpdate::Interrupted)
            .await
            .unwrap();
        h.session
            .apply_update(RealtimeUpdate::AudioDelta("AAEC".to_string()))
            .await
            .unwrap();

        let sent = drain(&mut h.outbox);
        assert_eq!(sent[0]["type"], "audio_interrupt");
        assert_eq!(sent[1]["type"], "audio_chunk");
        assert_eq!(sent[1]["data"], "AAEC");
        assert_eq!(sent[1]["track"], h.session.track.to_string());
        assert_ne!(sent[1]["track"], old_track.to_string());
    }

    #[tokio::test]
    async fn test_completed_item_is_posted() {
        let mut h = harness().await;
        drain(&mut h.outbox);

        h.session
            .apply_update(RealtimeUpdate::ItemCompleted {
                transcript: "Great! Your Wi-Fi settings are ready.".to_string(),
            })
            .await
            .unwrap();

        let sent = drain(&mut h.outbox);
        assert_eq!(sent[0]["kind"], "assistant_message");
        assert_eq!(sent[0]["content"], "Great! Your Wi-Fi settings are ready.");
    }

    #[tokio::test]
    async fn test_tool_call_returns_confirmation_and_posts_details() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake(&mut h.session);

        h.session
            .apply_update(RealtimeUpdate::ToolCall {
                call_id: "call_1".to_string(),
                name: "schedule_callback".to_string(),
                arguments: json!({"customer_id": "12121", "callback_time": "2024-11-02T15:30:00Z"})
                    .to_string(),
            })
            .await
            .unwrap();

        match realtime_rx.try_recv().unwrap() {
            RealtimeClientEvent::ToolOutput { call_id, output } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(
                    output,
                    "Callback scheduled for customer 12121 at 2024-11-02T15:30:00Z. A representative will contact you then."
                );
            }
            other => panic!("expected ToolOutput, got {:?}", other),
        }

        let notice = h.notice_rx.try_recv().unwrap();
        assert!(notice.content.contains("<p>12121</p><p>2024-11-02T15:30:00Z</p>"));
    }

    #[tokio::test]
    async fn test_tool_call_with_bad_arguments_reports_error() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake(&mut h.session);

        h.session
            .apply_update(RealtimeUpdate::ToolCall {
                call_id: "call_2".to_string(),
                name: "schedule_callback".to_string(),
                arguments: "not json".to_string(),
            })
            .await
            .unwrap();

        match realtime_rx.try_recv().unwrap() {
            RealtimeClientEvent::ToolOutput { output, .. } => {
                let output: Value = serde_json::from_str(&output).unwrap();
                assert!(output["error"].as_str().unwrap().starts_with("Invalid arguments"));
            }
            other => panic!("expected ToolOutput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_audio_start_failure_is_reported() {
        let mut h = harness().await;
        drain(&mut h.outbox);

        h.session.on_audio_start(None).await.unwrap();

        let sent = drain(&mut h.outbox);
        assert_eq!(sent[0]["kind"], "error_message");
        assert!(
            sent[0]["content"]
                .as_str()
                .unwrap()
                .starts_with("Failed to connect to OpenAI realtime: ")
        );
        assert_eq!(sent[1], json!({"type": "audio_started", "connected": false}));
        assert!(h.session.realtime.is_none());
    }

    #[tokio::test]
    async fn test_audio_start_connects_and_greets() {
        let mut deployment = fake_deployment(vec![]).await;
        let mut h = harness_with_endpoint(&deployment.endpoint).await;
        drain(&mut h.outbox);

        h.session.on_audio_start(None).await.unwrap();

        let sent = drain(&mut h.outbox);
        assert_eq!(sent, vec![json!({"type": "audio_started", "connected": true})]);
        assert!(h.session.is_connected());
        assert!(h.session.resampler.is_none());

        let session_update = deployment.next_frame().await;
        assert_eq!(session_update["type"], "session.update");
        assert_eq!(
            session_update["session"]["instructions"],
            h.session.instructions.as_str()
        );
        let greeting = deployment.next_frame().await;
        assert_eq!(greeting["type"], "conversation.item.create");
        assert_eq!(greeting["item"]["content"][0]["text"], VOICE_GREETING);
        assert_eq!(deployment.next_frame().await["type"], "response.create");

        // Typed commands now reach the deployment.
        h.session
            .on_message(UserInput::text("SYSTEM ORDER I allow"))
            .await
            .unwrap();
        let command = deployment.next_frame().await;
        assert_eq!(command["item"]["content"][0]["text"], "SYSTEM ORDER I allow");
        assert_eq!(deployment.next_frame().await["type"], "response.create");

        h.session.on_end();
        assert!(!h.session.is_connected());
    }

    #[tokio::test]
    async fn test_audio_start_rejects_absurd_sample_rate() {
        let mut h = harness().await;
        drain(&mut h.outbox);

        h.session.on_audio_start(Some(1)).await.unwrap();

        let sent = drain(&mut h.outbox);
        assert_eq!(sent[0]["kind"], "error_message");
        assert!(
            sent[0]["content"]
                .as_str()
                .unwrap()
                .starts_with("Unsupported audio sample rate 1: ")
        );
        assert_eq!(sent[1], json!({"type": "audio_started", "connected": false}));
        assert!(h.session.realtime.is_none());
    }

    #[tokio::test]
    async fn test_audio_start_keeps_existing_connection() {
        let mut h = harness().await;
        let _realtime_rx = connect_fake(&mut h.session);
        drain(&mut h.outbox);

        h.session.on_audio_start(Some(16000)).await.unwrap();

        let sent = drain(&mut h.outbox);
        assert_eq!(sent, vec![json!({"type": "audio_started", "connected": true})]);
        assert!(h.session.resampler.is_some());
        assert!(h.session.is_connected());
    }

    #[tokio::test]
    async fn test_audio_chunk_forwarded_when_connected() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake(&mut h.session);

        h.session
            .handle_frame(Message::Binary(vec![1u8, 0, 2, 0].into()))
            .await
            .unwrap();

        match realtime_rx.try_recv().unwrap() {
            RealtimeClientEvent::Audio(samples) => assert_eq!(samples, vec![1, 2]),
            other => panic!("expected Audio, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_audio_frames_split_mid_sample() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake(&mut h.session);

        h.session.on_audio_chunk(&[1]).await.unwrap();
        assert!(realtime_rx.try_recv().is_err());
        h.session.on_audio_chunk(&[0, 2, 0, 3]).await.unwrap();
        h.session.on_audio_chunk(&[0]).await.unwrap();

        let mut received = Vec::new();
        while let Ok(RealtimeClientEvent::Audio(samples)) = realtime_rx.try_recv() {
            received.extend(samples);
        }
        assert_eq!(received, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_audio_chunk_does_not_wait_on_backed_up_provider() {
        let mut h = harness().await;
        let mut realtime_rx = connect_fake_with_capacity(&mut h.session, 1);

        let chunks = async {
            for _ in 0..3 {
                h.session.on_audio_chunk(&[1, 0]).await.unwrap();
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(1), chunks)
            .await
            .expect("audio chunks must not block");

        assert!(matches!(
            realtime_rx.try_recv(),
            Ok(RealtimeClientEvent::Audio(_))
        ));
        assert!(realtime_rx.try_recv().is_err());
        assert!(h.session.is_connected());
    }

    #[tokio::test]
    async fn test_audio_chunk_dropped_when_not_connected() {
        let mut h = harness().await;
        drain(&mut h.outbox);

        h.session.on_audio_chunk(&[1, 0, 2, 0]).await.unwrap();

        assert!(drain(&mut h.outbox).is_empty());
    }

    #[tokio::test]
    async fn test_audio_end_disconnects() {
        let mut h = harness().await;
        let _realtime_rx = connect_fake(&mut h.session);
        assert!(h.session.is_connected());

        let frame = json!({"type": "audio_end"}).to_string();
        h.session
            .handle_frame(Message::Text(frame.into()))
            .await
            .unwrap();

        assert!(h.session.realtime.is_none());
        assert!(!h.session.is_connected());
    }

    #[tokio::test]
    async fn test_malformed_frame_reports_error() {
        let mut h = harness().await;
        drain(&mut h.outbox);

        let keep_going = h
            .session
            .handle_frame(Message::Text("{\"type\": \"nope\"}".to_string().into()))
            .await
            .unwrap();

        assert!(keep_going);
        let sent = drain(&mut h.outbox);
        assert_eq!(sent[0]["type"], "error");
    }

    #[tokio::test]
    async fn test_run_ends_on_close_frame() {
        let h = harness().await;
        let (_update_tx, update_rx) = mpsc::channel(1);
        let (_notice_tx, notice_rx) = mpsc::channel(1);
        let socket_rx = futures::stream::iter(vec![Ok::<_, axum::Error>(Message::Close(None))]);

        h.session.run(socket_rx, update_rx, notice_rx).await.unwrap();
    }
}
