//! Handles the realtime WebSocket connection to an Azure OpenAI realtime deployment.

use super::{RealtimeClientEvent, RealtimeSessionSettings};
use crate::{
    audio_utils,
    config::AzureRealtimeConfig,
    ws::events::{RealtimeUpdate, translate},
};
use anyhow::{Context, Result};
use async_openai::types::realtime::{
    self as oai_realtime, ClientEvent as OAIClientEvent, ServerEvent as OAIServerEvent,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

type RealtimeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(super) struct Connection {
    tx: SplitSink<RealtimeSocket, WsMessage>,
    rx: SplitStream<RealtimeSocket>,
}

async fn send_event(
    tx: &mut SplitSink<RealtimeSocket, WsMessage>,
    event: OAIClientEvent,
) -> Result<()> {
    tx.send(WsMessage::Text(serde_json::to_string(&event)?.into()))
        .await?;
    Ok(())
}

fn session_resource(
    config: &AzureRealtimeConfig,
    settings: &RealtimeSessionSettings,
) -> Result<oai_realtime::SessionResource> {
    let voice: oai_realtime::RealtimeVoice =
        serde_json::from_value(serde_json::Value::String(config.voice.clone()))
            .with_context(|| format!("Unsupported voice '{}'", config.voice))?;

    Ok(oai_realtime::SessionResource {
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        instructions: Some(settings.instructions.clone()),
        voice: Some(voice),
        input_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        output_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        input_audio_transcription: Some(oai_realtime::AudioTranscription {
            model: Some("whisper-1".to_string()),
            ..Default::default()
        }),
        turn_detection: Some(oai_realtime::TurnDetection::ServerVAD {
            threshold: 0.5,
            prefix_padding_ms: 200,
            silence_duration_ms: 700,
            interrupt_response: Some(true),
            create_response: Some(true),
        }),
        tools: Some(settings.tools.clone()),
        ..Default::default()
    })
}

/// Opens the connection and sends the initial `session.update`.
pub(super) async fn open(
    config: &AzureRealtimeConfig,
    settings: &RealtimeSessionSettings,
) -> Result<Connection> {
    let url = config.realtime_url();
    let mut request = url.as_str().into_client_request()?;
    request
        .headers_mut()
        .insert("api-key", config.api_key.parse()?);

    let (ws_stream, _) = connect_async(request)
        .await
        .context("Failed to connect to the realtime deployment")?;
    let (mut tx, rx) = ws_stream.split();
    info!(deployment = %config.deployment, "Connected to Azure OpenAI realtime.");

    let event = OAIClientEvent::SessionUpdate(oai_realtime::SessionUpdateEvent {
        session: session_resource(config, settings)?,
        event_id: None,
    });
    send_event(&mut tx, event).await?;

    Ok(Connection { tx, rx })
}

/// Adds a user text turn and asks the model to respond.
async fn send_user_text(tx: &mut SplitSink<RealtimeSocket, WsMessage>, text: String) -> Result<()> {
    let item = oai_realtime::Item {
        r#type: Some(oai_realtime::ItemType::Message),
        role: Some(oai_realtime::ItemRole::User),
        content: Some(vec![oai_realtime::ItemContent {
            r#type: oai_realtime::ItemContentType::InputText,
            text: Some(text),
            audio: None,
            transcript: None,
        }]),
        id: None,
        status: None,
        call_id: None,
        name: None,
        arguments: None,
        output: None,
    };
    create_item_and_respond(tx, item).await
}

async fn send_tool_output(
    tx: &mut SplitSink<RealtimeSocket, WsMessage>,
    call_id: String,
    output: String,
) -> Result<()> {
    let item = oai_realtime::Item {
        r#type: Some(oai_realtime::ItemType::FunctionCallOutput),
        call_id: Some(call_id),
        output: Some(output),
        id: None,
        status: None,
        role: None,
        content: None,
        name: None,
        arguments: None,
    };
    create_item_and_respond(tx, item).await
}

async fn create_item_and_respond(
    tx: &mut SplitSink<RealtimeSocket, WsMessage>,
    item: oai_realtime::Item,
) -> Result<()> {
    let create_event = oai_realtime::ConversationItemCreateEvent {
        item,
        event_id: None,
        previous_item_id: None,
    };
    send_event(tx, OAIClientEvent::ConversationItemCreate(create_event)).await?;

    let response_event = oai_realtime::ResponseCreateEvent {
        response: None,
        event_id: None,
    };
    send_event(tx, OAIClientEvent::ResponseCreate(response_event)).await
}

/// Runs the main loop for the realtime connection.
///
/// Outbound calls arrive on `rx`; inbound events are translated and pushed to
/// `updates`. Returns when either side closes.
pub(super) async fn run(
    connection: Connection,
    mut rx: mpsc::Receiver<RealtimeClientEvent>,
    updates: mpsc::Sender<RealtimeUpdate>,
) -> Result<()> {
    let Connection {
        tx: mut realtime_tx,
        rx: mut realtime_rx,
    } = connection;

    loop {
        tokio::select! {
            biased;
            // Handle events from the session.
            event = rx.recv() => {
                let Some(event) = event else {
                    info!("Session dropped the realtime client; closing connection.");
                    let _ = realtime_tx.close().await;
                    break;
                };
                match event {
                    RealtimeClientEvent::Audio(samples) => {
                        let append_event = oai_realtime::InputAudioBufferAppendEvent {
                            audio: audio_utils::encode_i16(&samples),
                            event_id: None,
                        };
                        send_event(&mut realtime_tx, OAIClientEvent::InputAudioBufferAppend(append_event)).await?;
                    }
                    RealtimeClientEvent::UserText(text) => send_user_text(&mut realtime_tx, text).await?,
                    RealtimeClientEvent::ToolOutput { call_id, output } => {
                        send_tool_output(&mut realtime_tx, call_id, output).await?
                    }
                }
            },
            // Handle events from the realtime server.
            msg_result = realtime_rx.next() => {
                match msg_result {
                    Some(Ok(WsMessage::Text(text))) => {
                        let server_event = match serde_json::from_str::<OAIServerEvent>(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                debug!(error = %e, "Ignoring unrecognised realtime event");
                                continue;
                            }
                        };
                        if let Some(update) = translate(server_event) {
                            if updates.send(update).await.is_err() {
                                warn!("Session is gone; stopping realtime provider.");
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(close_frame))) => {
                        info!(?close_frame, "Realtime connection closed by server.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("Error reading from realtime connection"),
                    None => break,
                }
            },
        }
    }
    Ok(())
}
