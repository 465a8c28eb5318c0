//! Per-call protocol bridge.
//!
//! A [`ProtocolBridge`] owns one call's [`CallState`] and the send halves of
//! its telephony and backend connections. The synchronous `handle_*`
//! methods apply one inbound frame each; [`ProtocolBridge::run`] drives them
//! from three channels in a single `select!` loop, so every mutation of the
//! call state happens on one task.
//!
//! # Turn-taking
//!
//! The first agent audio chunk of a response captures the latest telephony
//! timestamp. When the backend reports new caller speech while that
//! timestamp is set, the bridge clears carrier playback and truncates the
//! agent item at the elapsed time the caller actually heard.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::connection::ConnectionHandle;
use super::error::{BridgeError, BridgeResult};
use crate::core::audio::{
    build_dtmf_sequence, decode_base64, expand_ulaw_to_pcm16k, pcm16_to_le_bytes,
};
use crate::core::call::{
    ActiveCall, AgentCommand, CallEvent, CallState, CallStatus, CallTracker, CallType,
    ConversationMessage, LogSide, Role, TranscriptTag, detect_command,
};
use crate::core::realtime::openai::{InputAudioTranscription, SessionConfig, TurnDetection};
use crate::core::realtime::{
    BackendEvent, ClientEvent, OpenAIRealtimeVoice, RealtimeConfig, ServerEvent,
};
use crate::core::telephony::{StartPayload, TelephonyCommand, TelephonyMessage};

/// Tone length for agent-initiated key presses.
pub const DEFAULT_TONE_MS: u32 = 250;
/// Gap after each tone for agent-initiated key presses.
pub const DEFAULT_PAUSE_MS: u32 = 100;

// =============================================================================
// Settings and commands
// =============================================================================

/// Static settings shared by every bridge a server creates.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub realtime: RealtimeConfig,
    /// The backend must report `session.updated` within this window.
    pub session_ready_timeout: Duration,
    /// Maximum gap between telephony frames.
    pub idle_timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            realtime: RealtimeConfig::default(),
            session_ready_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Out-of-band instruction delivered to a running bridge.
#[derive(Debug)]
pub enum BridgeCommand {
    InjectContext {
        text: String,
        history_summary: Option<String>,
    },
    AddMessage {
        role: Role,
        text: String,
        respond: bool,
    },
    SendDtmf {
        digits: String,
        tone_ms: u32,
        pause_ms: u32,
    },
    Hold {
        reply: oneshot::Sender<BridgeResult<CallStatus>>,
    },
    Resume {
        reply: oneshot::Sender<BridgeResult<CallStatus>>,
    },
    Hangup,
}

/// Whether the reactor keeps running after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    End(CallStatus),
}

/// Final state reported when a bridge stops.
#[derive(Debug, Clone)]
pub struct BridgeOutcome {
    pub call_sid: Option<String>,
    pub stream_sid: Option<String>,
    pub status: CallStatus,
    pub transcript: Vec<ConversationMessage>,
}

#[derive(Debug, Default)]
struct LatencyProbe {
    speech_stopped_at: Option<Instant>,
    response_created_at: Option<Instant>,
}

// =============================================================================
// ProtocolBridge
// =============================================================================

pub struct ProtocolBridge {
    state: CallState,
    settings: BridgeSettings,
    telephony: ConnectionHandle<TelephonyCommand>,
    backend: ConnectionHandle<ClientEvent>,
    tracker: Arc<CallTracker>,

    session_configured: bool,
    session_ready: bool,
    on_hold: bool,
    response_in_progress: bool,
    end_after_response: bool,

    call_started: Option<oneshot::Sender<String>>,
    latency: LatencyProbe,
}

impl ProtocolBridge {
    pub fn new(
        state: CallState,
        settings: BridgeSettings,
        telephony: ConnectionHandle<TelephonyCommand>,
        backend: ConnectionHandle<ClientEvent>,
        tracker: Arc<CallTracker>,
    ) -> Self {
        Self {
            state,
            settings,
            telephony,
            backend,
            tracker,
            session_configured: false,
            session_ready: false,
            on_hold: false,
            response_in_progress: false,
            end_after_response: false,
            call_started: None,
            latency: LatencyProbe::default(),
        }
    }

    /// Receive the call sid once the telephony `start` frame arrives.
    pub fn notify_call_started(&mut self, notify: oneshot::Sender<String>) {
        self.call_started = Some(notify);
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    pub fn is_session_ready(&self) -> bool {
        self.session_ready
    }

    pub fn is_on_hold(&self) -> bool {
        self.on_hold
    }

    /// The `session.update` payload for this call.
    ///
    /// Per-call voice and instructions override the server defaults.
    pub fn session_config(&self) -> SessionConfig {
        let realtime = &self.settings.realtime;
        let options = &self.state.options;
        let voice = options
            .voice
            .as_deref()
            .and_then(OpenAIRealtimeVoice::parse)
            .unwrap_or(realtime.voice);

        SessionConfig {
            modalities: Some(
                realtime
                    .modalities
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
            ),
            instructions: Some(options.combined_instructions(&realtime.instructions)),
            voice: Some(voice.as_str().to_string()),
            input_audio_format: Some(realtime.input_audio_format.as_str().to_string()),
            output_audio_format: Some(realtime.output_audio_format.as_str().to_string()),
            input_audio_transcription: realtime
                .transcription_model
                .clone()
                .map(|model| InputAudioTranscription { model }),
            turn_detection: Some(TurnDetection::from(&realtime.turn_detection)),
            temperature: Some(realtime.temperature),
        }
    }

    // ---- telephony side --------------------------------------------------

    pub fn handle_telephony_message(&mut self, message: TelephonyMessage) -> Flow {
        if !matches!(message, TelephonyMessage::Media { .. }) {
            self.state.log_event(
                LogSide::Telephony,
                message.event_name(),
                telephony_snapshot(&message),
            );
        }

        match message {
            TelephonyMessage::Connected { protocol } => {
                debug!(protocol = ?protocol, "Telephony stream connected");
            }
            TelephonyMessage::Start { start } => self.handle_start(start),
            TelephonyMessage::Media { media } => {
                self.forward_caller_audio(media.payload, media.timestamp)
            }
            TelephonyMessage::Mark { mark } => return self.handle_mark(&mark.name),
            TelephonyMessage::Dtmf { dtmf } => {
                info!(call_sid = ?self.state.call_sid, digit = %dtmf.digit, "Caller pressed key");
                self.publish(CallEvent::tagged(
                    self.call_sid(),
                    Role::User,
                    TranscriptTag::Dtmf,
                    format!("Caller pressed {}", dtmf.digit),
                ));
            }
            TelephonyMessage::Stop => {
                info!(call_sid = ?self.state.call_sid, "Telephony stream stopped");
                return Flow::End(CallStatus::Completed);
            }
        }
        Flow::Continue
    }

    fn handle_start(&mut self, start: StartPayload) {
        start.apply_to(&mut self.state.options);
        if let Some(direction) = start.direction() {
            self.state.call_type = CallType::from_str_or_default(direction);
        }
        self.state.stream_sid = Some(start.stream_sid.clone());
        self.state.call_sid = Some(start.call_sid.clone());
        self.state.response_start_timestamp = None;
        self.state.last_assistant_item = None;

        info!(
            call_sid = %start.call_sid,
            stream_sid = %start.stream_sid,
            "Telephony stream started"
        );

        let mut call = ActiveCall::new(&start.call_sid, self.state.call_type);
        call.stream_sid = Some(start.stream_sid.clone());
        call.from_number = self.state.options.from_number.clone();
        call.to_number = self.state.options.to_number.clone();
        if !self.tracker.begin_call(call) {
            warn!(call_sid = %start.call_sid, "Call already tracked");
        }
        self.apply_status(CallStatus::InProgress);

        self.publish(CallEvent::SessionStart {
            call_sid: start.call_sid.clone(),
            stream_sid: start.stream_sid.clone(),
            timestamp: time::OffsetDateTime::now_utc(),
        });

        if !self.session_configured {
            let session = self.session_config();
            self.backend.try_send(ClientEvent::SessionUpdate { session });
            self.session_configured = true;
        }
        if self.session_ready {
            self.apply_status(CallStatus::Active);
        }

        if let Some(notify) = self.call_started.take() {
            let _ = notify.send(start.call_sid);
        }
    }

    fn forward_caller_audio(&mut self, payload: String, timestamp: u64) {
        self.state.observe_media_timestamp(timestamp);

        if self.state.stream_sid.is_none() {
            debug!("Media frame before start, dropping");
            return;
        }
        if self.on_hold {
            return;
        }

        let event = if self.settings.realtime.input_audio_format.needs_transcoding() {
            match decode_base64(&payload) {
                Ok(ulaw) => {
                    ClientEvent::audio_append(&pcm16_to_le_bytes(&expand_ulaw_to_pcm16k(&ulaw)))
                }
                Err(e) => {
                    debug!(error = %e, "Skipping media frame with invalid payload");
                    return;
                }
            }
        } else {
            ClientEvent::InputAudioBufferAppend { audio: payload }
        };
        self.backend.try_send(event);
    }

    fn handle_mark(&mut self, name: &str) -> Flow {
        let drained = self.state.acknowledge_mark(name);
        debug!(mark = %name, drained, pending = self.state.mark_queue().len(), "Mark acknowledged");

        // Everything sent has been played; the utterance is no longer in flight.
        if drained > 0
            && self.state.mark_queue().is_empty()
            && !self.state.speaking
            && !self.response_in_progress
        {
            self.state.reset_response();
        }

        if self.ready_to_hang_up() {
            info!(call_sid = ?self.state.call_sid, "Agent requested hang-up");
            return Flow::End(CallStatus::Completed);
        }
        Flow::Continue
    }

    // ---- backend side ----------------------------------------------------

    pub fn handle_backend_event(&mut self, event: BackendEvent) -> Flow {
        match event {
            BackendEvent::Server(event) => self.handle_server_event(event),
            BackendEvent::Closed { reason } => {
                info!(call_sid = ?self.state.call_sid, reason = ?reason, "Backend session closed");
                self.state
                    .log_event(LogSide::Backend, "closed", json!({ "reason": reason }));
                Flow::End(CallStatus::Completed)
            }
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) -> Flow {
        if !matches!(event, ServerEvent::AudioDelta { .. } | ServerEvent::Unknown) {
            let snapshot = serde_json::to_value(&event).unwrap_or(Value::Null);
            self.state
                .log_event(LogSide::Backend, event.event_type(), snapshot);
        }

        match event {
            ServerEvent::SessionCreated { session } => {
                debug!(session_id = %session.id, model = %session.model, "Backend session created");
            }
            ServerEvent::SessionUpdated { .. } => self.on_session_ready(),
            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                debug!(audio_start_ms, "Caller speech started");
                self.handle_speech_started();
            }
            ServerEvent::SpeechStopped { .. } => {
                self.latency.speech_stopped_at = Some(Instant::now());
            }
            ServerEvent::TranscriptionDelta { delta, .. } => {
                self.publish(CallEvent::transcript(self.call_sid(), Role::User, delta, true));
            }
            ServerEvent::TranscriptionCompleted { transcript, .. } => {
                self.record_final(Role::User, transcript);
            }
            ServerEvent::ResponseCreated { response } => {
                debug!(response_id = %response.id, "Response created");
                self.response_in_progress = true;
                self.latency.response_created_at = Some(Instant::now());
            }
            ServerEvent::AudioDelta { item_id, delta, .. } => {
                self.forward_agent_audio(item_id, delta);
            }
            ServerEvent::AudioDone { item_id } => {
                debug!(item_id = ?item_id, "Agent audio done");
            }
            ServerEvent::AudioTranscriptDelta { delta, .. } => {
                self.publish(CallEvent::transcript(
                    self.call_sid(),
                    Role::Assistant,
                    delta,
                    true,
                ));
            }
            ServerEvent::AudioTranscriptDone { transcript, .. } => {
                self.handle_agent_transcript(transcript);
            }
            ServerEvent::ResponseDone { response } => {
                self.response_in_progress = false;
                if let Some(created) = self.latency.response_created_at.take() {
                    info!(
                        call_sid = ?self.state.call_sid,
                        response_id = %response.id,
                        status = %response.status,
                        response_ms = created.elapsed().as_millis() as u64,
                        "Response complete"
                    );
                }
                if self.ready_to_hang_up() {
                    info!(call_sid = ?self.state.call_sid, "Agent requested hang-up");
                    return Flow::End(CallStatus::Completed);
                }
            }
            ServerEvent::Error { error } => {
                warn!(
                    call_sid = ?self.state.call_sid,
                    code = ?error.code,
                    message = %error.message,
                    "Backend reported an error"
                );
                self.publish(CallEvent::system(
                    self.call_sid(),
                    TranscriptTag::BackendError,
                    error.message,
                ));
            }
            ServerEvent::Unknown => {}
        }
        Flow::Continue
    }

    fn on_session_ready(&mut self) {
        if self.session_ready {
            debug!("Repeated session.updated ignored");
            return;
        }
        self.session_ready = true;
        info!(call_sid = ?self.state.call_sid, "Backend session ready");
        if self.state.call_sid.is_some() {
            self.apply_status(CallStatus::Active);
        }
    }

    fn forward_agent_audio(&mut self, item_id: String, delta: String) {
        let Some(stream_sid) = self.state.stream_sid.clone() else {
            debug!("Agent audio before start, dropping");
            return;
        };
        if self.on_hold {
            debug!("Agent audio while on hold, dropping");
            return;
        }

        if self.state.begin_response()
            && let Some(stopped) = self.latency.speech_stopped_at.take()
        {
            info!(
                call_sid = ?self.state.call_sid,
                first_audio_ms = stopped.elapsed().as_millis() as u64,
                "First agent audio"
            );
        }
        self.state.last_assistant_item = Some(item_id);
        self.state.speaking = true;

        self.telephony
            .try_send(TelephonyCommand::media(&stream_sid, delta));
        self.send_mark(&stream_sid);
    }

    fn handle_agent_transcript(&mut self, transcript: String) {
        self.record_final(Role::Assistant, transcript.clone());
        self.state.speaking = false;
        if let Some(stream_sid) = self.state.stream_sid.clone() {
            self.send_mark(&stream_sid);
        }
        if let Some(command) = detect_command(&transcript) {
            self.execute_command(command);
        }
    }

    fn execute_command(&mut self, command: AgentCommand) {
        info!(
            call_sid = ?self.state.call_sid,
            command = command.name(),
            value = ?command.value(),
            "Agent command"
        );
        self.publish(CallEvent::command(
            self.call_sid(),
            command.name(),
            command.value().map(str::to_string),
        ));
        match command {
            AgentCommand::Press(digits) => {
                self.play_dtmf(&digits, DEFAULT_TONE_MS, DEFAULT_PAUSE_MS);
            }
            // Carrier call control acts on the published event.
            AgentCommand::Transfer(_) => {}
            AgentCommand::EndCall => self.end_after_response = true,
        }
    }

    fn ready_to_hang_up(&self) -> bool {
        self.end_after_response && !self.response_in_progress && self.state.mark_queue().is_empty()
    }

    // ---- interruption ----------------------------------------------------

    /// React to new caller speech. Interrupts only if an utterance is in flight.
    pub fn handle_speech_started(&mut self) -> bool {
        if self.state.response_start_timestamp.is_none() {
            return false;
        }
        self.interrupt()
    }

    /// Cut the in-flight agent utterance short.
    ///
    /// Returns false when nothing was in flight.
    pub fn interrupt(&mut self) -> bool {
        let Some(elapsed) = self.state.reset_response() else {
            return false;
        };
        info!(call_sid = ?self.state.call_sid, elapsed_ms = elapsed, "Caller interrupted agent");
        self.publish(CallEvent::system(
            self.call_sid(),
            TranscriptTag::Interruption,
            "Caller interrupted the agent",
        ));
        self.flush_playback(elapsed);
        true
    }

    /// Reset turn state, then flush playback.
    fn cut_playback(&mut self) -> Option<u64> {
        let elapsed = self.state.reset_response()?;
        self.flush_playback(elapsed);
        Some(elapsed)
    }

    /// Clear carrier playback and truncate the agent item at `elapsed` ms.
    fn flush_playback(&mut self, elapsed: u64) {
        let item = self.state.last_assistant_item.take();

        if let Some(stream_sid) = self.state.stream_sid.clone() {
            self.telephony.try_send(TelephonyCommand::clear(stream_sid));
        }
        if let Some(item_id) = item {
            self.backend
                .try_send(ClientEvent::truncate(item_id, elapsed));
        }
    }

    // ---- operator actions ------------------------------------------------

    /// Add operator context as a system message and ask for a new response.
    pub fn inject_context(&mut self, text: &str, history_summary: Option<&str>) -> bool {
        let mut content = format!("Operator update: {text}");
        if let Some(summary) = history_summary.filter(|s| !s.trim().is_empty()) {
            content.push_str("\n\nConversation so far:\n");
            content.push_str(summary);
        }

        let sent = self
            .backend
            .try_send(ClientEvent::message(Role::System.as_str(), content.clone()))
            && self.backend.try_send(ClientEvent::response_create());

        info!(call_sid = ?self.state.call_sid, sent, "Context injected");
        self.append_transcript(ConversationMessage::new(Role::System, content));
        self.publish(CallEvent::system(
            self.call_sid(),
            TranscriptTag::ContextInjected,
            text,
        ));
        sent
    }

    /// Seed a conversation item, optionally followed by `response.create`.
    pub fn add_message(&mut self, role: Role, text: String, respond: bool) -> bool {
        if !self
            .backend
            .try_send(ClientEvent::message(role.as_str(), text.clone()))
        {
            return false;
        }
        self.record_final(role, text);
        !respond || self.backend.try_send(ClientEvent::response_create())
    }

    /// Play a dial string to the caller. Returns the number of chunks queued.
    pub fn play_dtmf(&mut self, digits: &str, tone_ms: u32, pause_ms: u32) -> usize {
        let Some(stream_sid) = self.state.stream_sid.clone() else {
            warn!(digits = %digits, "Cannot play DTMF before the call starts");
            return 0;
        };

        let chunks = build_dtmf_sequence(digits, tone_ms, pause_ms);
        let mut sent = 0;
        for chunk in &chunks {
            if self
                .telephony
                .try_send(TelephonyCommand::media_from_ulaw(&stream_sid, chunk))
            {
                sent += 1;
            }
        }

        debug!(digits = %digits, chunks = chunks.len(), sent, "DTMF queued");
        self.state.log_event(
            LogSide::Telephony,
            "dtmf_sent",
            json!({ "digits": digits, "tone_ms": tone_ms, "pause_ms": pause_ms }),
        );
        self.publish(CallEvent::system(
            self.call_sid(),
            TranscriptTag::Dtmf,
            format!("Sent DTMF {digits}"),
        ));
        sent
    }

    /// Put the call on hold: stop forwarding caller audio and cancel the response.
    pub fn hold(&mut self) -> BridgeResult<CallStatus> {
        self.set_status(CallStatus::OnHold)?;
        self.on_hold = true;
        self.cut_playback();
        if self.response_in_progress {
            self.backend.try_send(ClientEvent::ResponseCancel);
        }
        info!(call_sid = ?self.state.call_sid, "Call on hold");
        Ok(CallStatus::OnHold)
    }

    /// Take the call off hold and ask the agent to continue.
    pub fn resume(&mut self) -> BridgeResult<CallStatus> {
        if !self.on_hold {
            return Err(BridgeError::NotOnHold);
        }
        self.set_status(CallStatus::Active)?;
        self.on_hold = false;
        self.backend.try_send(ClientEvent::response_create());
        info!(call_sid = ?self.state.call_sid, "Call resumed");
        Ok(CallStatus::Active)
    }

    pub fn handle_command(&mut self, command: BridgeCommand) -> Flow {
        match command {
            BridgeCommand::InjectContext {
                text,
                history_summary,
            } => {
                self.inject_context(&text, history_summary.as_deref());
            }
            BridgeCommand::AddMessage {
                role,
                text,
                respond,
            } => {
                self.add_message(role, text, respond);
            }
            BridgeCommand::SendDtmf {
                digits,
                tone_ms,
                pause_ms,
            } => {
                self.play_dtmf(&digits, tone_ms, pause_ms);
            }
            BridgeCommand::Hold { reply } => {
                let _ = reply.send(self.hold());
            }
            BridgeCommand::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            BridgeCommand::Hangup => {
                info!(call_sid = ?self.state.call_sid, "Operator hang-up");
                return Flow::End(CallStatus::Completed);
            }
        }
        Flow::Continue
    }

    // ---- reactor ---------------------------------------------------------

    /// Drive the bridge until either connection closes, the call ends or a
    /// watchdog fires.
    pub async fn run(
        mut self,
        mut telephony_rx: mpsc::Receiver<TelephonyMessage>,
        mut backend_rx: mpsc::Receiver<BackendEvent>,
        mut control_rx: mpsc::Receiver<BridgeCommand>,
    ) -> BridgeOutcome {
        let started = Instant::now();
        let ready_deadline = started + self.settings.session_ready_timeout;
        let idle_timeout = self.settings.idle_timeout;
        let mut idle_deadline = started + idle_timeout;
        let mut control_open = true;

        let status = loop {
            tokio::select! {
                frame = telephony_rx.recv() => match frame {
                    Some(message) => {
                        idle_deadline = Instant::now() + idle_timeout;
                        if let Flow::End(status) = self.handle_telephony_message(message) {
                            break status;
                        }
                    }
                    None => {
                        info!(call_sid = ?self.state.call_sid, "Telephony connection closed");
                        break CallStatus::Completed;
                    }
                },

                event = backend_rx.recv() => match event {
                    Some(event) => {
                        if let Flow::End(status) = self.handle_backend_event(event) {
                            break status;
                        }
                    }
                    None => {
                        info!(call_sid = ?self.state.call_sid, "Backend connection dropped");
                        break CallStatus::Completed;
                    }
                },

                command = control_rx.recv(), if control_open => match command {
                    Some(command) => {
                        if let Flow::End(status) = self.handle_command(command) {
                            break status;
                        }
                    }
                    None => control_open = false,
                },

                _ = tokio::time::sleep_until(ready_deadline), if !self.session_ready => {
                    warn!(
                        call_sid = ?self.state.call_sid,
                        timeout_secs = self.settings.session_ready_timeout.as_secs_f64(),
                        "Backend session not ready in time"
                    );
                    break CallStatus::Failed;
                }

                _ = tokio::time::sleep_until(idle_deadline) => {
                    warn!(
                        call_sid = ?self.state.call_sid,
                        timeout_secs = idle_timeout.as_secs_f64(),
                        "No telephony frames, closing idle call"
                    );
                    break CallStatus::Failed;
                }
            }
        };

        self.finish(status)
    }

    /// Tear the call down. Dropping the bridge releases both connections.
    pub fn finish(self, status: CallStatus) -> BridgeOutcome {
        let final_status = match self.state.call_sid.as_deref() {
            Some(call_sid) => self
                .tracker
                .end_call(call_sid, status)
                .map(|call| call.status)
                .unwrap_or(status),
            None => status,
        };

        info!(
            call_sid = ?self.state.call_sid,
            status = %final_status,
            messages = self.state.transcript().len(),
            "Bridge finished"
        );

        BridgeOutcome {
            call_sid: self.state.call_sid.clone(),
            stream_sid: self.state.stream_sid.clone(),
            status: final_status,
            transcript: self.state.transcript().to_vec(),
        }
    }

    // ---- helpers ---------------------------------------------------------

    fn call_sid(&self) -> Option<String> {
        self.state.call_sid.clone()
    }

    fn publish(&self, event: CallEvent) {
        self.tracker.events().publish(event);
    }

    fn send_mark(&mut self, stream_sid: &str) {
        let name = self.state.push_mark();
        self.telephony.try_send(TelephonyCommand::mark(stream_sid, name));
    }

    fn append_transcript(&mut self, message: ConversationMessage) {
        if let Some(call_sid) = self.state.call_sid.as_deref() {
            self.tracker.append_transcript(call_sid, message.clone());
        }
        self.state.append_message(message);
    }

    fn record_final(&mut self, role: Role, text: String) {
        self.append_transcript(ConversationMessage::new(role, text.clone()));
        self.publish(CallEvent::transcript(self.call_sid(), role, text, false));
    }

    fn set_status(&self, status: CallStatus) -> BridgeResult<CallStatus> {
        let call_sid = self
            .state
            .call_sid
            .as_deref()
            .ok_or(BridgeError::NotStarted)?;
        Ok(self.tracker.update_status(call_sid, status)?)
    }

    /// Lifecycle status change; failures are logged, not returned.
    fn apply_status(&self, status: CallStatus) {
        if let Err(e) = self.set_status(status) {
            debug!(call_sid = ?self.state.call_sid, error = %e, "Status not applied");
        }
    }
}

fn telephony_snapshot(message: &TelephonyMessage) -> Value {
    match message {
        TelephonyMessage::Connected { protocol } => json!({ "protocol": protocol }),
        TelephonyMessage::Start { start } => json!({
            "stream_sid": start.stream_sid,
            "call_sid": start.call_sid,
            "custom_parameters": start.custom_parameters,
        }),
        TelephonyMessage::Media { media } => json!({
            "timestamp": media.timestamp,
            "bytes": media.payload.len(),
        }),
        TelephonyMessage::Mark { mark } => json!({ "name": mark.name }),
        TelephonyMessage::Dtmf { dtmf } => json!({ "digit": dtmf.digit }),
        TelephonyMessage::Stop => json!({}),
    }
}

// =============================================================================
// Tests
// =============================================================================
