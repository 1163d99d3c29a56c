//! Voice chat: a running conversation with a chat model whose replies are
//! spoken in the session's reference voice.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::engine::{ChatMessage, ChatModel, ChatSampling, Role, Transcriber, Waveform};
use crate::error::StudioError;
use crate::feedback::Feedback;
use crate::infer::{self, GenerationParams, TtsRequest};
use crate::model::ModelRegistry;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are not an AI assistant, you are whoever the user says you are. Keep your responses concise.";

/// One displayed turn pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: Option<String>,
}

/// Role-tagged transcript sent to the chat model plus the displayed pairs.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    history: Vec<Exchange>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl Conversation {
    pub fn new(system_prompt: &str) -> Self {
        Self { messages: vec![ChatMessage::new(Role::System, system_prompt)], history: Vec::new() }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    pub fn system_prompt(&self) -> &str {
        self.messages.first().map(|m| m.content.as_str()).unwrap_or_default()
    }

    /// Back to the default system prompt with no turns.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Start over with `prompt` as the system message.
    pub fn set_system_prompt(&mut self, prompt: &str) {
        *self = Self::new(prompt);
    }

    fn push_user(&mut self, text: &str) {
        self.messages.push(ChatMessage::new(Role::User, text));
        self.history.push(Exchange { user: text.to_string(), assistant: None });
    }

    fn push_assistant(&mut self, text: &str) {
        self.messages.push(ChatMessage::new(Role::Assistant, text));
        if let Some(last) = self.history.last_mut() {
            last.assistant = Some(text.to_string());
        }
    }

    /// Drop a user turn the model never answered.
    fn pop_unanswered(&mut self) {
        if self.messages.last().is_some_and(|m| m.role == Role::User) {
            self.messages.pop();
            self.history.pop();
        }
    }
}

/// Per-session chat state: the conversation and the voice replies use.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatSession {
    pub conversation: Conversation,
    pub ref_audio: Option<PathBuf>,
    pub ref_text: String,
    pub remove_silence: bool,
}

/// Spoken reply plus the (possibly transcribed) reference text.
#[derive(Debug, Clone)]
pub struct SpokenReply {
    pub waveform: Waveform,
    pub ref_text: String,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
    }

    pub fn set_system_prompt(&mut self, prompt: &str) {
        self.conversation.set_system_prompt(prompt);
    }

    /// Take one user turn and get the model's reply.
    ///
    /// Typed text wins; `audio` is transcribed only when `text` is blank.
    /// Returns `Ok(None)` without touching the conversation when there is
    /// nothing to say.
    pub fn process_input(
        &mut self,
        chat: Option<&dyn ChatModel>,
        transcriber: &dyn Transcriber,
        audio: Option<&Path>,
        text: &str,
    ) -> Result<Option<String>> {
        let text = match (text.trim(), audio) {
            ("", Some(audio)) => transcriber
                .transcribe(audio)
                .context("Cannot transcribe chat input")?
                .trim()
                .to_string(),
            (typed, _) => typed.to_string(),
        };
        if text.is_empty() {
            return Ok(None);
        }
        let chat = chat.ok_or(StudioError::ChatModelNotLoaded)?;

        self.conversation.push_user(&text);
        let reply = match chat.respond(self.conversation.messages(), &ChatSampling::default()) {
            Ok(reply) => reply,
            Err(e) => {
                self.conversation.pop_unanswered();
                return Err(e.context("Chat model failed to respond"));
            }
        };
        self.conversation.push_assistant(&reply);
        Ok(Some(reply))
    }

    /// Speak the latest reply in the session voice.
    ///
    /// `None` when there is no reference audio or no reply yet.
    pub fn generate_audio_response(
        &mut self,
        models: &mut ModelRegistry,
        transcriber: &dyn Transcriber,
        feedback: &mut Feedback,
    ) -> Result<Option<SpokenReply>> {
        let Some(ref_audio) = self.ref_audio.clone() else {
            return Ok(None);
        };
        let Some(reply) = self.conversation.history().last().and_then(|e| e.assistant.clone()) else {
            return Ok(None);
        };
        let params = GenerationParams {
            remove_silence: self.remove_silence,
            cross_fade: 0.15,
            speed: 1.0,
            ..Default::default()
        };
        let request = TtsRequest {
            ref_audio: Some(ref_audio.as_path()),
            ref_text: &self.ref_text,
            gen_text: &reply,
            params,
        };
        let inference = infer::infer(models, transcriber, &request, feedback)?;
        self.ref_text = inference.ref_text.clone();
        Ok(inference
            .output
            .map(|g| SpokenReply { waveform: g.waveform, ref_text: inference.ref_text }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::custom_store::CustomModelStore;
    use crate::engine::fakes::{write_tone, EchoChat, FakeLoader, FakeTranscriber};

    struct FailingChat;

    impl ChatModel for FailingChat {
        fn respond(&self, _: &[ChatMessage], _: &ChatSampling) -> Result<String> {
            anyhow::bail!("offline")
        }
    }

    #[test]
    fn test_typed_text_wins_over_audio() {
        let stt = FakeTranscriber::new("spoken words");
        let mut session = ChatSession::new();
        let reply = session
            .process_input(Some(&EchoChat), &stt, Some(Path::new("in.wav")), "typed words")
            .unwrap();
        assert_eq!(reply.as_deref(), Some("You said: typed words"));
        assert_eq!(stt.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_audio_transcribed_when_text_blank() {
        let stt = FakeTranscriber::new(" spoken words ");
        let mut session = ChatSession::new();
        let reply = session.process_input(Some(&EchoChat), &stt, Some(Path::new("in.wav")), "  ").unwrap();
        assert_eq!(reply.as_deref(), Some("You said: spoken words"));
        assert_eq!(session.conversation.messages().len(), 3);
        assert_eq!(
            session.conversation.history(),
            &[Exchange { user: "spoken words".into(), assistant: Some("You said: spoken words".into()) }]
        );
    }

    #[test]
    fn test_blank_input_is_no_turn() {
        let stt = FakeTranscriber::new("");
        let mut session = ChatSession::new();
        assert_eq!(session.process_input(None, &stt, None, " ").unwrap(), None);
        assert_eq!(session.process_input(Some(&EchoChat), &stt, Some(Path::new("a.wav")), "").unwrap(), None);
        assert_eq!(session.conversation.messages().len(), 1);
    }

    #[test]
    fn test_turn_before_model_loaded_is_error() {
        let stt = FakeTranscriber::new("");
        let mut session = ChatSession::new();
        let err = session.process_input(None, &stt, None, "hello").unwrap_err();
        assert!(matches!(err.downcast_ref::<StudioError>(), Some(StudioError::ChatModelNotLoaded)));
        assert!(session.conversation.history().is_empty());
    }

    #[test]
    fn test_failed_reply_leaves_conversation_unchanged() {
        let stt = FakeTranscriber::new("");
        let mut session = ChatSession::new();
        assert!(session.process_input(Some(&FailingChat), &stt, None, "hello").is_err());
        assert_eq!(session.conversation.messages().len(), 1);
        assert!(session.conversation.history().is_empty());
    }

    #[test]
    fn test_clear_and_system_prompt_reset() {
        let stt = FakeTranscriber::new("");
        let mut session = ChatSession::new();
        session.process_input(Some(&EchoChat), &stt, None, "hi").unwrap();
        session.set_system_prompt("You are a pirate.");
        assert_eq!(session.conversation.messages().len(), 1);
        assert_eq!(session.conversation.system_prompt(), "You are a pirate.");
        session.process_input(Some(&EchoChat), &stt, None, "hi").unwrap();
        session.clear();
        assert_eq!(session.conversation.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert!(session.conversation.history().is_empty());
    }

    #[test]
    fn test_audio_response_needs_voice_and_reply() {
        let dir = tempfile::tempdir().unwrap();
        let mut models = ModelRegistry::new(Arc::new(FakeLoader::default()), CustomModelStore::in_dir(dir.path()))
            .with_resolver(|l| Ok(Some(PathBuf::from(l))));
        let stt = FakeTranscriber::new("voice sample");
        let mut session = ChatSession::new();
        let mut fb = Feedback::new();

        // No reference audio.
        session.process_input(Some(&EchoChat), &stt, None, "hi").unwrap();
        assert!(session.generate_audio_response(&mut models, &stt, &mut fb).unwrap().is_none());

        let wav = dir.path().join("voice.wav");
        write_tone(&wav, 1.0);
        session.ref_audio = Some(wav);
        let spoken = session.generate_audio_response(&mut models, &stt, &mut fb).unwrap().unwrap();
        assert_eq!(spoken.waveform.samples.len(), "You said: hi".len());
        assert_eq!(spoken.ref_text, "voice sample. ");
        assert_eq!(session.ref_text, "voice sample. ");
    }

    #[test]
    fn test_audio_response_without_reply() {
        let dir = tempfile::tempdir().unwrap();
        let mut models = ModelRegistry::new(Arc::new(FakeLoader::default()), CustomModelStore::in_dir(dir.path()));
        let stt = FakeTranscriber::new("x");
        let mut session = ChatSession { ref_audio: Some(dir.path().join("v.wav")), ..Default::default() };
        assert!(session.generate_audio_response(&mut models, &stt, &mut Feedback::new()).unwrap().is_none());
    }
}
