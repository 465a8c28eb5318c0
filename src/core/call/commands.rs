//! Inline control commands embedded by the agent in its own speech.
//!
//! The agent may emit `[[press:123#]]`, `[[transfer:+15551234567]]` or
//! `[[end_call]]` inside a response; the bridge acts on the first one found
//! in each final transcript.

use std::sync::LazyLock;

use regex::Regex;

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[(.*?)\]\]").unwrap_or_else(|e| panic!("invalid command regex: {e}"))
});

/// A command parsed from agent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    /// Play DTMF digits to the far end.
    Press(String),
    /// Hand the call to another number. Carried out by the carrier collaborator.
    Transfer(Option<String>),
    /// Hang up once the current utterance is done.
    EndCall,
}

impl AgentCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Press(_) => "press",
            Self::Transfer(_) => "transfer",
            Self::EndCall => "end_call",
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Press(digits) => Some(digits),
            Self::Transfer(target) => target.as_deref(),
            Self::EndCall => None,
        }
    }
}

/// Find the first recognised command in `text`.
pub fn detect_command(text: &str) -> Option<AgentCommand> {
    let captures = COMMAND_RE.captures(text)?;
    let token = captures.get(1)?.as_str().trim();

    let (action, value) = match token.split_once(':') {
        Some((action, value)) => (action.trim(), Some(value.trim().to_string())),
        None => (token, None),
    };

    match action.to_lowercase().as_str() {
        "press" => value.filter(|v| !v.is_empty()).map(AgentCommand::Press),
        "transfer" => Some(AgentCommand::Transfer(value.filter(|v| !v.is_empty()))),
        "end_call" => Some(AgentCommand::EndCall),
        _ => None,
    }
}
