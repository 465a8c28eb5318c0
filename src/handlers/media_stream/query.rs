use serde::Deserialize;

use crate::core::call::{CallOptions, CallType};

/// Query parameters accepted on the media-stream upgrade request.
///
/// Values supplied here may be overridden by the `customParameters` of the
/// carrier's `start` frame.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaStreamQuery {
    pub call_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub voice: Option<String>,
    pub system_instructions: Option<String>,
    pub call_instructions: Option<String>,
    pub call_context: Option<String>,
}

impl MediaStreamQuery {
    pub fn call_type(&self) -> CallType {
        self.call_type
            .as_deref()
            .map(CallType::from_str_or_default)
            .unwrap_or_default()
    }

    pub fn into_options(self) -> CallOptions {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        CallOptions {
            from_number: non_empty(self.from),
            to_number: non_empty(self.to),
            voice: non_empty(self.voice),
            system_instructions: non_empty(self.system_instructions),
            call_instructions: non_empty(self.call_instructions),
            call_context: non_empty(self.call_context),
        }
    }
}
