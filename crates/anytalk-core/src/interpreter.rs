//! Converts vendor JSON responses into an ordered stream of
//! partial/final text events.

use serde_json::Value;

use crate::config::Mode;

/// Interpreter state carried across responses within one session.
#[derive(Debug, Default, Clone)]
pub(crate) struct InterpreterState {
    last_committed_end_time: i64,
    last_full_text: String,
}

/// The events produced from interpreting one response payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Events {
    /// The current partial, if the response carries one.
    pub(crate) partial: Option<String>,
    /// Finals, in emission order.
    pub(crate) finals: Vec<String>,
}

impl InterpreterState {
    /// A fresh interpreter with no committed history.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run the interpreter algorithm over one response.
    /// Malformed JSON or a missing `result` key yields no events, per
    /// §7's "malformed-JSON: swallow the message, loop continues".
    pub(crate) fn interpret(&mut self, json: &[u8], mode: Mode) -> Events {
        let mut events = Events::default();
        let Ok(value) = serde_json::from_slice::<Value>(json) else {
            return events;
        };
        let Some(result) = value.get("result") else {
            return events;
        };

        if let Some(utterances) = result.get("utterances").and_then(Value::as_array) {
            self.interpret_utterances(utterances, &mut events);
        } else if let Some(text) = result.get("text").and_then(Value::as_str) {
            self.interpret_text_fallback(text, mode, &mut events);
        }
        events
    }

    fn interpret_utterances(&mut self, utterances: &[Value], events: &mut Events) {
        for utt in utterances {
            if !utt.get("definite").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let text = utt
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim();
            let end_time = utt.get("end_time").and_then(Value::as_i64).unwrap_or(i64::MIN);
            if end_time > self.last_committed_end_time && !text.is_empty() {
                events.finals.push(text.to_string());
                self.last_committed_end_time = end_time;
            }
        }

        for utt in utterances.iter().rev() {
            if utt.get("definite").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let text = utt
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim();
            if !text.is_empty() {
                events.partial = Some(text.to_string());
                break;
            }
        }
    }

    fn interpret_text_fallback(&mut self, text: &str, mode: Mode, events: &mut Events) {
        if mode == Mode::BidiAsync {
            // The service revises aggressively in this mode; each whole
            // text is both the partial preview and the final commit,
            // per §4.4 step 3 and the §9 open question about it.
            if !text.is_empty() {
                events.partial = Some(text.to_string());
                events.finals.push(text.to_string());
            }
            self.last_full_text = text.to_string();
            return;
        }

        if let Some(suffix) = text.strip_prefix(self.last_full_text.as_str()) {
            let suffix = suffix.trim();
            if !suffix.is_empty() {
                events.finals.push(suffix.to_string());
            }
        } else if text != self.last_full_text {
            events.finals.push(text.trim().to_string());
        }
        self.last_full_text = text.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn missing_result_yields_no_events() {
        let mut state = InterpreterState::new();
        let events = state.interpret(&payload(json!({"not_result": 1})), Mode::Bidi);
        assert_eq!(events, Events::default());
    }

    #[test]
    fn malformed_json_is_swallowed() {
        let mut state = InterpreterState::new();
        let events = state.interpret(b"not json", Mode::Bidi);
        assert_eq!(events, Events::default());
    }

    #[test]
    fn utterances_across_two_responses_commit_growing_finals() {
        let mut state = InterpreterState::new();

        let response_a = payload(json!({
            "result": {
                "utterances": [
                    {"definite": true, "end_time": 860, "text": "你好"},
                    {"definite": false, "text": "世"}
                ]
            }
        }));
        let events_a = state.interpret(&response_a, Mode::Bidi);
        assert_eq!(events_a.finals, vec!["你好".to_string()]);
        assert_eq!(events_a.partial, Some("世".to_string()));

        let response_b = payload(json!({
            "result": {
                "utterances": [
                    {"definite": true, "end_time": 860, "text": "你好"},
                    {"definite": true, "end_time": 1400, "text": "世界"}
                ]
            }
        }));
        let events_b = state.interpret(&response_b, Mode::Bidi);
        assert_eq!(events_b.finals, vec!["世界".to_string()]);
        assert_eq!(events_b.partial, None);
    }

    #[test]
    fn text_fallback_commits_only_the_new_suffix() {
        let mut state = InterpreterState::new();

        let a = state.interpret(&payload(json!({"result": {"text": "a"}})), Mode::Bidi);
        assert_eq!(a.finals, vec!["a".to_string()]);

        let b = state.interpret(&payload(json!({"result": {"text": "a b"}})), Mode::Bidi);
        assert_eq!(b.finals, vec!["b".to_string()]);
    }

    #[test]
    fn bidi_async_duplicates_text_as_partial_and_final() {
        let mut state = InterpreterState::new();
        let events = state.interpret(
            &payload(json!({"result": {"text": "hello"}})),
            Mode::BidiAsync,
        );
        assert_eq!(events.partial, Some("hello".to_string()));
        assert_eq!(events.finals, vec!["hello".to_string()]);
    }

    #[test]
    fn finals_are_strictly_increasing_in_end_time() {
        let mut state = InterpreterState::new();
        let mut end_times = Vec::new();
        for (end_time, text) in [(500, "a"), (900, "b"), (900, "ignored"), (1400, "c")] {
            let events = state.interpret(
                &payload(json!({"result": {"utterances": [
                    {"definite": true, "end_time": end_time, "text": text}
                ]}})),
                Mode::Bidi,
            );
            if !events.finals.is_empty() {
                end_times.push(end_time);
            }
        }
        assert_eq!(end_times, vec![500, 900, 1400]);
        assert!(end_times.windows(2).all(|w| w[0] < w[1]));
    }
}
