use triage_core::domain::intent::{Intent, IntentType};
use triage_core::flows::DEFAULT_CONFIDENCE_THRESHOLD;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Degrade { reason_code: &'static str, user_message: String },
}

/// Confidence gate applied to classifier output before any tracker call.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardrailPolicy {
    pub confidence_threshold: f64,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD }
    }
}

impl GuardrailPolicy {
    pub fn new(confidence_threshold: f64) -> Self {
        Self { confidence_threshold }
    }

    pub fn evaluate(&self, intent: Option<&Intent>) -> GuardrailDecision {
        let Some(intent) = intent else {
            return GuardrailDecision::Degrade {
                reason_code: "no_intent",
                user_message: "I couldn't tell what you wanted me to do with that message."
                    .to_string(),
            };
        };

        if intent.intent_type == IntentType::Unknown {
            return GuardrailDecision::Degrade {
                reason_code: "unknown_intent",
                user_message: "I didn't recognise a request there. I can file bugs, tasks and ideas, update an issue by number, or search existing issues."
                    .to_string(),
            };
        }

        if intent.confidence < self.confidence_threshold {
            return GuardrailDecision::Degrade {
                reason_code: "low_confidence",
                user_message: format!(
                    "I'm not confident enough to act on that ({:.0}% sure it's a {} request). Could you rephrase it with a bit more detail?",
                    intent.confidence * 100.0,
                    intent.intent_type.as_str().replace('_', " ")
                ),
            };
        }

        GuardrailDecision::Allow
    }
}
