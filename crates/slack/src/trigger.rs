use triage_core::domain::chat::{ChatRef, MessageRef, UserRef};
use triage_core::domain::trigger::TriggerMessage;

use crate::events::MessageEvent;

/// Decides which channel messages start a workflow run: an explicit bot mention or at
/// least one `#word` hashtag. Bot traffic and message subtypes (edits, joins) never do.
#[derive(Clone, Debug, Default)]
pub struct TriggerDetector {
    bot_user_id: Option<String>,
}

impl TriggerDetector {
    pub fn new(bot_user_id: Option<String>) -> Self {
        Self { bot_user_id: bot_user_id.filter(|id| !id.trim().is_empty()) }
    }

    pub fn detect(&self, event: &MessageEvent) -> Option<TriggerMessage> {
        if event.subtype.is_some() || event.bot_id.is_some() {
            return None;
        }
        let user_id = event.user_id.as_deref()?;
        if self.bot_user_id.as_deref() == Some(user_id) {
            return None;
        }

        let mentioned = self.mentions_bot(&event.text);
        let hashtags = hashtags(&event.text);
        if !mentioned && hashtags.is_empty() {
            return None;
        }

        Some(TriggerMessage {
            chat_ref: ChatRef(event.channel_id.clone()),
            message_ref: MessageRef(event.ts.clone()),
            user_ref: UserRef(user_id.to_owned()),
            text: event.text.clone(),
            hashtags,
            mentioned,
        })
    }

    fn mentions_bot(&self, text: &str) -> bool {
        let Some(bot) = &self.bot_user_id else {
            return false;
        };
        text.match_indices("<@").any(|(start, _)| {
            let rest = &text[start + 2..];
            rest.strip_prefix(bot.as_str())
                .is_some_and(|tail| tail.starts_with('>') || tail.starts_with('|'))
        })
    }
}

/// Lowercased, de-duplicated `#word` tags in order of appearance.
pub fn hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        let Some(tag) = token.strip_prefix('#') else {
            continue;
        };
        let tag: String = tag
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '-')
            .collect::<String>()
            .to_lowercase();
        if tag.chars().next().is_some_and(char::is_alphabetic) && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::{hashtags, TriggerDetector};
    use crate::events::MessageEvent;

    fn event(user: &str, text: &str) -> MessageEvent {
        MessageEvent {
            channel_id: "C1".to_owned(),
            ts: "1730000000.000100".to_owned(),
            user_id: Some(user.to_owned()),
            text: text.to_owned(),
            ..MessageEvent::default()
        }
    }

    #[test]
    fn hashtag_message_triggers_at_hashtag_priority() {
        let detector = TriggerDetector::new(Some("U0BOT".to_owned()));
        let trigger = detector.detect(&event("U1", "#Bug: login page crashes")).expect("trigger");

        assert_eq!(trigger.hashtags, vec!["bug".to_owned()]);
        assert!(!trigger.mentioned);
        assert_eq!(trigger.message_ref.0, "1730000000.000100");
    }

    #[test]
    fn mention_triggers_without_hashtags() {
        let detector = TriggerDetector::new(Some("U0BOT".to_owned()));

        assert!(detector.detect(&event("U1", "<@U0BOT> close #12")).expect("trigger").mentioned);
        assert!(detector.detect(&event("U1", "<@U0BOT|triage> find login bugs")).is_some());
        assert!(detector.detect(&event("U1", "<@U0BOTX> hi")).is_none());
    }

    #[test]
    fn bot_traffic_and_edits_are_skipped() {
        let detector = TriggerDetector::new(Some("U0BOT".to_owned()));

        assert!(detector.detect(&event("U0BOT", "#bug filed")).is_none());
        let mut edited = event("U1", "#bug crash");
        edited.subtype = Some("message_changed".to_owned());
        assert!(detector.detect(&edited).is_none());
        let mut from_app = event("U1", "#bug crash");
        from_app.bot_id = Some("B1".to_owned());
        assert!(detector.detect(&from_app).is_none());
    }

    #[test]
    fn numeric_references_are_not_hashtags() {
        assert_eq!(hashtags("see #42 and #idea, #IDEA again"), vec!["idea".to_owned()]);
        assert!(TriggerDetector::default().detect(&event("U1", "fixed in #42")).is_none());
    }
}
