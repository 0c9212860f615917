use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::contract::{ChatReply, QuickReply, SessionInfo, Source};

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequestBody<'a> {
    pub session_id: &'a str,
    pub message: &'a str,
}

/// Raw `/api/chat` payload as emitted by current and older backend revisions.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatResponseBody {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    /// Older revisions named the reply field `reply`.
    #[serde(default)]
    reply: Option<String>,
    /// Citations and quick replies are decoded entry by entry; a malformed entry is
    /// dropped without costing the reply text.
    #[serde(default)]
    sources: Value,
    #[serde(default)]
    quick_replies: Value,
}

#[derive(Debug, Deserialize)]
struct SourceBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "url")]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuickReplyBody {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionInfoBody {
    session_id: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    message_count: u64,
}

impl ChatResponseBody {
    /// Maps either reply field onto the canonical text; the only place that knows both names.
    pub(crate) fn into_reply(self) -> ChatReply {
        let text = [self.text, self.reply]
            .into_iter()
            .flatten()
            .map(|candidate| candidate.trim().to_string())
            .find(|candidate| !candidate.is_empty());

        let session_id = self
            .session_id
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());

        ChatReply {
            session_id,
            text,
            sources: lenient_entries::<SourceBody>("sources", self.sources)
                .filter_map(SourceBody::into_source)
                .collect(),
            quick_replies: lenient_entries::<QuickReplyBody>("quick_replies", self.quick_replies)
                .filter_map(QuickReplyBody::into_quick_reply)
                .collect(),
        }
    }
}

impl SourceBody {
    /// A citation without a link has nothing to point at; a missing title shows the link.
    fn into_source(self) -> Option<Source> {
        let link = non_blank(self.link)?;
        let title = non_blank(self.title).unwrap_or_else(|| link.clone());
        Some(Source { title, link })
    }
}

impl QuickReplyBody {
    fn into_quick_reply(self) -> Option<QuickReply> {
        let id = self.id?.into_string();
        let label = non_blank(self.label)?;
        Some(QuickReply { id, label })
    }
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

impl From<SessionInfoBody> for SessionInfo {
    fn from(body: SessionInfoBody) -> Self {
        Self {
            session_id: body.session_id,
            created_at: body.created_at,
            message_count: body.message_count,
        }
    }
}

fn lenient_entries<T>(field: &'static str, raw: Value) -> impl Iterator<Item = T>
where
    T: for<'de> Deserialize<'de>,
{
    let entries = match raw {
        Value::Array(entries) => entries,
        Value::Null => Vec::new(),
        other => {
            tracing::debug!(field, value = %other, "ignoring non-list reply field");
            Vec::new()
        }
    };

    entries
        .into_iter()
        .filter_map(move |entry| match serde_json::from_value::<T>(entry) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                tracing::debug!(field, error = %error, "dropping malformed reply entry");
                None
            }
        })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &str) -> ChatReply {
        serde_json::from_str::<ChatResponseBody>(raw)
            .expect("payload should decode")
            .into_reply()
    }

    #[test]
    fn legacy_reply_field_is_used_when_text_is_absent() {
        let reply = decode(r#"{"session_id":"s1","reply":"Hi there"}"#);
        assert_eq!(reply.session_id.as_deref(), Some("s1"));
        assert_eq!(reply.text.as_deref(), Some("Hi there"));
    }

    #[test]
    fn text_field_wins_over_reply() {
        let reply = decode(r#"{"session_id":"s1","text":"A","reply":"B"}"#);
        assert_eq!(reply.text.as_deref(), Some("A"));
    }

    #[test]
    fn blank_fields_leave_no_text() {
        assert_eq!(decode(r#"{"session_id":"s1"}"#).text, None);
        assert_eq!(
            decode(r#"{"session_id":"s1","text":"  ","reply":"\n\t"}"#).text,
            None
        );
    }

    #[test]
    fn blank_text_falls_through_to_reply() {
        let reply = decode(r#"{"session_id":"s1","text":"   ","reply":"fallback"}"#);
        assert_eq!(reply.text.as_deref(), Some("fallback"));
    }

    #[test]
    fn sources_and_quick_replies_accept_legacy_shapes() {
        let reply = decode(
            r#"{
                "session_id": "s1",
                "text": "See these",
                "sources": [
                    {"title": "Services", "link": "https://example.test/services"},
                    {"title": "Old", "url": "https://example.test/old"}
                ],
                "quick_replies": [{"id": 1, "label": "A"}, {"id": "two", "label": "B"}]
            }"#,
        );

        assert_eq!(
            reply.sources,
            vec![
                Source {
                    title: "Services".to_string(),
                    link: "https://example.test/services".to_string(),
                },
                Source {
                    title: "Old".to_string(),
                    link: "https://example.test/old".to_string(),
                },
            ]
        );
        assert_eq!(
            reply.quick_replies,
            vec![QuickReply::new("1", "A"), QuickReply::new("two", "B")]
        );
    }

    #[test]
    fn null_entry_fields_do_not_discard_the_reply() {
        let reply = decode(
            r#"{
                "session_id": "s2",
                "text": "Hello!",
                "sources": [
                    {"title": null, "link": "https://example.test/a"},
                    {"title": "No link", "link": null},
                    {"title": "Missing link"}
                ],
                "quick_replies": [
                    {"id": "1", "label": null},
                    {"id": "2"},
                    {"label": "No id"},
                    {"id": "3", "label": "Keep"}
                ]
            }"#,
        );

        assert_eq!(reply.session_id.as_deref(), Some("s2"));
        assert_eq!(reply.text.as_deref(), Some("Hello!"));
        assert_eq!(
            reply.sources,
            vec![Source {
                title: "https://example.test/a".to_string(),
                link: "https://example.test/a".to_string(),
            }]
        );
        assert_eq!(reply.quick_replies, vec![QuickReply::new("3", "Keep")]);
    }

    #[test]
    fn wrongly_typed_entries_and_lists_are_dropped() {
        let reply = decode(
            r#"{
                "text": "Hello!",
                "sources": "not a list",
                "quick_replies": [42, {"id": {"nested": true}, "label": "Bad id"}, {"id": 5, "label": "Five"}]
            }"#,
        );

        assert_eq!(reply.text.as_deref(), Some("Hello!"));
        assert!(reply.sources.is_empty());
        assert_eq!(reply.quick_replies, vec![QuickReply::new("5", "Five")]);
    }

    #[test]
    fn null_lists_decode_as_empty() {
        let reply = decode(r#"{"session_id":"s1","text":"ok","sources":null,"quick_replies":null}"#);
        assert!(reply.sources.is_empty());
        assert!(reply.quick_replies.is_empty());
    }
}
