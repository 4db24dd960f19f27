//! Notification topics and the event envelope.

use std::fmt;

use brandgen_core::request::RequestStatus;
use brandgen_core::types::{RequestId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Named topics on the cross-context event surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    RequestCreated,
    RequestUpdated,
    RequestsCleared,
    ImageGenerated,
    GenerationProgress,
    GenerationTimeout,
    GenerationRetry,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::RequestCreated,
        Topic::RequestUpdated,
        Topic::RequestsCleared,
        Topic::ImageGenerated,
        Topic::GenerationProgress,
        Topic::GenerationTimeout,
        Topic::GenerationRetry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestCreated => "request-created",
            Self::RequestUpdated => "request-updated",
            Self::RequestsCleared => "requests-cleared",
            Self::ImageGenerated => "image-generated",
            Self::GenerationProgress => "generation-progress",
            Self::GenerationTimeout => "generation-timeout",
            Self::GenerationRetry => "generation-retry",
        }
    }

    /// Topics that invalidate a cached request list.
    pub fn affects_request_lists(self) -> bool {
        matches!(
            self,
            Self::RequestCreated | Self::RequestUpdated | Self::RequestsCleared | Self::ImageGenerated
        )
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Minimal identifying data carried by each topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "kebab-case")]
pub enum EventPayload {
    RequestCreated {
        request_id: RequestId,
    },
    RequestUpdated {
        request_id: RequestId,
        status: RequestStatus,
    },
    RequestsCleared,
    ImageGenerated {
        request_id: Option<RequestId>,
        image_url: String,
        prompt: String,
    },
    GenerationProgress {
        request_id: RequestId,
        progress: u8,
    },
    /// Polling gave up while the provider was still working. The request
    /// stays `in-progress`; `message` is meant for the user.
    GenerationTimeout {
        request_id: RequestId,
        message: String,
    },
    /// Ask the generation side to try this prompt again.
    GenerationRetry {
        request_id: Option<RequestId>,
        prompt: String,
    },
}

impl EventPayload {
    pub fn topic(&self) -> Topic {
        match self {
            Self::RequestCreated { .. } => Topic::RequestCreated,
            Self::RequestUpdated { .. } => Topic::RequestUpdated,
            Self::RequestsCleared => Topic::RequestsCleared,
            Self::ImageGenerated { .. } => Topic::ImageGenerated,
            Self::GenerationProgress { .. } => Topic::GenerationProgress,
            Self::GenerationTimeout { .. } => Topic::GenerationTimeout,
            Self::GenerationRetry { .. } => Topic::GenerationRetry,
        }
    }

    /// The request this payload concerns, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::RequestCreated { request_id }
            | Self::RequestUpdated { request_id, .. }
            | Self::GenerationProgress { request_id, .. }
            | Self::GenerationTimeout { request_id, .. } => Some(*request_id),
            Self::ImageGenerated { request_id, .. } | Self::GenerationRetry { request_id, .. } => {
                *request_id
            }
            Self::RequestsCleared => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// An ephemeral, JSON-serialisable notification.
///
/// `origin` and `sequence` are stamped by the publishing context. Sequence
/// numbers are only ordered per origin; nothing orders events across origins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub origin: Option<String>,
    pub sequence: u64,
    pub timestamp: Timestamp,
}

impl NotificationEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            origin: None,
            sequence: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn topic(&self) -> Topic {
        self.payload.topic()
    }

    pub fn request_created(request_id: RequestId) -> Self {
        Self::new(EventPayload::RequestCreated { request_id })
    }

    pub fn request_updated(request_id: RequestId, status: RequestStatus) -> Self {
        Self::new(EventPayload::RequestUpdated { request_id, status })
    }

    pub fn requests_cleared() -> Self {
        Self::new(EventPayload::RequestsCleared)
    }

    pub fn image_generated(
        request_id: Option<RequestId>,
        image_url: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self::new(EventPayload::ImageGenerated {
            request_id,
            image_url: image_url.into(),
            prompt: prompt.into(),
        })
    }

    pub fn generation_progress(request_id: RequestId, progress: u8) -> Self {
        Self::new(EventPayload::GenerationProgress {
            request_id,
            progress,
        })
    }

    pub fn generation_timeout(request_id: RequestId, message: impl Into<String>) -> Self {
        Self::new(EventPayload::GenerationTimeout {
            request_id,
            message: message.into(),
        })
    }

    pub fn generation_retry(request_id: Option<RequestId>, prompt: impl Into<String>) -> Self {
        Self::new(EventPayload::GenerationRetry {
            request_id,
            prompt: prompt.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_topic_matches_wire_tag() {
        let event = NotificationEvent::image_generated(None, "https://cdn/x.png", "sunset");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "image-generated");
        assert_eq!(json["image_url"], "https://cdn/x.png");
        assert_eq!(json["prompt"], "sunset");
        assert_eq!(event.topic(), Topic::ImageGenerated);
    }

    #[test]
    fn every_topic_string_matches_serde() {
        for topic in Topic::ALL {
            let json = serde_json::to_value(topic).unwrap();
            assert_eq!(json, topic.as_str());
        }
    }

    #[test]
    fn event_parses_from_json() {
        let id = uuid::Uuid::now_v7();
        let raw = format!(
            r#"{{"topic":"request-updated","request_id":"{id}","status":"completed",
                "origin":"tab-a","sequence":3,"timestamp":"2025-03-01T12:00:00Z"}}"#
        );
        let event: NotificationEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::RequestUpdated {
                request_id: id,
                status: RequestStatus::Completed
            }
        );
        assert_eq!(event.origin.as_deref(), Some("tab-a"));
        assert_eq!(event.sequence, 3);
    }

    #[test]
    fn cleared_has_no_request_id() {
        assert_eq!(NotificationEvent::requests_cleared().payload.request_id(), None);
        assert!(Topic::RequestsCleared.affects_request_lists());
        assert!(!Topic::GenerationProgress.affects_request_lists());
    }
}
