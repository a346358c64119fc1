use serde::{Deserialize, Serialize};

/// A stored blog post.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub normalized_title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub pub_date: String,
    pub content: Option<String>,
    pub category: Option<String>,
    pub enclosure: Option<String>,
    pub created_at: String,
}

/// A post joined with its likes counter, as served by the JSON and feed routes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PostWithLikes {
    pub id: i64,
    pub title: String,
    pub normalized_title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub pub_date: String,
    pub content: Option<String>,
    pub category: Option<String>,
    pub enclosure: Option<String>,
    pub likes_count: i64,
}

/// Data for inserting a new post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub normalized_title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    /// RFC 3339 UTC timestamp.
    pub pub_date: String,
    pub content: Option<String>,
    pub category: Option<String>,
    pub enclosure: Option<String>,
}

/// Result of an insert keyed on `normalized_title`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// Another writer already owns this normalized title.
    Conflict,
}

/// Subscriber status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Active,
    Inactive,
}

impl SubscriberStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// A mailing list subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// JSON array of category names.
    pub categories: String,
    pub frequency: Option<String>,
    pub status: String,
    pub unsubscribe_token: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Subscriber {
    /// A recipient who is not on the list, for one-off sends.
    #[must_use]
    pub fn unsaved(email: &str) -> Self {
        Self {
            id: 0,
            email: email.to_string(),
            name: "there".to_string(),
            categories: "[]".to_string(),
            frequency: None,
            status: SubscriberStatus::Active.as_str().to_string(),
            unsubscribe_token: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[must_use]
    pub fn status_enum(&self) -> Option<SubscriberStatus> {
        SubscriberStatus::from_str(&self.status)
    }

    /// Decoded category filter. Malformed JSON is treated as no filter.
    #[must_use]
    pub fn category_list(&self) -> Vec<String> {
        serde_json::from_str(&self.categories).unwrap_or_default()
    }
}

/// Data for inserting a new subscriber.
#[derive(Debug, Clone)]
pub struct NewSubscriber {
    pub email: String,
    pub name: String,
    pub categories: Vec<String>,
    pub frequency: Option<String>,
}

/// Outcome of one notification email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Sent,
    Failed,
}

impl EmailStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// An audit record of a notification attempt.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailLog {
    pub id: i64,
    pub subscriber_id: Option<i64>,
    pub email: String,
    pub post_id: Option<i64>,
    pub subject: String,
    pub status: String,
    pub error: Option<String>,
    pub sent_at: String,
}

/// Data for inserting an email audit record.
#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub subscriber_id: Option<i64>,
    pub email: String,
    pub post_id: Option<i64>,
    pub subject: String,
    pub status: EmailStatus,
    pub error: Option<String>,
}
