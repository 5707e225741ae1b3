use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// A stored conversation. The pair `(owner_id, id)` is the store key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_serializes_with_camel_case_fields() {
        let session = ChatSession {
            id: "s1".into(),
            owner_id: "u1".into(),
            title: "t".into(),
            messages: vec![Message::new(Role::User, "hi")],
            updated_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["ownerId"], "u1");
        assert_eq!(value["updatedAt"], "2026-01-02T03:04:05Z");
        assert_eq!(value["messages"][0], json!({ "role": "user", "content": "hi" }));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed = serde_json::from_value::<Message>(json!({ "role": "tool", "content": "x" }));
        assert!(parsed.is_err());
    }
}
