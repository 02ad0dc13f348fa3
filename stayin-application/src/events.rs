//! Stayin 事件目录中的具体事件
//!
//! 字段名与各生产者的线上格式保持一致：
//! - 用户服务发布的事件使用 PascalCase（`UserId`、`Username` ...）；
//! - 房源与预订服务发布的事件使用 camelCase，主键为 `_id`。
//!
//! 所有事件共享 `EventHeader`（`EventId`、`PublishedTime`），展开在载荷顶层。
use bon::Builder;
use serde::{Deserialize, Serialize};
use stayin_eventing::domain_event::{Event, EventHeader};

/// 用户注册完成
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "PascalCase")]
pub struct UserCreatedEvent {
    #[serde(flatten)]
    #[builder(default)]
    pub header: EventHeader,
    #[builder(into)]
    pub user_id: String,
    #[builder(into)]
    pub username: String,
    #[builder(into)]
    pub email: String,
    #[builder(into)]
    pub phone_number: Option<String>,
}

impl Event for UserCreatedEvent {
    const KIND: &'static str = "UserCreatedEvent";

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// 用户资料变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "PascalCase")]
pub struct UserUpdatedEvent {
    #[serde(flatten)]
    #[builder(default)]
    pub header: EventHeader,
    #[builder(into)]
    pub user_id: String,
    #[builder(into)]
    pub new_username: String,
    #[builder(into)]
    pub new_email: String,
    #[builder(into)]
    pub new_phone_number: Option<String>,
}

impl Event for UserUpdatedEvent {
    const KIND: &'static str = "UserUpdatedEvent";

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "PascalCase")]
pub struct UserDeletedEvent {
    #[serde(flatten)]
    #[builder(default)]
    pub header: EventHeader,
    #[builder(into)]
    pub user_id: String,
}

impl Event for UserDeletedEvent {
    const KIND: &'static str = "UserDeletedEvent";

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// 预订创建；`appartement` 为房源 ID，`user` 为租客 ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct ReservationCreatedEvent {
    #[serde(flatten)]
    #[builder(default)]
    pub header: EventHeader,
    #[serde(rename = "_id")]
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub appartement: String,
    #[builder(into)]
    pub user: String,
    #[builder(into)]
    pub check_in: Option<String>,
    #[builder(into)]
    pub check_out: Option<String>,
    #[builder(into)]
    pub number_of_guests: Option<String>,
    #[builder(into)]
    pub name: Option<String>,
    #[builder(into)]
    pub phone: Option<String>,
    #[builder(into)]
    pub email: Option<String>,
    #[builder(into)]
    pub price: Option<String>,
    #[builder(into)]
    pub reserved_dates: Option<String>,
}

impl Event for ReservationCreatedEvent {
    const KIND: &'static str = "ReservationCreatedEvent";

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// 房源发布；消费后生成一条已审核的房源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct AppartementCreatedEvent {
    #[serde(flatten)]
    #[builder(default)]
    pub header: EventHeader,
    #[serde(rename = "_id")]
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub owner: String,
    #[builder(into)]
    pub title: Option<String>,
    #[builder(into)]
    pub wilaya: Option<String>,
    #[builder(into)]
    pub comun: Option<String>,
    #[builder(into)]
    pub street: Option<String>,
    pub photos: Option<Vec<Option<String>>>,
    #[builder(into)]
    pub description: Option<String>,
    pub perks: Option<Vec<Option<String>>>,
    pub apartement_type: Option<Vec<Option<String>>>,
    #[builder(into)]
    pub extra_info: Option<String>,
    #[builder(into)]
    pub check_in: Option<String>,
    #[builder(into)]
    pub check_out: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub max_guests: i32,
    #[serde(default)]
    #[builder(default)]
    pub price: i32,
    pub reserved_dates: Option<Vec<Option<String>>>,
}

impl Event for AppartementCreatedEvent {
    const KIND: &'static str = "AppartementCreatedEvent";

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// 已知但无副作用的事件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullEvent {
    #[serde(flatten)]
    pub header: EventHeader,
}

impl Event for NullEvent {
    const KIND: &'static str = "NullEvent";

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_events_use_pascal_case_fields() {
        let event = UserCreatedEvent::builder()
            .user_id("u1")
            .username("alice")
            .email("alice@example.com")
            .build();
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["UserId"], "u1");
        assert_eq!(json["Username"], "alice");
        assert_eq!(json["EventId"], event.event_id());
        assert!(json["PhoneNumber"].is_null());
    }

    #[test]
    fn reservation_reads_producer_payload() {
        let payload = r#"{
            "EventId": "evt-r1",
            "PublishedTime": "2024-05-01T08:00:00Z",
            "_id": "r1",
            "appartement": "p1",
            "user": "u2",
            "checkIn": "2024-06-01",
            "checkOut": "2024-06-07",
            "numberOfGuests": "2"
        }"#;
        let event: ReservationCreatedEvent = serde_json::from_str(payload).unwrap();

        assert_eq!(event.event_id(), "evt-r1");
        assert_eq!(event.id, "r1");
        assert_eq!(event.appartement, "p1");
        assert_eq!(event.check_in.as_deref(), Some("2024-06-01"));
        assert_eq!(event.number_of_guests.as_deref(), Some("2"));
        assert!(event.email.is_none());
    }

    #[test]
    fn appartement_defaults_missing_numbers() {
        let payload = r#"{
            "EventId": "evt-a1",
            "PublishedTime": "2024-05-01T08:00:00Z",
            "_id": "p1",
            "owner": "u1",
            "title": "Sea view",
            "photos": ["a.png", null],
            "apartementType": ["studio"]
        }"#;
        let event: AppartementCreatedEvent = serde_json::from_str(payload).unwrap();

        assert_eq!(event.max_guests, 0);
        assert_eq!(event.price, 0);
        assert_eq!(event.photos.as_ref().map(Vec::len), Some(2));
        assert_eq!(event.title.as_deref(), Some("Sea view"));
    }

    #[test]
    fn missing_required_field_fails_to_decode() {
        let payload = r#"{"EventId":"evt-x","PublishedTime":"2024-05-01T08:00:00Z","_id":"r1"}"#;
        assert!(serde_json::from_str::<ReservationCreatedEvent>(payload).is_err());
    }
}
