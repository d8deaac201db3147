//! Wire envelopes and request paths of the review API.

use platter_core::{FavoriteAction, Page, PaginationCursor, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};

/// Paginated list response. The item array is named after the collection
/// (`ratings`, `comments`, `favorites`) depending on the endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvelope<T> {
    #[serde(
        alias = "ratings",
        alias = "comments",
        alias = "favorites",
        alias = "data"
    )]
    pub items: Vec<T>,
    pub pagination: PaginationCursor,
}

impl<T> From<ListEnvelope<T>> for Page<T> {
    fn from(envelope: ListEnvelope<T>) -> Self {
        Page {
            items: envelope.items,
            pagination: envelope.pagination,
        }
    }
}

/// Single-record response, either bare or wrapped in a named field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ItemEnvelope<T> {
    Wrapped {
        #[serde(alias = "rating", alias = "comment", alias = "stats")]
        data: T,
    },
    Bare(T),
}

impl<T> ItemEnvelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(value) => value,
        }
    }
}

/// Error body returned with non-success statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Best human-readable message from a raw body.
    pub fn message_from(text: &str) -> String {
        match serde_json::from_str::<ErrorBody>(text) {
            Ok(body) => body
                .message
                .or(body.error)
                .unwrap_or_else(|| text.trim().to_string()),
            Err(_) => text.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FavoriteRequest {
    pub action: FavoriteAction,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageQuery {
    pub page: u32,
    pub limit: u32,
}

pub mod routes {
    //! Path builders, relative to the configured base URL.

    use super::*;

    pub fn ratings(kind: ResourceKind, id: &ResourceId) -> String {
        format!("/{}/{}/ratings", kind.as_path(), id)
    }

    pub fn comments(kind: ResourceKind, id: &ResourceId) -> String {
        format!("/{}/{}/comments", kind.as_path(), id)
    }

    pub fn rate(kind: ResourceKind, id: &ResourceId, anonymous: bool) -> String {
        if anonymous {
            format!("/anonymous/ratings/{}/{}", kind.as_path(), id)
        } else {
            format!("/{}/{}/rate", kind.as_path(), id)
        }
    }

    pub fn comment(kind: ResourceKind, id: &ResourceId, anonymous: bool) -> String {
        if anonymous {
            format!("/anonymous/comments/{}/{}", kind.as_path(), id)
        } else {
            format!("/{}/{}/comment", kind.as_path(), id)
        }
    }

    pub fn rating_item(kind: ResourceKind, rating_id: &str) -> String {
        format!("/{}/ratings/{}", kind.as_path(), rating_id)
    }

    pub fn comment_item(kind: ResourceKind, comment_id: &str) -> String {
        format!("/{}/comments/{}", kind.as_path(), comment_id)
    }

    pub fn favorite(kind: ResourceKind, id: &ResourceId, anonymous: bool) -> String {
        if anonymous {
            format!("/anonymous/favorites/{}/{}", kind.as_path(), id)
        } else {
            format!("/{}/{}/favorite", kind.as_path(), id)
        }
    }

    pub fn favorites() -> String {
        "/favorites".to_string()
    }

    pub fn stats(kind: ResourceKind, id: &ResourceId) -> String {
        format!("/{}/{}/stats", kind.as_path(), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platter_core::{AggregateStats, Rating};

    #[test]
    fn test_list_envelope_accepts_named_array() {
        let json = r#"{
            "ratings": [{"id":"r1","dishId":"d1","rating":4,"comment":"great","anonymous":true,"deviceId":"dev-123","timestamp":"2024-05-01T12:00:00Z"}],
            "pagination": {"total":1,"page":1,"limit":10,"total_pages":1,"has_next":false,"has_prev":false}
        }"#;
        let envelope: ListEnvelope<Rating> = serde_json::from_str(json).unwrap();
        let page: Page<Rating> = envelope.into();
        assert_eq!(page.items[0].id, "r1");
        assert_eq!(page.items[0].resource_id.as_str(), "d1");
        assert!(!page.pagination.has_next);
    }

    #[test]
    fn test_item_envelope_bare_and_wrapped() {
        let bare = r#"{"id":"r1","restaurantId":"x","rating":5,"userId":"u-1","timestamp":"2024-05-01T12:00:00Z"}"#;
        let rating = serde_json::from_str::<ItemEnvelope<Rating>>(bare).unwrap().into_inner();
        assert_eq!(rating.resource_id.as_str(), "x");

        let wrapped = format!(r#"{{"rating": {bare}}}"#);
        let rating = serde_json::from_str::<ItemEnvelope<Rating>>(&wrapped)
            .unwrap()
            .into_inner();
        assert_eq!(rating.id, "r1");

        let stats = r#"{"stats":{"averageRating":3.5,"totalRatings":2,"totalComments":0}}"#;
        let stats = serde_json::from_str::<ItemEnvelope<AggregateStats>>(stats)
            .unwrap()
            .into_inner();
        assert_eq!(stats.total_ratings, 2);
    }

    #[test]
    fn test_error_body_message() {
        assert_eq!(
            ErrorBody::message_from(r#"{"error":"Conflict","message":"Already rated"}"#),
            "Already rated"
        );
        assert_eq!(ErrorBody::message_from(r#"{"error":"Nope"}"#), "Nope");
        assert_eq!(ErrorBody::message_from("plain text "), "plain text");
    }

    #[test]
    fn test_routes() {
        let d1 = ResourceId::from("d1");
        assert_eq!(routes::rate(ResourceKind::Dish, &d1, true), "/anonymous/ratings/dish/d1");
        assert_eq!(routes::rate(ResourceKind::Dish, &d1, false), "/dish/d1/rate");
        assert_eq!(
            routes::favorite(ResourceKind::Restaurant, &ResourceId::from("r1"), true),
            "/anonymous/favorites/restaurant/r1"
        );
        assert_eq!(routes::comment_item(ResourceKind::Dish, "c9"), "/dish/comments/c9");
        assert_eq!(routes::stats(ResourceKind::Dish, &d1), "/dish/d1/stats");
    }

    #[test]
    fn test_favorite_request_body() {
        let body = serde_json::to_string(&FavoriteRequest {
            action: FavoriteAction::Toggle,
        })
        .unwrap();
        assert_eq!(body, r#"{"action":"toggle"}"#);
    }
}
