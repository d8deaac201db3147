use platter_core::validation::{validate_comment, validate_rating};
use platter_core::{
    CachedItem, EngineConfig, Identity, DeviceId, PaginationCursor, Rating, RatingDraft,
    ResourceId, ValidationError,
};
use chrono::Utc;
use proptest::prelude::*;

proptest! {
    // ========================================================================
    // Local pagination covers every item exactly once
    // ========================================================================
    #[test]
    fn local_cursor_pages_cover_total(total in 0u64..500, limit in 1u32..50) {
        let first = PaginationCursor::for_local(total, 1, limit);
        let mut covered = 0u64;
        for page in 1..=first.total_pages.max(1) {
            let cursor = PaginationCursor::for_local(total, page, limit);
            let start = u64::from(page - 1) * u64::from(limit);
            let on_page = total.saturating_sub(start).min(u64::from(limit));
            covered += on_page;
            prop_assert_eq!(cursor.has_next, page < cursor.total_pages);
            prop_assert_eq!(cursor.has_prev, page > 1);
        }
        prop_assert_eq!(covered, total);
    }

    #[test]
    fn rating_validation_matches_range(value in any::<u8>()) {
        let result = validate_rating(value);
        if (1..=5).contains(&value) {
            prop_assert!(result.is_ok());
        } else {
            prop_assert_eq!(result, Err(ValidationError::RatingOutOfRange { value }));
        }
    }

    #[test]
    fn comment_validation_respects_bounds(len in 0usize..700) {
        let config = EngineConfig::default();
        let text = "a".repeat(len);
        let result = validate_comment(&text, &config);
        let expected_ok = len >= config.comment_min_chars && len <= config.comment_max_chars;
        prop_assert_eq!(result.is_ok(), expected_ok);
    }

    #[test]
    fn provisional_ratings_have_distinct_ids(rating in 1u8..=5) {
        let identity = Identity::anonymous(DeviceId::from("dev-prop"));
        let draft = RatingDraft::new(rating);
        let a = Rating::provisional(ResourceId::from("d1"), &draft, &identity, Utc::now());
        let b = Rating::provisional(ResourceId::from("d1"), &draft, &identity, Utc::now());
        prop_assert_ne!(a.item_id(), b.item_id());
        prop_assert!(a.owner_is_consistent());
    }
}
