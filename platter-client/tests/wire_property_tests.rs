//! Property tests for the wire format.

use platter_client::status_to_engine_error;
use platter_client::wire::ListEnvelope;
use platter_core::{EngineError, PaginationCursor, Rating};
use proptest::prelude::*;

proptest! {
    /// The pagination object maps field-for-field onto the cursor.
    #[test]
    fn pagination_object_maps_exactly(
        total in 0u64..10_000,
        page in 1u32..500,
        limit in 1u32..100,
    ) {
        let expected = PaginationCursor::for_local(total, page, limit);
        let json = format!(
            r#"{{"ratings":[],"pagination":{{"total":{},"page":{},"limit":{},"total_pages":{},"has_next":{},"has_prev":{}}}}}"#,
            expected.total,
            expected.page,
            expected.limit,
            expected.total_pages,
            expected.has_next,
            expected.has_prev,
        );
        let envelope: ListEnvelope<Rating> = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(envelope.pagination, expected);
    }

    /// A 401 is only a session expiry when a bearer token was sent.
    #[test]
    fn unauthorized_depends_on_regime(authenticated in any::<bool>(), message in "[a-z ]{0,20}") {
        let err = status_to_engine_error(401, message, None, authenticated, "load");
        if authenticated {
            prop_assert!(matches!(err, EngineError::SessionExpired));
        } else {
            prop_assert!(matches!(err, EngineError::Unauthorized { .. }), "unexpected {:?}", err);
        }
    }

    /// Unclassified statuses keep their code.
    #[test]
    fn server_statuses_preserved(status in 500u16..600) {
        let err = status_to_engine_error(status, String::new(), None, false, "load");
        prop_assert!(matches!(err, EngineError::Server { status: s, .. } if s == status), "unexpected {:?}", err);
    }
}
