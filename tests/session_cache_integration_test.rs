// Integration tests for the session store's fingerprint protection and the
// cache engine's tag/entity invalidation, wired the way `AppState` holds them.

#[cfg(test)]
mod session_cache_integration_tests {
    use std::time::Duration;

    use aerosuite_platform::cache::{keys, CacheEngine, SetOptions};
    use aerosuite_platform::session::{LoadOutcome, SessionStore};

    #[test]
    fn fingerprint_mismatch_revokes_the_session() {
        let store = SessionStore::new(Duration::from_secs(3600), Duration::from_secs(900));
        let session = store.create("user-1", "device-fingerprint-a");

        let err = store
            .load_verified(&session.session_id, "device-fingerprint-b")
            .unwrap_err();
        assert_eq!(err.kind(), aerosuite_platform::error::ErrorKind::Unauthorized);

        // The mismatch revokes the session outright, so even the correct
        // fingerprint can no longer load it.
        match store.load(&session.session_id) {
            LoadOutcome::Unknown => {}
            other => panic!("expected session to be revoked, got {other:?}"),
        }
    }

    #[test]
    fn matching_fingerprint_loads_and_touch_updates_last_seen() {
        let store = SessionStore::new(Duration::from_secs(3600), Duration::from_secs(900));
        let session = store.create("user-1", "device-fingerprint-a");

        let loaded = store
            .load_verified(&session.session_id, "device-fingerprint-a")
            .unwrap();
        assert_eq!(loaded.principal_id, "user-1");

        store.touch(&session.session_id).unwrap();
        let touched = store
            .load_verified(&session.session_id, "device-fingerprint-a")
            .unwrap();
        assert!(touched.last_seen_at >= loaded.last_seen_at);
    }

    #[test]
    fn rotate_revokes_the_old_session_id() {
        let store = SessionStore::new(Duration::from_secs(3600), Duration::from_secs(900));
        let session = store.create("user-1", "device-fingerprint-a");
        let rotated = store.rotate(&session.session_id).unwrap();

        assert_ne!(rotated.session_id, session.session_id);
        match store.load(&session.session_id) {
            LoadOutcome::Unknown => {}
            other => panic!("expected old session id to be revoked, got {other:?}"),
        }
    }

    #[test]
    fn tag_invalidation_clears_every_key_stamped_with_that_tag_but_leaves_others() {
        let cache = CacheEngine::new();

        cache.set(
            keys::list("inspection", "status=scheduled"),
            serde_json::json!([{"id": "insp-1"}]),
            SetOptions::new().tags(vec![keys::list_tag("inspection")]),
        );
        cache.set(
            keys::list("inspection", "status=completed"),
            serde_json::json!([{"id": "insp-2"}]),
            SetOptions::new().tags(vec![keys::list_tag("inspection")]),
        );
        cache.set(
            keys::entity("customer", "cust-1"),
            serde_json::json!({"id": "cust-1"}),
            SetOptions::new().entity_tag(keys::entity("customer", "cust-1")),
        );

        let cleared = cache.invalidate_by_tag(&keys::list_tag("inspection"));
        assert_eq!(cleared, 2);
        assert!(cache.get(&keys::list("inspection", "status=scheduled")).is_none());
        assert!(cache.get(&keys::list("inspection", "status=completed")).is_none());
        // Untagged-by-this-invalidation key is untouched.
        assert!(cache.get(&keys::entity("customer", "cust-1")).is_some());
    }

    #[test]
    fn entity_invalidation_clears_only_keys_stamped_with_that_entity_tag() {
        let cache = CacheEngine::new();
        let entity_tag = keys::entity("inspection", "insp-1");

        cache.set(
            entity_tag.clone(),
            serde_json::json!({"id": "insp-1", "status": "scheduled"}),
            SetOptions::new().entity_tag(entity_tag.clone()),
        );
        cache.set(
            keys::status_tag("inspection", "scheduled"),
            serde_json::json!([{"id": "insp-1"}]),
            SetOptions::new().entity_tag(entity_tag.clone()),
        );
        cache.set(
            keys::entity("inspection", "insp-2"),
            serde_json::json!({"id": "insp-2"}),
            SetOptions::new().entity_tag(keys::entity("inspection", "insp-2")),
        );

        let cleared = cache.invalidate_entity(&entity_tag);
        assert_eq!(cleared, 2);
        assert!(cache.get(&entity_tag).is_none());
        assert!(cache.get(&keys::status_tag("inspection", "scheduled")).is_none());
        assert!(cache.get(&keys::entity("inspection", "insp-2")).is_some());
    }
}
