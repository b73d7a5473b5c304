// Integration tests for the domain service layer wired against the cache
// engine and event bus, the way `main.rs` assembles them.

#[cfg(test)]
mod domain_platform_integration_tests {
    use std::sync::Arc;

    use aerosuite_platform::cache::{keys, CacheEngine};
    use aerosuite_platform::domain::aggregate::AggregateRoot;
    use aerosuite_platform::domain::component::{Component, ComponentStatus};
    use aerosuite_platform::domain::customer::{Customer, NewCustomer};
    use aerosuite_platform::domain::inspection::InspectionStatus;
    use aerosuite_platform::domain::repository::{CachedRepository, InMemoryRepository, Repository};
    use aerosuite_platform::domain::services::{
        ComponentService, CreateComponentInput, CreateCustomerInput, CreateInspectionInput,
        CustomerService, InspectionService,
    };
    use aerosuite_platform::events::EventBus;

    fn inspection_input() -> CreateInspectionInput {
        CreateInspectionInput {
            title: "Incoming casting inspection".into(),
            description: "First article".into(),
            customer_id: Some("CUST-1".into()),
            supplier_id: None,
            component_id: None,
            scheduled_date: "2030-01-01T00:00:00Z".parse().unwrap(),
            location: "Bay 3".into(),
            inspection_type: "incoming".into(),
        }
    }

    async fn seeded_customer_repo() -> Arc<dyn Repository<Customer>> {
        let repo: Arc<dyn Repository<Customer>> = Arc::new(InMemoryRepository::new());
        let customer = Customer::create(NewCustomer {
            id: "CUST-1".into(),
            name: "Acme Aerostructures".into(),
            email: "quality@acme.example".into(),
            phone: None,
            billing_address: None,
        })
        .unwrap();
        repo.insert(customer).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn create_inspection_is_observable_on_event_bus() {
        let events = Arc::new(EventBus::new(16));
        let service = InspectionService::new(
            Arc::new(InMemoryRepository::new()),
            seeded_customer_repo().await,
            Arc::new(InMemoryRepository::new()),
            events.clone(),
        );
        let mut subscriber = events.subscribe();

        let created = service.create(inspection_input()).await.unwrap();
        assert_eq!(created.status, InspectionStatus::Scheduled);

        let envelope = subscriber.try_recv().expect("InspectionCreated should be published");
        assert_eq!(envelope.event_type, "InspectionCreated");
        assert_eq!(envelope.aggregate_id, created.id());
    }

    #[tokio::test]
    async fn invalid_status_transition_leaves_aggregate_unchanged_and_raises_validation() {
        let events = Arc::new(EventBus::new(16));
        let service = InspectionService::new(
            Arc::new(InMemoryRepository::new()),
            seeded_customer_repo().await,
            Arc::new(InMemoryRepository::new()),
            events,
        );
        let created = service.create(inspection_input()).await.unwrap();

        service.transition_status(created.id(), InspectionStatus::Cancelled).await.unwrap();
        let err = service
            .transition_status(created.id(), InspectionStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), aerosuite_platform::error::ErrorKind::Validation);
        assert!(err.message.contains("invalid status transition"));

        let unchanged = service.get(created.id()).await.unwrap();
        assert_eq!(unchanged.status, InspectionStatus::Cancelled);
    }

    #[tokio::test]
    async fn repeated_get_is_a_cache_hit_and_update_invalidates_it() {
        let cache = CacheEngine::new();
        let inner = Arc::new(InMemoryRepository::new());
        let repository = Arc::new(CachedRepository::new(inner, cache.clone(), "inspection"));
        let events = Arc::new(EventBus::new(16));
        let service = InspectionService::new(
            repository,
            seeded_customer_repo().await,
            Arc::new(InMemoryRepository::new()) as Arc<dyn Repository<Component>>,
            events,
        );

        let created = service.create(inspection_input()).await.unwrap();
        let id = created.id().to_string();

        // First GET populates the cache (miss), second is served from it (hit).
        service.get(&id).await.unwrap();
        let after_first_get = cache.stats();
        service.get(&id).await.unwrap();
        let after_second_get = cache.stats();
        assert!(after_second_get.hits > after_first_get.hits);

        // A write must invalidate the entity key so the next read reflects
        // the new state rather than the cached one (§8 scenario 4).
        service
            .transition_status(&id, InspectionStatus::InProgress)
            .await
            .unwrap();
        assert!(cache.get(&keys::entity("inspection", &id)).is_none());

        let refreshed = service.get(&id).await.unwrap();
        assert_eq!(refreshed.status, InspectionStatus::InProgress);
    }

    #[tokio::test]
    async fn duplicate_customer_email_is_rejected_with_conflict() {
        let events = Arc::new(EventBus::new(16));
        let service = CustomerService::new(Arc::new(InMemoryRepository::new()), events);

        service
            .create(CreateCustomerInput {
                name: "Acme Aerostructures".into(),
                email: "quality@acme.example".into(),
                phone: None,
                billing_address: None,
            })
            .await
            .unwrap();

        let err = service
            .create(CreateCustomerInput {
                name: "Acme Again".into(),
                email: "quality@acme.example".into(),
                phone: None,
                billing_address: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), aerosuite_platform::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn component_revision_and_status_transition_round_trip() {
        let events = Arc::new(EventBus::new(16));
        let service = ComponentService::new(Arc::new(InMemoryRepository::new()), events);

        let component = service
            .create(CreateComponentInput {
                part_number: "PN-100".into(),
                name: "Bracket".into(),
                description: "Titanium mount bracket".into(),
                supplier_id: None,
                category: "hardware".into(),
                unit_of_measure: "each".into(),
                specifications: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(component.current_revision().unwrap().version, semver::Version::new(1, 0, 0));

        let revised = service.revise(component.id(), "minor tolerance update".into()).await.unwrap();
        assert_eq!(revised.current_revision().unwrap().version, semver::Version::new(1, 0, 1));

        service
            .transition_status(component.id(), ComponentStatus::Active)
            .await
            .unwrap();
        let transitioned = service
            .transition_status(component.id(), ComponentStatus::Obsolete)
            .await
            .unwrap();
        assert_eq!(transitioned.status, ComponentStatus::Obsolete);
    }
}
