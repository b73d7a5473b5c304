//! ComponentService: validate/load/invoke/persist/publish for `Component`.

use std::sync::Arc;

use crate::domain::aggregate::AggregateRoot;
use crate::domain::component::{
    Component, ComponentStatus, NewComponent, RelatedComponent, RevisionStatus, Specification,
};
use crate::domain::repository::{Page, Repository};
use crate::error::{AppError, AppResult};
use crate::events::SharedEventBus;

pub struct CreateComponentInput {
    pub part_number: String,
    pub name: String,
    pub description: String,
    pub supplier_id: Option<String>,
    pub category: String,
    pub unit_of_measure: String,
    pub specifications: Vec<Specification>,
}

pub struct ComponentService {
    repository: Arc<dyn Repository<Component>>,
    events: SharedEventBus,
}

impl ComponentService {
    pub fn new(repository: Arc<dyn Repository<Component>>, events: SharedEventBus) -> Self {
        Self { repository, events }
    }

    /// `partNumber` must be unique across the catalog; a duplicate surfaces
    /// as `conflict` from the backing repository/index rather than being
    /// re-checked here, so there is exactly one source of truth for
    /// uniqueness (§3, §4.6).
    pub async fn create(&self, input: CreateComponentInput) -> AppResult<Component> {
        let existing = self
            .repository
            .list(&|c: &Component| c.part_number == input.part_number, 0, 1)
            .await?;
        if existing.total > 0 {
            return Err(AppError::conflict(format!(
                "part number {} already exists",
                input.part_number
            )));
        }

        let mut component = Component::create(NewComponent {
            id: uuid::Uuid::new_v4().to_string(),
            part_number: input.part_number,
            name: input.name,
            description: input.description,
            supplier_id: input.supplier_id,
            category: input.category,
            unit_of_measure: input.unit_of_measure,
            specifications: input.specifications,
        })?;

        let saved = self.repository.insert(component.clone()).await?;
        self.events.publish_all(component.take_events());
        Ok(saved)
    }

    pub async fn get(&self, id: &str) -> AppResult<Component> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("component {id} not found")))
    }

    pub async fn list(
        &self,
        category: Option<String>,
        offset: usize,
        limit: usize,
    ) -> AppResult<Page<Component>> {
        let predicate = move |component: &Component| match &category {
            Some(category) => &component.category == category,
            None => true,
        };
        self.repository.list(&predicate, offset, limit).await
    }

    /// Appends a new `Draft` revision, auto-incrementing the patch version
    /// with rollover at 10 (§3, §4.5).
    pub async fn revise(&self, id: &str, notes: String) -> AppResult<Component> {
        let mut component = self.get(id).await?;
        component.add_revision(notes)?;
        let saved = self.repository.save(component.clone()).await?;
        self.events.publish_all(component.take_events());
        Ok(saved)
    }

    /// Moves the latest revision through its own lifecycle; approving
    /// requires `approved_by` (§3).
    pub async fn transition_revision(
        &self,
        id: &str,
        next: RevisionStatus,
        approved_by: Option<String>,
    ) -> AppResult<Component> {
        let mut component = self.get(id).await?;
        component.transition_revision(next, approved_by)?;
        let saved = self.repository.save(component.clone()).await?;
        self.events.publish_all(component.take_events());
        Ok(saved)
    }

    pub async fn add_specification(&self, id: &str, spec: Specification) -> AppResult<Component> {
        let mut component = self.get(id).await?;
        component.add_specification(spec)?;
        let saved = self.repository.save(component.clone()).await?;
        self.events.publish_all(component.take_events());
        Ok(saved)
    }

    pub async fn add_related_component(
        &self,
        id: &str,
        related: RelatedComponent,
    ) -> AppResult<Component> {
        let mut component = self.get(id).await?;
        component.add_related_component(related)?;
        let saved = self.repository.save(component.clone()).await?;
        self.events.publish_all(component.take_events());
        Ok(saved)
    }

    pub async fn transition_status(&self, id: &str, next: ComponentStatus) -> AppResult<Component> {
        let mut component = self.get(id).await?;
        component.transition_to(next)?;
        let saved = self.repository.save(component.clone()).await?;
        self.events.publish_all(component.take_events());
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        if !self.repository.delete(id).await? {
            return Err(AppError::not_found(format!("component {id} not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::RelatedComponentType;
    use crate::domain::repository::InMemoryRepository;
    use crate::events::EventBus;

    fn service() -> ComponentService {
        ComponentService::new(Arc::new(InMemoryRepository::new()), Arc::new(EventBus::new(16)))
    }

    fn create_input() -> CreateComponentInput {
        CreateComponentInput {
            part_number: "PN-1".into(),
            name: "Bracket".into(),
            description: "".into(),
            supplier_id: None,
            category: "hardware".into(),
            unit_of_measure: "each".into(),
            specifications: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_part_number() {
        let service = service();
        service.create(create_input()).await.unwrap();
        let err = service.create(create_input()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn revise_then_get_reflects_new_revision() {
        let service = service();
        let created = service.create(create_input()).await.unwrap();
        service.revise(created.id(), "tolerance update".into()).await.unwrap();
        let fetched = service.get(created.id()).await.unwrap();
        assert_eq!(fetched.current_revision().unwrap().version, semver::Version::new(1, 0, 1));
    }

    #[tokio::test]
    async fn transition_revision_to_approved_requires_approver() {
        let service = service();
        let created = service.create(create_input()).await.unwrap();
        service
            .transition_revision(created.id(), RevisionStatus::Review, None)
            .await
            .unwrap();
        let err = service
            .transition_revision(created.id(), RevisionStatus::Approved, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);

        let approved = service
            .transition_revision(created.id(), RevisionStatus::Approved, Some("qa-lead".into()))
            .await
            .unwrap();
        assert_eq!(approved.current_revision().unwrap().status, RevisionStatus::Approved);
    }

    #[tokio::test]
    async fn add_related_component_rejects_duplicates() {
        let service = service();
        let created = service.create(create_input()).await.unwrap();
        let link = RelatedComponent { component_id: "PN-2".into(), relation: RelatedComponentType::Assembly };
        service.add_related_component(created.id(), link.clone()).await.unwrap();
        let err = service.add_related_component(created.id(), link).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }
}
