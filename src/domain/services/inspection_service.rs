//! InspectionService: validate/load/invoke/persist/publish for `Inspection`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::aggregate::AggregateRoot;
use crate::domain::component::Component;
use crate::domain::customer::Customer;
use crate::domain::inspection::{
    Defect, Inspection, InspectionItem, InspectionStatus, NewInspection,
};
use crate::domain::repository::{Page, Repository};
use crate::error::{AppError, AppResult};
use crate::events::SharedEventBus;

pub struct CreateInspectionInput {
    pub title: String,
    pub description: String,
    pub customer_id: Option<String>,
    pub supplier_id: Option<String>,
    pub component_id: Option<String>,
    pub scheduled_date: DateTime<Utc>,
    pub location: String,
    pub inspection_type: String,
}

pub struct InspectionService {
    repository: Arc<dyn Repository<Inspection>>,
    customers: Arc<dyn Repository<Customer>>,
    components: Arc<dyn Repository<Component>>,
    events: SharedEventBus,
}

impl InspectionService {
    pub fn new(
        repository: Arc<dyn Repository<Inspection>>,
        customers: Arc<dyn Repository<Customer>>,
        components: Arc<dyn Repository<Component>>,
        events: SharedEventBus,
    ) -> Self {
        Self { repository, customers, components, events }
    }

    /// Cross-reference existence checks §4.6: a customer/supplier/component
    /// id named on an inspection must resolve to a real record before the
    /// inspection is allowed to reference it.
    async fn check_references(&self, input: &CreateInspectionInput) -> AppResult<()> {
        if let Some(customer_id) = &input.customer_id {
            if self.customers.find_by_id(customer_id).await?.is_none() {
                return Err(AppError::not_found(format!("customer {customer_id} not found")));
            }
        }
        if let Some(supplier_id) = &input.supplier_id {
            if self.customers.find_by_id(supplier_id).await?.is_none() {
                return Err(AppError::not_found(format!("supplier {supplier_id} not found")));
            }
        }
        if let Some(component_id) = &input.component_id {
            if self.components.find_by_id(component_id).await?.is_none() {
                return Err(AppError::not_found(format!("component {component_id} not found")));
            }
        }
        Ok(())
    }

    /// Step 1-2 (field validation happens inside `Inspection::create`; the
    /// cross-reference checks above are the "load" step for a creation) +
    /// 3-5 (invoke/persist/publish).
    pub async fn create(&self, input: CreateInspectionInput) -> AppResult<Inspection> {
        self.check_references(&input).await?;

        let mut inspection = Inspection::create(NewInspection {
            id: uuid::Uuid::new_v4().to_string(),
            title: input.title,
            description: input.description,
            customer_id: input.customer_id,
            supplier_id: input.supplier_id,
            component_id: input.component_id,
            scheduled_date: input.scheduled_date,
            location: input.location,
            inspection_type: input.inspection_type,
        })?;

        let saved = self.repository.insert(inspection.clone()).await?;
        self.events.publish_all(inspection.take_events());
        Ok(saved)
    }

    pub async fn get(&self, id: &str) -> AppResult<Inspection> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("inspection {id} not found")))
    }

    pub async fn list(
        &self,
        status: Option<InspectionStatus>,
        offset: usize,
        limit: usize,
    ) -> AppResult<Page<Inspection>> {
        let predicate = move |inspection: &Inspection| match status {
            Some(s) => inspection.status == s,
            None => true,
        };
        self.repository.list(&predicate, offset, limit).await
    }

    /// Load, invoke the validated transition, persist, publish (§4.6).
    pub async fn transition_status(&self, id: &str, next: InspectionStatus) -> AppResult<Inspection> {
        let mut inspection = self.get(id).await?;
        inspection.transition_to(next)?;
        let saved = self.repository.save(inspection.clone()).await?;
        self.events.publish_all(inspection.take_events());
        Ok(saved)
    }

    pub async fn add_item(&self, id: &str, item: InspectionItem) -> AppResult<Inspection> {
        let mut inspection = self.get(id).await?;
        inspection.add_item(item);
        let saved = self.repository.save(inspection.clone()).await?;
        self.events.publish_all(inspection.take_events());
        Ok(saved)
    }

    pub async fn add_defect(&self, id: &str, defect: Defect) -> AppResult<Inspection> {
        let mut inspection = self.get(id).await?;
        inspection.add_defect(defect);
        let saved = self.repository.save(inspection.clone()).await?;
        self.events.publish_all(inspection.take_events());
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        if !self.repository.delete(id).await? {
            return Err(AppError::not_found(format!("inspection {id} not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::NewCustomer;
    use crate::domain::repository::InMemoryRepository;
    use crate::events::EventBus;

    async fn service_with_seeded_customer() -> InspectionService {
        let customers: Arc<dyn Repository<Customer>> = Arc::new(InMemoryRepository::new());
        let customer = Customer::create(NewCustomer {
            id: "C1".into(),
            name: "Acme".into(),
            email: "ops@acme.com".into(),
            phone: None,
            billing_address: None,
        })
        .unwrap();
        customers.insert(customer).await.unwrap();

        InspectionService::new(
            Arc::new(InMemoryRepository::new()),
            customers,
            Arc::new(InMemoryRepository::new()),
            Arc::new(EventBus::new(16)),
        )
    }

    fn service_without_seeded_customer() -> InspectionService {
        InspectionService::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(InMemoryRepository::new()),
            Arc::new(InMemoryRepository::new()),
            Arc::new(EventBus::new(16)),
        )
    }

    fn create_input() -> CreateInspectionInput {
        CreateInspectionInput {
            title: "Incoming inspection".into(),
            description: "".into(),
            customer_id: Some("C1".into()),
            supplier_id: None,
            component_id: None,
            scheduled_date: Utc::now(),
            location: "Dock 1".into(),
            inspection_type: "incoming".into(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let service = service_with_seeded_customer().await;
        let created = service.create(create_input()).await.unwrap();
        let fetched = service.get(&created.id().to_string()).await.unwrap();
        assert_eq!(fetched.title, "Incoming inspection");
    }

    #[tokio::test]
    async fn create_rejects_unknown_customer_reference() {
        let service = service_without_seeded_customer();
        let err = service.create(create_input()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let service = service_with_seeded_customer().await;
        let created = service.create(create_input()).await.unwrap();
        let err = service
            .transition_status(created.id(), InspectionStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let service = service_with_seeded_customer().await;
        let created = service.create(create_input()).await.unwrap();
        service
            .transition_status(created.id(), InspectionStatus::InProgress)
            .await
            .unwrap();

        let scheduled = service.list(Some(InspectionStatus::Scheduled), 0, 10).await.unwrap();
        assert_eq!(scheduled.total, 0);
        let in_progress = service.list(Some(InspectionStatus::InProgress), 0, 10).await.unwrap();
        assert_eq!(in_progress.total, 1);
    }
}
