//! CustomerService: validate/load/invoke/persist/publish for `Customer`.

use std::sync::Arc;

use crate::domain::aggregate::AggregateRoot;
use crate::domain::customer::{Customer, NewCustomer};
use crate::domain::repository::{Page, Repository};
use crate::error::{AppError, AppResult};
use crate::events::SharedEventBus;

pub struct CreateCustomerInput {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub billing_address: Option<String>,
}

pub struct CustomerService {
    repository: Arc<dyn Repository<Customer>>,
    events: SharedEventBus,
}

impl CustomerService {
    pub fn new(repository: Arc<dyn Repository<Customer>>, events: SharedEventBus) -> Self {
        Self { repository, events }
    }

    /// Email must be unique (case-insensitively, since `Customer::create`
    /// already lowercases it) across the customer base (§3, §4.6).
    pub async fn create(&self, input: CreateCustomerInput) -> AppResult<Customer> {
        let email = input.email.trim().to_lowercase();
        let existing = self.repository.list(&|c: &Customer| c.email == email, 0, 1).await?;
        if existing.total > 0 {
            return Err(AppError::conflict(format!("email {email} is already in use")));
        }

        let mut customer = Customer::create(NewCustomer {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            email: input.email,
            phone: input.phone,
            billing_address: input.billing_address,
        })?;

        let saved = self.repository.insert(customer.clone()).await?;
        self.events.publish_all(customer.take_events());
        Ok(saved)
    }

    pub async fn get(&self, id: &str) -> AppResult<Customer> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("customer {id} not found")))
    }

    pub async fn list(&self, offset: usize, limit: usize) -> AppResult<Page<Customer>> {
        self.repository.list(&|_: &Customer| true, offset, limit).await
    }

    pub async fn update_contact(
        &self,
        id: &str,
        phone: Option<String>,
        billing_address: Option<String>,
    ) -> AppResult<Customer> {
        let mut customer = self.get(id).await?;
        customer.update_contact(phone, billing_address);
        let saved = self.repository.save(customer.clone()).await?;
        self.events.publish_all(customer.take_events());
        Ok(saved)
    }

    pub async fn deactivate(&self, id: &str) -> AppResult<Customer> {
        let mut customer = self.get(id).await?;
        customer.deactivate();
        let saved = self.repository.save(customer.clone()).await?;
        self.events.publish_all(customer.take_events());
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        if !self.repository.delete(id).await? {
            return Err(AppError::not_found(format!("customer {id} not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::InMemoryRepository;
    use crate::events::EventBus;

    fn service() -> CustomerService {
        CustomerService::new(Arc::new(InMemoryRepository::new()), Arc::new(EventBus::new(16)))
    }

    fn create_input() -> CreateCustomerInput {
        CreateCustomerInput {
            name: "Acme".into(),
            email: "ops@acme.com".into(),
            phone: None,
            billing_address: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email_case_insensitively() {
        let service = service();
        service.create(create_input()).await.unwrap();
        let mut dup = create_input();
        dup.email = "OPS@ACME.com".into();
        let err = service.create(dup).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }
}
