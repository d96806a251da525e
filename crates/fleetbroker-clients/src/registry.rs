//! Marketplace registry client.
//!
//! The registry is the single source of truth for which service instances
//! exist. Its listing endpoints are paginated; every helper here follows
//! `next_url` until the last page.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use fleetbroker_core::{
    InstanceFilter, InstanceId, InstanceRecord, InstanceState, RegistryLastOperation,
    ServiceInstance,
};

use crate::error::ClientError;
use crate::http::{ensure_success, parse_json, Auth, HttpClient};

/// Operations the broker and the upgrader need from the registry.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Every instance of a service offering, optionally narrowed to an org/space.
    async fn list_instances(
        &self,
        offering_id: &str,
        filter: &InstanceFilter,
    ) -> Result<Vec<ServiceInstance>, ClientError>;

    /// Plan and in-flight flag of an instance, `None` if it does not exist.
    async fn get_instance_state(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<InstanceState>, ClientError>;

    /// Full record of an instance, `None` if it does not exist.
    async fn get_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<InstanceRecord>, ClientError>;

    /// Number of instances on a plan.
    async fn count_instances_of_plan(
        &self,
        offering_id: &str,
        plan_id: &str,
    ) -> Result<usize, ClientError>;

    /// Number of instances across every plan of an offering.
    async fn count_instances_of_offering(&self, offering_id: &str) -> Result<usize, ClientError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    total_results: usize,
    #[serde(default)]
    next_url: Option<String>,
    #[serde(default = "Vec::new")]
    resources: Vec<Resource<T>>,
}

#[derive(Debug, Deserialize)]
struct Resource<T> {
    metadata: Metadata,
    entity: T,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    unique_id: String,
}

#[derive(Debug, Deserialize)]
struct InstanceEntity {
    service_plan_url: String,
    #[serde(default)]
    last_operation: Option<RegistryLastOperation>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

/// A plan as resolved from the registry.
#[derive(Debug, Clone)]
struct RegistryPlan {
    guid: String,
    unique_id: String,
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the registry API.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: HttpClient,
}

impl RegistryClient {
    /// Create a new registry client using a bearer token.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: HttpClient::new(base_url, Auth::Bearer(token.to_string()), timeout)?,
        })
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Page<T>, ClientError> {
        let response = self
            .http
            .request(Method::GET, path)
            .query(query)
            .send()
            .await?;
        parse_json(ensure_success(response).await?).await
    }

    /// Collect every resource across all pages.
    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Resource<T>>, ClientError> {
        let mut page: Page<T> = self.fetch_page(path, query).await?;
        let mut resources = std::mem::take(&mut page.resources);

        while let Some(next) = page.next_url.take() {
            debug!(next_url = %next, "Following registry page");
            page = self.fetch_page(&next, &[]).await?;
            resources.append(&mut page.resources);
        }

        Ok(resources)
    }

    async fn offering_guids(&self, offering_id: &str) -> Result<Vec<String>, ClientError> {
        let services: Vec<Resource<Named>> = self
            .paginate("/v2/services", &[("q", format!("unique_id:{}", offering_id))])
            .await?;
        Ok(services.into_iter().map(|s| s.metadata.guid).collect())
    }

    async fn plans(&self, offering_id: &str) -> Result<Vec<RegistryPlan>, ClientError> {
        let mut plans = Vec::new();
        for service_guid in self.offering_guids(offering_id).await? {
            let resources: Vec<Resource<Named>> = self
                .paginate(&format!("/v2/services/{}/service_plans", service_guid), &[])
                .await?;
            plans.extend(resources.into_iter().map(|r| RegistryPlan {
                guid: r.metadata.guid,
                unique_id: r.entity.unique_id,
            }));
        }
        Ok(plans)
    }

    async fn count_plan_instances(&self, plan: &RegistryPlan) -> Result<usize, ClientError> {
        let page: Page<Empty> = self
            .fetch_page(
                &format!("/v2/service_plans/{}/service_instances", plan.guid),
                &[("results-per-page", "1".to_string())],
            )
            .await?;
        Ok(page.total_results)
    }

    async fn filter_query(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<(&'static str, String)>, ClientError> {
        let Some(org_name) = &filter.org_name else {
            return Ok(Vec::new());
        };

        let orgs: Vec<Resource<Empty>> = self
            .paginate("/v2/organizations", &[("q", format!("name:{}", org_name))])
            .await?;
        let org_guid = orgs
            .into_iter()
            .next()
            .map(|o| o.metadata.guid)
            .ok_or_else(|| ClientError::NotFound(format!("organization {}", org_name)))?;

        let Some(space_name) = &filter.space_name else {
            return Ok(vec![("q", format!("organization_guid:{}", org_guid))]);
        };

        let spaces: Vec<Resource<Empty>> = self
            .paginate(
                "/v2/spaces",
                &[
                    ("q", format!("name:{}", space_name)),
                    ("q", format!("organization_guid:{}", org_guid)),
                ],
            )
            .await?;
        let space_guid = spaces
            .into_iter()
            .next()
            .map(|s| s.metadata.guid)
            .ok_or_else(|| ClientError::NotFound(format!("space {}", space_name)))?;

        Ok(vec![("q", format!("space_guid:{}", space_guid))])
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn list_instances(
        &self,
        offering_id: &str,
        filter: &InstanceFilter,
    ) -> Result<Vec<ServiceInstance>, ClientError> {
        let query = self.filter_query(filter).await?;

        let mut instances = Vec::new();
        for plan in self.plans(offering_id).await? {
            let resources: Vec<Resource<Empty>> = self
                .paginate(
                    &format!("/v2/service_plans/{}/service_instances", plan.guid),
                    &query,
                )
                .await?;
            instances.extend(resources.into_iter().map(|r| ServiceInstance {
                guid: InstanceId::new(r.metadata.guid),
                plan_id: plan.unique_id.clone(),
            }));
        }

        debug!(offering_id = %offering_id, count = instances.len(), "Listed instances");
        Ok(instances)
    }

    async fn get_instance_state(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<InstanceState>, ClientError> {
        Ok(self.get_instance(instance_id).await?.map(|record| {
            let operation_in_progress = record.operation_in_progress();
            InstanceState {
                plan_id: record.plan_id,
                operation_in_progress,
            }
        }))
    }

    async fn get_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<InstanceRecord>, ClientError> {
        let resource: Option<Resource<InstanceEntity>> = self
            .http
            .get_optional_json(&format!("/v2/service_instances/{}", instance_id))
            .await?;
        let Some(resource) = resource else {
            return Ok(None);
        };

        let plan: Resource<Named> = self.http.get_json(&resource.entity.service_plan_url).await?;
        Ok(Some(InstanceRecord {
            plan_id: plan.entity.unique_id,
            last_operation: resource.entity.last_operation,
        }))
    }

    async fn count_instances_of_plan(
        &self,
        offering_id: &str,
        plan_id: &str,
    ) -> Result<usize, ClientError> {
        let mut total = 0;
        for plan in self.plans(offering_id).await? {
            if plan.unique_id == plan_id {
                total += self.count_plan_instances(&plan).await?;
            }
        }
        Ok(total)
    }

    async fn count_instances_of_offering(&self, offering_id: &str) -> Result<usize, ClientError> {
        let mut total = 0;
        for plan in self.plans(offering_id).await? {
            total += self.count_plan_instances(&plan).await?;
        }
        Ok(total)
    }
}
