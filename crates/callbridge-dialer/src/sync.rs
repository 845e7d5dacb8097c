// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bulk queue sync: page through a tenant's CRM contacts and enqueue every
//! dialable row.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use callbridge_core::lookup::{first_string, scalar_text};
use callbridge_core::{CallbridgeError, NewQueueItem, Tenant};
use callbridge_crm::fields::looks_phone_like;
use callbridge_crm::odata::{fetch_page, Cursor, PageQuery};
use callbridge_crm::resolver::extract_contact_key;
use callbridge_crm::{CrmError, PhoneNumber, ResolutionSession};
use callbridge_storage::queries::queue;
use callbridge_storage::{Database, EnqueueOutcome};

use crate::context::ServiceContext;

const FIRST_NAME: &[&str] = &["FirstName", "firstName", "first_name"];
const LAST_NAME: &[&str] = &["LastName", "lastName", "last_name"];
const COMPANY: &[&str] = &["Company", "company", "CompanyName", "companyName"];
const EMAIL: &[&str] = &["Email", "email", "EmailAddress", "emailAddress"];

#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub campaign: Option<String>,
    /// OData `$filter` passed through to the CRM.
    pub filter: Option<String>,
    /// Overrides `sync.max_rows`.
    pub max_rows: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub scanned: usize,
    pub inserted: usize,
    pub merged: usize,
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("tenant {0} has no CRM credential")]
    NoCredential(String),

    #[error(transparent)]
    Crm(#[from] CrmError),

    #[error(transparent)]
    Storage(#[from] CallbridgeError),
}

enum RowOutcome {
    Queued(EnqueueOutcome),
    Skipped,
}

impl SyncReport {
    fn add(mut self, outcome: RowOutcome) -> Self {
        self.scanned += 1;
        match outcome {
            RowOutcome::Queued(EnqueueOutcome::Inserted(_)) => self.inserted += 1,
            RowOutcome::Queued(EnqueueOutcome::Merged(_)) => self.merged += 1,
            RowOutcome::Skipped => self.skipped += 1,
        }
        self
    }
}

/// First usable phone in a row: discovered fields first, then any
/// phone-like attribute.
fn row_phone(row: &Map<String, Value>, phone_fields: &[String]) -> Option<String> {
    phone_fields
        .iter()
        .filter_map(|f| row.get(f))
        .chain(
            row.iter()
                .filter(|(k, _)| looks_phone_like(k))
                .map(|(_, v)| v),
        )
        .filter_map(scalar_text)
        .find(|v| !v.is_empty())
}

/// Queue item for a CRM row, or `None` when it has no key or no usable
/// phone.
pub fn row_to_item(
    row: &Map<String, Value>,
    phone_fields: &[String],
    country_code: &str,
) -> Option<NewQueueItem> {
    let external_key = extract_contact_key(row)?;
    let phone = PhoneNumber::parse(&row_phone(row, phone_fields)?, country_code).ok()?;
    Some(NewQueueItem {
        external_key,
        first_name: first_string(row, FIRST_NAME),
        last_name: first_string(row, LAST_NAME),
        company: first_string(row, COMPANY),
        email: first_string(row, EMAIL),
        phone: Some(phone.canonical()),
    })
}

async fn enqueue_row(
    db: &Database,
    tenant_id: i64,
    campaign: Option<&str>,
    item: Option<NewQueueItem>,
) -> Result<RowOutcome, SyncError> {
    let Some(item) = item else {
        return Ok(RowOutcome::Skipped);
    };
    let outcome = queue::enqueue(db, tenant_id, campaign, &item).await?;
    Ok(RowOutcome::Queued(outcome))
}

/// Run one sync for `tenant`.
///
/// Pages are fetched lazily; at most `sync.concurrency` queue writes are in
/// flight, and reading stops after `max_rows` rows.
pub async fn sync_tenant(
    ctx: &ServiceContext,
    tenant: &Tenant,
    request: &SyncRequest,
) -> Result<SyncReport, SyncError> {
    let credential = ServiceContext::crm_credential(tenant)
        .ok_or_else(|| SyncError::NoCredential(tenant.business_id.clone()))?;
    let settings = &ctx.config.sync;
    let session = ResolutionSession::new(&ctx.crm, &credential, &ctx.config.resolver);
    let phone_fields = session.phone_fields().await?.to_vec();
    let country_code = ctx.crm.country_code();
    let campaign = request.campaign.as_deref();
    let max_rows = request.max_rows.unwrap_or(settings.max_rows);

    let query = PageQuery {
        filter: request.filter.clone(),
        select: None,
        top: settings.page_size,
    };
    let crm = &ctx.crm;
    let credential = &credential;
    let query = &query;

    let pages = stream::try_unfold(Some(Cursor::default()), move |cursor| async move {
        let Some(cursor) = cursor else {
            return Ok(None);
        };
        match fetch_page(crm, credential, query, &cursor).await? {
            Some(page) if !page.rows.is_empty() => {
                debug!(rows = page.rows.len(), cursor = ?cursor, "sync page fetched");
                Ok(Some((page.rows, page.next)))
            }
            _ => Ok::<_, CrmError>(None),
        }
    })
    .boxed();

    let report = pages
        .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<_, CrmError>)))
        .try_flatten()
        .take(max_rows)
        .map_err(SyncError::from)
        .map_ok(|row| {
            let item = row_to_item(&row, &phone_fields, country_code);
            enqueue_row(&ctx.db, tenant.id, campaign, item)
        })
        .try_buffer_unordered(settings.concurrency.max(1))
        .try_fold(SyncReport::default(), |report, outcome| async move {
            Ok::<_, SyncError>(report.add(outcome))
        })
        .await?;

    info!(
        tenant_id = tenant.id,
        campaign = campaign.unwrap_or("default"),
        scanned = report.scanned,
        inserted = report.inserted,
        merged = report.merged,
        skipped = report.skipped,
        "queue sync finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use callbridge_config::model::CallbridgeConfig;
    use callbridge_core::NewTenant;
    use callbridge_storage::queries::tenants;
    use callbridge_storage::CredentialKey;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn context(server: &MockServer) -> ServiceContext {
        let key = CredentialKey::generate().unwrap();
        let mut config = CallbridgeConfig::default();
        config.storage.credential_key = Some(key.to_hex());
        config.crm.base_url = format!("{}/Crm", server.uri());
        config.sync.page_size = 2;
        config.sync.concurrency = 2;
        let db = Database::open_in_memory().await.unwrap();
        ServiceContext::new(Arc::new(config), db).unwrap()
    }

    async fn add_tenant(ctx: &ServiceContext, token: Option<&str>) -> Tenant {
        tenants::insert(
            &ctx.db,
            &ctx.key,
            &NewTenant {
                business_id: "b-1".into(),
                name: "Acme".into(),
                crm_token: token.map(str::to_string),
                ..NewTenant::default()
            },
        )
        .await
        .unwrap()
    }

    async fn mount_contacts(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/Crm/Contact/definition"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"name": "MobilePhone"}, {"name": "FirstName"}])),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CrmOData/Contacts"))
            .and(query_param("$select", "MobilePhone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CrmOData/Contacts"))
            .and(query_param("$top", "2"))
            .and(query_param("$skip", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [
                {"ContactKey": "k-3", "MobilePhone": "(555) 765-4321", "Company": "Acme"},
            ]})))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CrmOData/Contacts"))
            .and(query_param("$top", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [
                {"Key": "k-1", "FirstName": "Ada", "MobilePhone": "555-123-4567"},
                {"Key": "k-2", "MobilePhone": "12"},
            ]})))
            .mount(server)
            .await;
    }

    #[test]
    fn row_falls_back_to_phone_like_attributes() {
        let row = json!({"id": 9, "HomePhone": "5551234567", "email": "a@b.c"});
        let item = row_to_item(row.as_object().unwrap(), &[], "1").unwrap();
        assert_eq!(item.external_key, "9");
        assert_eq!(item.phone.as_deref(), Some("+15551234567"));
        assert_eq!(item.email.as_deref(), Some("a@b.c"));

        let keyless = json!({"Phone": "5551234567"});
        assert!(row_to_item(keyless.as_object().unwrap(), &[], "1").is_none());
    }

    #[tokio::test]
    async fn pages_are_enqueued_and_resync_merges() {
        let server = MockServer::start().await;
        mount_contacts(&server).await;
        let ctx = context(&server).await;
        let tenant = add_tenant(&ctx, Some("tok")).await;
        let request = SyncRequest {
            campaign: Some("spring".into()),
            ..SyncRequest::default()
        };

        let report = sync_tenant(&ctx, &tenant, &request).await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                scanned: 3,
                inserted: 2,
                merged: 0,
                skipped: 1
            }
        );

        let again = sync_tenant(&ctx, &tenant, &request).await.unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.merged, 2);

        let counts = queue::counts(&ctx.db, tenant.id, Some("spring")).await.unwrap();
        assert_eq!(counts.pending, 2);
    }

    #[tokio::test]
    async fn max_rows_bounds_the_scan() {
        let server = MockServer::start().await;
        mount_contacts(&server).await;
        let ctx = context(&server).await;
        let tenant = add_tenant(&ctx, Some("tok")).await;

        let report = sync_tenant(
            &ctx,
            &tenant,
            &SyncRequest {
                max_rows: Some(1),
                ..SyncRequest::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.inserted, 1);
    }

    #[tokio::test]
    async fn tenant_without_token_is_refused() {
        let server = MockServer::start().await;
        let ctx = context(&server).await;
        let tenant = add_tenant(&ctx, None).await;
        let err = sync_tenant(&ctx, &tenant, &SyncRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoCredential(_)));
    }
}
