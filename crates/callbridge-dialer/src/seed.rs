// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bulk enqueue of caller-supplied contacts.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use callbridge_core::{CallbridgeError, NewQueueItem};
use callbridge_crm::PhoneNumber;
use callbridge_storage::queries::queue;
use callbridge_storage::{Database, EnqueueOutcome};

/// One contact in a seed request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedItem {
    #[serde(default, alias = "contactKey", alias = "key")]
    pub external_key: Option<String>,
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedSkip {
    /// Position in the request.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub inserted: usize,
    pub merged: usize,
    pub skipped: Vec<SeedSkip>,
}

impl SeedReport {
    fn record(&mut self, outcome: EnqueueOutcome) {
        match outcome {
            EnqueueOutcome::Inserted(_) => self.inserted += 1,
            EnqueueOutcome::Merged(_) => self.merged += 1,
        }
    }

    fn skip(&mut self, index: usize, reason: impl Into<String>) {
        self.skipped.push(SeedSkip {
            index,
            reason: reason.into(),
        });
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Enqueue every dialable item.
///
/// Phones are normalized before storage. Items without a key are keyed by
/// their canonical phone; a key repeated within one request is skipped.
pub async fn seed(
    db: &Database,
    tenant_id: i64,
    campaign: Option<&str>,
    country_code: &str,
    items: &[SeedItem],
) -> Result<SeedReport, CallbridgeError> {
    let mut report = SeedReport::default();
    let mut seen = HashSet::new();

    for (index, item) in items.iter().enumerate() {
        let Some(raw_phone) = present(&item.phone) else {
            report.skip(index, "no phone number");
            continue;
        };
        let phone = match PhoneNumber::parse(raw_phone, country_code) {
            Ok(phone) => phone.canonical(),
            Err(e) => {
                report.skip(index, e.to_string());
                continue;
            }
        };
        let external_key = present(&item.external_key)
            .map(str::to_string)
            .unwrap_or_else(|| phone.clone());
        if !seen.insert(external_key.clone()) {
            report.skip(index, format!("duplicate key `{external_key}` in request"));
            continue;
        }

        let new_item = NewQueueItem {
            external_key,
            first_name: item.first_name.clone(),
            last_name: item.last_name.clone(),
            company: item.company.clone(),
            email: item.email.clone(),
            phone: Some(phone),
        };
        report.record(queue::enqueue(db, tenant_id, campaign, &new_item).await?);
    }

    tracing::info!(
        tenant_id,
        campaign = campaign.unwrap_or("default"),
        inserted = report.inserted,
        merged = report.merged,
        skipped = report.skipped.len(),
        "queue seeded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_core::NewTenant;
    use callbridge_storage::queries::tenants;
    use callbridge_storage::CredentialKey;
    use serde_json::json;

    async fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let key = CredentialKey::generate().unwrap();
        let tenant = tenants::insert(
            &db,
            &key,
            &NewTenant {
                business_id: "b-1".into(),
                name: "Acme".into(),
                ..NewTenant::default()
            },
        )
        .await
        .unwrap();
        (db, tenant.id)
    }

    fn items(value: serde_json::Value) -> Vec<SeedItem> {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn normalizes_and_reports_each_item() {
        let (db, tenant_id) = setup().await;
        let batch = items(json!([
            {"contactKey": "k-1", "firstName": "Ada", "phone": "(555) 123-4567"},
            {"phone": "+44 20 7946 0958"},
            {"contactKey": "k-3", "phone": "12"},
            {"contactKey": "k-4"},
            {"contactKey": "k-1", "phone": "5551234567"},
        ]));

        let report = seed(&db, tenant_id, Some("spring"), "1", &batch).await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.merged, 0);
        let skipped: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![2, 3, 4]);
        assert!(report.skipped[2].reason.contains("duplicate"));

        let leased = queue::lease_next(
            &db,
            tenant_id,
            Some("spring"),
            "agent-1",
            std::time::Duration::from_secs(60),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(leased.phone.as_deref(), Some("+15551234567"));
        assert_eq!(leased.external_key, "k-1");
    }

    #[tokio::test]
    async fn reseeding_merges() {
        let (db, tenant_id) = setup().await;
        let batch = items(json!([{"contactKey": "k-1", "phone": "5551234567"}]));
        seed(&db, tenant_id, None, "1", &batch).await.unwrap();

        let again = items(json!([{"contactKey": "k-1", "phone": "5551234567", "email": "a@b.c"}]));
        let report = seed(&db, tenant_id, None, "1", &again).await.unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.merged, 1);
    }
}
