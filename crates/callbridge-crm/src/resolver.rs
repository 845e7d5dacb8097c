// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone to contact-key resolution with gated creation.

use callbridge_core::lookup::{first_string, rows};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::client::Family;
use crate::error::CrmError;
use crate::matcher::{find_by_phone, ContactSource};
use crate::phone::PhoneNumber;
use crate::probe::{ProbeRequest, Probed};
use crate::session::ResolutionSession;

/// Attributes that may carry a contact's key, in precedence order.
pub const CONTACT_KEY_FIELDS: &[&str] = &[
    "contactKey",
    "ContactKey",
    "objectKey",
    "ObjectKey",
    "Key",
    "key",
    "Id",
    "id",
];

pub const CREATE_PATHS: &[&str] = &["Contact", "Contacts"];

/// Attribute used for the phone on created contacts when none was discovered.
const FALLBACK_PHONE_FIELD: &str = "Mobile";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactReference {
    pub key: String,
    pub source: ContactSource,
    /// Canonical form of the number that was resolved.
    pub phone: String,
    pub field: Option<String>,
    pub created: bool,
}

/// Known details about the person behind a number, used on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactHints {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Resolved(ContactReference),
    Unmatched { phone: String },
}

pub fn extract_contact_key(record: &Map<String, Value>) -> Option<String> {
    first_string(record, CONTACT_KEY_FIELDS)
}

/// Resolve `raw_phone` to a contact key, creating the contact only when
/// `allow_create` is set and no match exists.
pub async fn resolve_or_create(
    session: &ResolutionSession<'_>,
    raw_phone: &str,
    hints: &ContactHints,
    allow_create: bool,
) -> Result<Resolution, CrmError> {
    let phone = PhoneNumber::parse(raw_phone, session.client().country_code())?;

    if let Some(found) = find_by_phone(session, &phone).await? {
        let key = extract_contact_key(&found.record).ok_or(CrmError::MissingKey)?;
        info!(phone = %phone, key = %key, source = ?found.source, "contact resolved");
        return Ok(Resolution::Resolved(ContactReference {
            key,
            source: found.source,
            phone: phone.canonical(),
            field: found.field,
            created: false,
        }));
    }

    if !allow_create {
        info!(phone = %phone, "no contact matched");
        return Ok(Resolution::Unmatched {
            phone: phone.canonical(),
        });
    }
    create_contact(session, &phone, hints)
        .await
        .map(Resolution::Resolved)
}

async fn create_contact(
    session: &ResolutionSession<'_>,
    phone: &PhoneNumber,
    hints: &ContactHints,
) -> Result<ContactReference, CrmError> {
    let phone_field = session
        .phone_fields()
        .await?
        .first()
        .cloned()
        .unwrap_or_else(|| FALLBACK_PHONE_FIELD.to_string());

    let mut body = Map::new();
    let mut put = |key: &str, value: Option<&String>| {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            body.insert(key.to_string(), Value::String(v.clone()));
        }
    };
    put("FirstName", hints.first_name.as_ref());
    put("LastName", hints.last_name.as_ref());
    put("Email", hints.email.as_ref());
    put("Company", hints.company.as_ref());
    body.insert(phone_field.clone(), Value::String(phone.canonical()));
    body.insert(
        "Source".to_string(),
        Value::String(session.settings().contact_source.clone()),
    );

    let request = ProbeRequest::post(Family::Primary, CREATE_PATHS, Value::Object(body));
    match session.client().probe(session.credential(), &request).await? {
        Probed::Routed { response, .. } if response.is_success() => {
            let key = rows(&response.body)
                .first()
                .and_then(|record| extract_contact_key(record))
                .ok_or(CrmError::MissingKey)?;
            info!(phone = %phone, key = %key, "contact created");
            Ok(ContactReference {
                key,
                source: ContactSource::Created,
                phone: phone.canonical(),
                field: Some(phone_field),
                created: true,
            })
        }
        Probed::Routed { url, response } => {
            warn!(url = %url, status = response.status, "contact creation rejected");
            Err(CrmError::CreateRejected {
                status: response.status,
                detail: response.excerpt(),
            })
        }
        Probed::Exhausted { attempted } => Err(CrmError::CreateRejected {
            status: 404,
            detail: format!("no contact create route among {}", attempted.join(", ")),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CrmClient, Credential};
    use callbridge_config::model::{CrmConfig, ResolverConfig};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CrmClient {
        CrmClient::new(&CrmConfig {
            base_url: format!("{}/Crm", server.uri()),
            ..CrmConfig::default()
        })
        .unwrap()
    }

    async fn empty_directory(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/Crm/Contact/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CrmOData/Contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(server)
            .await;
    }

    #[test]
    fn key_precedence() {
        let record = json!({"id": "low", "Key": "mid", "objectKey": "high"});
        assert_eq!(
            extract_contact_key(record.as_object().unwrap()).as_deref(),
            Some("high")
        );
        let numeric = json!({"Id": 42});
        assert_eq!(
            extract_contact_key(numeric.as_object().unwrap()).as_deref(),
            Some("42")
        );
        assert!(extract_contact_key(json!({"Name": "x"}).as_object().unwrap()).is_none());
    }

    #[tokio::test]
    async fn short_phone_fails_before_any_request() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let credential = Credential::new("t");
        let settings = ResolverConfig::default();
        let session = ResolutionSession::new(&client, &credential, &settings);

        let err = resolve_or_create(&session, "123", &ContactHints::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::InvalidPhone(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn match_without_key_is_missing_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Crm/Contact/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"Name": "Pat"}])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let credential = Credential::new("t");
        let settings = ResolverConfig::default();
        let session = ResolutionSession::new(&client, &credential, &settings);
        let err = resolve_or_create(&session, "5551234567", &ContactHints::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::MissingKey));
    }

    #[tokio::test]
    async fn unmatched_without_create_makes_no_post() {
        let server = MockServer::start().await;
        empty_directory(&server).await;
        Mock::given(method("POST"))
            .and(path("/Crm/Contact"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let credential = Credential::new("t");
        let settings = ResolverConfig::default();
        let session = ResolutionSession::new(&client, &credential, &settings);
        let resolution = resolve_or_create(&session, "555 123 4567", &ContactHints::default(), false)
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Unmatched {
                phone: "+15551234567".into()
            }
        );
    }

    #[tokio::test]
    async fn create_posts_minimal_contact() {
        let server = MockServer::start().await;
        empty_directory(&server).await;
        Mock::given(method("POST"))
            .and(path("/Crm/Contact"))
            .and(body_partial_json(json!({
                "FirstName": "Ada",
                "Mobile": "+15551234567",
                "Source": "callbridge"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"Key": "new-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let credential = Credential::new("t");
        let settings = ResolverConfig::default();
        let session = ResolutionSession::new(&client, &credential, &settings);
        let hints = ContactHints {
            first_name: Some("Ada".into()),
            ..ContactHints::default()
        };
        let Resolution::Resolved(reference) = resolve_or_create(&session, "5551234567", &hints, true)
            .await
            .unwrap()
        else {
            panic!("expected a created contact");
        };
        assert_eq!(reference.key, "new-1");
        assert_eq!(reference.source, ContactSource::Created);
        assert!(reference.created);
    }

    #[tokio::test]
    async fn create_rejection_surfaces_status() {
        let server = MockServer::start().await;
        empty_directory(&server).await;
        Mock::given(method("POST"))
            .and(path("/Crm/Contact"))
            .respond_with(ResponseTemplate::new(422).set_body_string("LastName required"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let credential = Credential::new("t");
        let settings = ResolverConfig::default();
        let session = ResolutionSession::new(&client, &credential, &settings);
        let err = resolve_or_create(&session, "5551234567", &ContactHints::default(), true)
            .await
            .unwrap_err();
        match err {
            CrmError::CreateRejected { status, detail } => {
                assert_eq!(status, 422);
                assert_eq!(detail, "LastName required");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
