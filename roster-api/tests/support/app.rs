//! Shared harness for driving the full router in-process.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use roster_api::{create_api_router, ApiConfig};
use roster_core::{Member, Organization};
use roster_test_utils::{fixtures, InMemoryEntityStore, RecordingStore};
use serde_json::Value;
use tower::ServiceExt;

/// Router over a recording in-memory store seeded with Acme and Ana (30).
pub struct TestApp {
    pub store: RecordingStore,
    pub organization: Organization,
    pub member: Member,
    router: Router,
}

/// Status, headers and decoded JSON body (`Value::Null` when empty).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    pub fn error_code(&self) -> Option<&str> {
        self.body.get("code").and_then(Value::as_str)
    }

    /// Field names of a 422 violation list, in order.
    pub fn violation_fields(&self) -> Vec<String> {
        self.body
            .get("details")
            .and_then(Value::as_array)
            .map(|violations| {
                violations
                    .iter()
                    .filter_map(|v| v.get("field").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl TestApp {
    pub fn seeded() -> Self {
        let (store, organization, member) = fixtures::seeded_store();
        Self::over(RecordingStore::new(Arc::new(store)), organization, member)
    }

    /// Seeded app whose store rejects every commit.
    pub fn with_failing_commits() -> Self {
        let (store, organization, member) = fixtures::seeded_store();
        Self::over(
            RecordingStore::new(Arc::new(store)).failing_commits(),
            organization,
            member,
        )
    }

    pub fn empty() -> Self {
        let organization = fixtures::acme();
        let member = fixtures::member_of(organization.id, "Ana", 30);
        Self::over(
            RecordingStore::new(Arc::new(InMemoryEntityStore::new())),
            organization,
            member,
        )
    }

    fn over(store: RecordingStore, organization: Organization, member: Member) -> Self {
        let router = create_api_router(Arc::new(store.clone()), &ApiConfig::default())
            .unwrap_or_else(|err| panic!("router failed to build: {}", err));
        Self {
            store,
            organization,
            member,
            router,
        }
    }

    pub fn organization_uri(&self) -> String {
        format!("/api/organizations/{}", self.organization.id)
    }

    pub fn members_uri(&self) -> String {
        format!("/api/organizations/{}/members", self.organization.id)
    }

    pub fn member_uri(&self) -> String {
        format!(
            "/api/organizations/{}/members/{}",
            self.organization.id, self.member.id
        )
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(Method::DELETE, uri, None).await
    }

    pub async fn send_json(&self, method: Method, uri: &str, body: Value) -> TestResponse {
        self.send(method, uri, Some(body.to_string())).await
    }

    /// Send a request with an optional raw body.
    pub async fn send(&self, method: Method, uri: &str, body: Option<String>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .unwrap_or_else(|err| panic!("invalid request: {}", err));

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|err| match err {});

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|err| panic!("unreadable body: {}", err));
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|err| panic!("non-JSON body {:?}: {}", bytes, err))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}
