//! Property-Based Tests for the Request Pipeline
//!
//! For any valid organization the create/get cycle is lossless, for any
//! out-of-range age a patch is rejected without touching the store, and for
//! any unknown id every filtered route answers 404 without writing. A valid
//! replace is visible to the next read.

use axum::http::{Method, StatusCode};
use proptest::prelude::*;
use roster_test_utils::generators::{
    arb_create_organization, arb_invalid_age, arb_member_id, arb_organization_id,
    arb_update_member, arb_update_organization,
};
use serde_json::json;
use tokio::runtime::Runtime;

#[path = "support/app.rs"]
mod test_app_support;
use test_app_support::TestApp;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever a valid create returns is exactly what a later GET returns,
    /// and every nested member lands under the new organization.
    #[test]
    fn prop_create_then_get_round_trips(request in arb_create_organization()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::empty();
            let body = serde_json::to_value(&request)
                .map_err(|e| TestCaseError::fail(format!("serialize: {}", e)))?;

            let created = app.send_json(Method::POST, "/api/organizations", body).await;
            prop_assert_eq!(created.status, StatusCode::CREATED);
            prop_assert_eq!(app.store.commit_count(), 1);

            let location = created
                .location()
                .ok_or_else(|| TestCaseError::fail("missing Location header"))?
                .to_string();
            let fetched = app.get(&location).await;
            prop_assert_eq!(fetched.status, StatusCode::OK);
            prop_assert_eq!(&fetched.body, &created.body);

            let members = app.get(&format!("{}/members", location)).await;
            let listed = members.body.as_array().map(Vec::len).unwrap_or_default();
            prop_assert_eq!(listed, request.members.len());
            Ok(())
        })?;
    }

    /// A patch that moves age out of range is a 422 and the stored member
    /// keeps its age.
    #[test]
    fn prop_invalid_age_patch_is_rejected(age in arb_invalid_age()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::seeded();
            let response = app
                .send_json(
                    Method::PATCH,
                    &app.member_uri(),
                    json!([{ "op": "replace", "path": "/age", "value": age }]),
                )
                .await;

            prop_assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
            prop_assert_eq!(response.violation_fields(), vec!["age".to_string()]);
            prop_assert_eq!(app.store.commit_count(), 0);

            let fetched = app.get(&app.member_uri()).await;
            prop_assert_eq!(&fetched.body["age"], &json!(app.member.age));
            Ok(())
        })?;
    }

    /// Unknown organization ids never reach a handler or the member table.
    #[test]
    fn prop_unknown_organization_is_not_found(
        id in arb_organization_id(),
        update in arb_update_member(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::seeded();
            prop_assume!(id != app.organization.id);

            let organization_uri = format!("/api/organizations/{}", id);
            let member_uri = format!("{}/members/{}", organization_uri, app.member.id);
            let body = serde_json::to_value(&update)
                .map_err(|e| TestCaseError::fail(format!("serialize: {}", e)))?;

            let responses = vec![
                app.get(&organization_uri).await,
                app.delete(&organization_uri).await,
                app.get(&member_uri).await,
                app.send_json(Method::PUT, &member_uri, body).await,
                app.delete(&member_uri).await,
            ];
            for response in &responses {
                prop_assert_eq!(response.status, StatusCode::NOT_FOUND);
                prop_assert_eq!(response.error_code(), Some("ORGANIZATION_NOT_FOUND"));
            }
            prop_assert_eq!(app.store.member_query_count(), 0);
            prop_assert_eq!(app.store.commit_count(), 0);
            Ok(())
        })?;
    }

    /// Any valid replace is fetched tracked, committed once and read back.
    #[test]
    fn prop_put_organization_replaces_fields(update in arb_update_organization()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::seeded();
            let body = serde_json::to_value(&update)
                .map_err(|e| TestCaseError::fail(format!("serialize: {}", e)))?;

            let response = app
                .send_json(Method::PUT, &app.organization_uri(), body)
                .await;
            prop_assert_eq!(response.status, StatusCode::NO_CONTENT);
            prop_assert_eq!(app.store.tracking_flags(), vec![true]);
            prop_assert_eq!(app.store.commit_count(), 1);

            let fetched = app.get(&app.organization_uri()).await;
            prop_assert_eq!(&fetched.body["name"], &json!(update.name));
            prop_assert_eq!(&fetched.body["address"], &json!(update.address));
            prop_assert_eq!(&fetched.body["country"], &json!(update.country));
            Ok(())
        })?;
    }

    /// Unknown member ids under a known organization are a 404 for every
    /// member route, with nothing written.
    #[test]
    fn prop_unknown_member_is_not_found(id in arb_member_id()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::seeded();
            prop_assume!(id != app.member.id);

            let member_uri = format!("{}/{}", app.members_uri(), id);
            let responses = vec![
                app.get(&member_uri).await,
                app.send_json(
                    Method::PATCH,
                    &member_uri,
                    json!([{ "op": "replace", "path": "/age", "value": 31 }]),
                )
                .await,
                app.delete(&member_uri).await,
            ];
            for response in &responses {
                prop_assert_eq!(response.status, StatusCode::NOT_FOUND);
                prop_assert_eq!(response.error_code(), Some("MEMBER_NOT_FOUND"));
            }
            prop_assert_eq!(app.store.commit_count(), 0);
            Ok(())
        })?;
    }
}
