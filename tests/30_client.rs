mod common;

use anyhow::Result;
use estate_portal_rust::client::PortalClient;
use estate_portal_rust::error::PortalError;
use estate_portal_rust::session::PortalRole;
use serde_json::json;

#[tokio::test]
async fn authenticated_get_attaches_bearer_token() -> Result<()> {
    let portal = common::spawn_portal().await?;
    let dir = common::temp_config_dir();
    let manager = common::manager(&portal, &dir);

    manager.login("T-100", "correct", PortalRole::Tenant).await?;
    let client = PortalClient::with_base_url(manager, portal.base_url.clone());

    let info = client.get("/portal/auth/info").await?;
    assert_eq!(info["authenticated"], true);
    Ok(())
}

#[tokio::test]
async fn silent_refresh_and_retry_on_401() -> Result<()> {
    let portal = common::spawn_portal().await?;
    let dir = common::temp_config_dir();
    let manager = common::manager(&portal, &dir);

    manager.login("T-100", "correct", PortalRole::Tenant).await?;

    // Invalidate the access token server-side; the refresh token stays good.
    portal.lock().access_tokens.clear();
    {
        let mut state = portal.lock();
        state.refresh_count = 0;
        state.info_count = 0;
    }

    let client = PortalClient::with_base_url(manager, portal.base_url.clone());
    let info = client.get("/portal/auth/info").await?;

    // The caller only sees the final successful response.
    assert_eq!(info["authenticated"], true);
    let state = portal.lock();
    assert_eq!(state.refresh_count, 1, "exactly one refresh");
    assert_eq!(state.info_count, 2, "original attempt plus one retry");
    Ok(())
}

#[tokio::test]
async fn persistent_401_surfaces_after_single_retry() -> Result<()> {
    let portal = common::spawn_portal().await?;
    let dir = common::temp_config_dir();
    let manager = common::manager(&portal, &dir);

    manager.login("T-100", "correct", PortalRole::Tenant).await?;
    {
        let mut state = portal.lock();
        state.reject_info = true;
        state.refresh_count = 0;
        state.info_count = 0;
    }

    let client = PortalClient::with_base_url(manager, portal.base_url.clone());
    let err = client.get("/portal/auth/info").await.expect_err("must surface the 401");

    assert!(
        matches!(err, PortalError::Api { status: 401, .. }),
        "unexpected error: {err:?}"
    );
    let state = portal.lock();
    assert_eq!(state.refresh_count, 1, "no retry loop on persistent 401");
    assert_eq!(state.info_count, 2);
    Ok(())
}

#[tokio::test]
async fn failed_refresh_during_retry_maps_to_session_expired() -> Result<()> {
    let portal = common::spawn_portal().await?;
    let dir = common::temp_config_dir();
    let manager = common::manager(&portal, &dir);

    manager.login("T-100", "correct", PortalRole::Tenant).await?;
    {
        let mut state = portal.lock();
        state.access_tokens.clear();
        state.fail_refresh = true;
    }

    let client = PortalClient::with_base_url(manager.clone(), portal.base_url.clone());
    let err = client.get("/portal/auth/info").await.expect_err("must fail");

    assert!(matches!(err, PortalError::SessionExpired), "unexpected error: {err:?}");
    assert!(!manager.is_authenticated().await, "failed refresh forces logout");
    assert!(manager.persisted_session().is_none());
    Ok(())
}

#[tokio::test]
async fn requests_without_login_are_rejected_locally() -> Result<()> {
    let portal = common::spawn_portal().await?;
    let dir = common::temp_config_dir();
    let manager = common::manager(&portal, &dir);

    let client = PortalClient::with_base_url(manager, portal.base_url.clone());
    let err = client.get("/portal/auth/info").await.expect_err("must fail");

    assert!(matches!(err, PortalError::NotAuthenticated), "unexpected error: {err:?}");
    assert_eq!(portal.lock().info_count, 0, "no request should leave the client");
    Ok(())
}

#[tokio::test]
async fn post_passes_body_through() -> Result<()> {
    let portal = common::spawn_portal().await?;
    let dir = common::temp_config_dir();
    let manager = common::manager(&portal, &dir);

    manager.login("T-100", "correct", PortalRole::Tenant).await?;
    let client = PortalClient::with_base_url(manager, portal.base_url.clone());

    let body = json!({ "message": "hello", "attachments": [1, 2, 3] });
    let echoed = client.post("/portal/echo", body.clone()).await?;
    assert_eq!(echoed, body);
    Ok(())
}
