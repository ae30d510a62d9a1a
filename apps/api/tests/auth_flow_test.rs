//! Integration tests for the session lifecycle
//!
//! Drives `AuthService` end to end over the in-memory session store:
//! - Login stores exactly one refresh session per user
//! - Refresh rotates the token and refuses replays
//! - Logout revokes the current token
//! - Signature or key-binding failures clear the session

mod common;

use assert_matches::assert_matches;
use common::*;
use tollgate_api::models::{RefreshBinding, RevokedToken, UserRole, UserStatus};
use tollgate_api::repositories::SessionStore;
use tollgate_api::services::{ProfileEdit, Registration};
use tollgate_api::ApiError;

// ========== Login ==========

#[tokio::test]
async fn test_login_stores_refresh_session() {
    let auth = TestAuth::new();
    auth.register("alice@example.com", UserRole::User).await;

    let pair = auth
        .service
        .login("Alice@Example.com", TEST_PASSWORD)
        .await
        .unwrap();

    let user = auth.user("alice@example.com").await;
    assert_eq!(user.refresh_token, pair.refresh_token);
    assert!(!user.refresh_key_fingerprint.is_empty());
    assert_ne!(pair.access_token, pair.refresh_token);
}

#[tokio::test]
async fn test_login_unknown_email() {
    let auth = TestAuth::new();
    let result = auth.service.login("ghost@example.com", TEST_PASSWORD).await;
    assert_matches!(result, Err(ApiError::NotFound { resource_type: "user", .. }));
}

#[tokio::test]
async fn test_login_wrong_password() {
    let auth = TestAuth::new();
    auth.register("alice@example.com", UserRole::User).await;

    let result = auth.service.login("alice@example.com", "wrong").await;
    assert_matches!(result, Err(ApiError::InvalidCredentials));

    let user = auth.user("alice@example.com").await;
    assert!(!user.has_session());
}

#[tokio::test]
async fn test_second_login_supersedes_first() {
    let auth = TestAuth::new();
    auth.register("alice@example.com", UserRole::User).await;

    let first = auth.service.login("alice@example.com", TEST_PASSWORD).await.unwrap();
    let second = auth.service.login("alice@example.com", TEST_PASSWORD).await.unwrap();

    assert_matches!(
        auth.service.refresh(&first.refresh_token).await,
        Err(ApiError::InvalidRequest(_))
    );
    assert_matches!(
        auth.service.authenticate(&first.access_token).await,
        Err(ApiError::Unauthorized)
    );
    assert!(auth.service.authenticate(&second.access_token).await.is_ok());
    assert!(auth.service.refresh(&second.refresh_token).await.is_ok());
}

// ========== Refresh ==========

#[tokio::test]
async fn test_refresh_rotates_and_rejects_replay() {
    let auth = TestAuth::new();
    auth.register("bob@example.com", UserRole::User).await;
    let login = auth.service.login("bob@example.com", TEST_PASSWORD).await.unwrap();

    let rotated = auth.service.refresh(&login.refresh_token).await.unwrap();
    assert_ne!(rotated.refresh_token, login.refresh_token);
    assert_eq!(
        auth.user("bob@example.com").await.refresh_token,
        rotated.refresh_token
    );

    assert_matches!(
        auth.service.refresh(&login.refresh_token).await,
        Err(ApiError::InvalidRequest(_))
    );
    // The replay does not end the legitimate session
    assert!(auth.service.refresh(&rotated.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_refresh_rejects_access_token_and_garbage() {
    let auth = TestAuth::new();
    auth.register("bob@example.com", UserRole::User).await;
    let login = auth.service.login("bob@example.com", TEST_PASSWORD).await.unwrap();

    assert_matches!(
        auth.service.refresh(&login.access_token).await,
        Err(ApiError::InvalidRequest(_))
    );
    assert_matches!(
        auth.service.refresh("not-a-token").await,
        Err(ApiError::InvalidRequest(_))
    );
    assert_matches!(auth.service.refresh("").await, Err(ApiError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_refresh_with_foreign_key_binding_clears_session() {
    let auth = TestAuth::new();
    let user = auth.register("carol@example.com", UserRole::User).await;
    let login = auth.service.login("carol@example.com", TEST_PASSWORD).await.unwrap();

    // Same token, but bound to a key this service never issued
    let swapped = auth
        .store
        .replace_refresh_token(
            user.id,
            Some(&login.refresh_token),
            &RefreshBinding {
                token: login.refresh_token.clone(),
                key_fingerprint: "0".repeat(64),
            },
        )
        .await
        .unwrap();
    assert!(swapped);

    assert_matches!(
        auth.service.refresh(&login.refresh_token).await,
        Err(ApiError::ExpiredKey)
    );
    let user = auth.user("carol@example.com").await;
    assert!(!user.has_session());
    assert!(user.refresh_key_fingerprint.is_empty());
}

#[tokio::test]
async fn test_refresh_with_bad_signature_clears_session() {
    let auth = TestAuth::new();
    let user = auth.register("dave@example.com", UserRole::User).await;
    let login = auth.service.login("dave@example.com", TEST_PASSWORD).await.unwrap();

    let (unsigned, signature) = login.refresh_token.rsplit_once('.').unwrap();
    let flipped = if signature.starts_with('A') { 'B' } else { 'A' };
    let forged = format!("{}.{}{}", unsigned, flipped, &signature[1..]);

    // Plant the forged token as the current one so only the signature fails
    let fingerprint = auth.user("dave@example.com").await.refresh_key_fingerprint;
    auth.store
        .replace_refresh_token(
            user.id,
            None,
            &RefreshBinding {
                token: forged.clone(),
                key_fingerprint: fingerprint,
            },
        )
        .await
        .unwrap();

    assert_matches!(auth.service.refresh(&forged).await, Err(ApiError::ExpiredKey));
    assert!(!auth.user("dave@example.com").await.has_session());
}

#[tokio::test]
async fn test_refresh_with_revoked_current_token_keeps_session() {
    let auth = TestAuth::new();
    let user = auth.register("dora@example.com", UserRole::User).await;
    let login = auth.service.login("dora@example.com", TEST_PASSWORD).await.unwrap();

    // Token is still current but already sits on the revoked trail
    auth.store
        .append_revoked(
            user.id,
            RevokedToken::logout(login.refresh_token.clone()),
            chrono::Duration::days(3),
        )
        .await
        .unwrap();

    assert_matches!(
        auth.service.refresh(&login.refresh_token).await,
        Err(ApiError::InvalidRequest(_))
    );
    let user = auth.user("dora@example.com").await;
    assert!(user.has_session());
    assert_eq!(user.refresh_token, login.refresh_token);
    assert!(!user.refresh_key_fingerprint.is_empty());
}

#[tokio::test]
async fn test_concurrent_refresh_has_one_winner() {
    let auth = TestAuth::new();
    auth.register("erin@example.com", UserRole::User).await;
    let login = auth.service.login("erin@example.com", TEST_PASSWORD).await.unwrap();

    let (a, b) = tokio::join!(
        auth.service.refresh(&login.refresh_token),
        auth.service.refresh(&login.refresh_token)
    );

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);
    let loser = if a.is_ok() { b } else { a };
    assert_matches!(loser, Err(ApiError::InvalidRequest(_)));
}

// ========== Logout ==========

#[tokio::test]
async fn test_logout_revokes_current_token() {
    let auth = TestAuth::new();
    let user = auth.register("frank@example.com", UserRole::User).await;
    let login = auth.service.login("frank@example.com", TEST_PASSWORD).await.unwrap();

    auth.service.logout(user.id).await.unwrap();

    let user = auth.user("frank@example.com").await;
    assert!(!user.has_session());
    assert!(user.is_revoked(&login.refresh_token));
    assert_eq!(user.revoked_tokens.len(), 1);
    assert_eq!(user.revoked_tokens[0].reason, "logout");

    assert_matches!(
        auth.service.refresh(&login.refresh_token).await,
        Err(ApiError::InvalidRequest(_))
    );
    assert_matches!(
        auth.service.authenticate(&login.access_token).await,
        Err(ApiError::Unauthorized)
    );
}

#[tokio::test]
async fn test_logout_without_session_appends_nothing() {
    let auth = TestAuth::new();
    let user = auth.register("gina@example.com", UserRole::User).await;

    auth.service.logout(user.id).await.unwrap();
    auth.service.logout(user.id).await.unwrap();

    assert!(auth.user("gina@example.com").await.revoked_tokens.is_empty());
    assert_matches!(
        auth.service.logout(uuid::Uuid::new_v4()).await,
        Err(ApiError::InvalidRequest(_))
    );
}

// ========== Authenticate ==========

#[tokio::test]
async fn test_authenticate_resolves_caller() {
    let auth = TestAuth::new();
    let user = auth.register("hank@example.com", UserRole::Admin).await;
    let login = auth.service.login("hank@example.com", TEST_PASSWORD).await.unwrap();

    let caller = auth.service.authenticate(&login.access_token).await.unwrap();
    assert_eq!(caller.user_id, user.id);
    assert_eq!(caller.role, UserRole::Admin);

    assert_matches!(
        auth.service.authenticate(&login.refresh_token).await,
        Err(ApiError::Unauthorized)
    );
}

// ========== Register / Profile ==========

#[tokio::test]
async fn test_admin_registration_requires_admin_caller() {
    let auth = TestAuth::new();
    let registration = Registration {
        user_name: "mallory".to_string(),
        email: "mallory@example.com".to_string(),
        password: TEST_PASSWORD.to_string(),
        role: Some(UserRole::Admin),
    };

    assert_matches!(
        auth.service.register(registration.clone(), None).await,
        Err(ApiError::Forbidden(_))
    );

    let admin = auth.register("root@example.com", UserRole::Admin).await;
    let login = auth.service.login("root@example.com", TEST_PASSWORD).await.unwrap();
    let caller = auth.service.authenticate(&login.access_token).await.unwrap();
    assert_eq!(caller.user_id, admin.id);

    let created = auth.service.register(registration, Some(&caller)).await.unwrap();
    assert_eq!(created.role, UserRole::Admin);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let auth = TestAuth::new();
    auth.register("ivy@example.com", UserRole::User).await;

    let result = auth
        .service
        .register(
            Registration {
                user_name: "ivy2".to_string(),
                email: "IVY@example.com".to_string(),
                password: TEST_PASSWORD.to_string(),
                role: None,
            },
            None,
        )
        .await;
    assert_matches!(result, Err(ApiError::Conflict { .. }));
}

#[tokio::test]
async fn test_edit_profile_changes_password_and_status() {
    let auth = TestAuth::new();
    let user = auth.register("jack@example.com", UserRole::User).await;

    let profile = auth
        .service
        .edit_profile(
            user.id,
            ProfileEdit {
                password: Some("new password".to_string()),
                status: Some(UserStatus::Inactive),
                ..ProfileEdit::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(profile.status, UserStatus::Inactive);
    assert_eq!(profile.user_name, "jack");

    assert_matches!(
        auth.service.login("jack@example.com", TEST_PASSWORD).await,
        Err(ApiError::InvalidCredentials)
    );
    assert!(auth.service.login("jack@example.com", "new password").await.is_ok());

    assert_matches!(
        auth.service
            .edit_profile(
                user.id,
                ProfileEdit {
                    password: Some(String::new()),
                    ..ProfileEdit::default()
                }
            )
            .await,
        Err(ApiError::ValidationError(_))
    );
}

#[tokio::test]
async fn test_edit_profile_rejects_blank_user_name() {
    let auth = TestAuth::new();
    let user = auth.register("kate@example.com", UserRole::User).await;

    for blank in ["", "   "] {
        assert_matches!(
            auth.service
                .edit_profile(
                    user.id,
                    ProfileEdit {
                        user_name: Some(blank.to_string()),
                        ..ProfileEdit::default()
                    }
                )
                .await,
            Err(ApiError::ValidationError(_))
        );
    }
    assert_eq!(auth.user("kate@example.com").await.user_name, "kate");

    let profile = auth
        .service
        .edit_profile(
            user.id,
            ProfileEdit {
                user_name: Some("  katherine ".to_string()),
                ..ProfileEdit::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(profile.user_name, "katherine");
}
