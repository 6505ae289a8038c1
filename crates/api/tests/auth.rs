mod common;

use axum::http::StatusCode;
use common::{
    body_json, create_admin, delete_auth, get, get_auth, login, post_json, post_json_auth,
    token_for, TEST_PASSWORD,
};
use newsroom_db::repositories::AdminUserRepo;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn login_returns_tokens_and_user(pool: PgPool) {
    let admin = create_admin(&pool, "chief@newsroom.test", "admin").await;

    let data = login(
        common::build_test_app(pool),
        "Chief@Newsroom.test",
        TEST_PASSWORD,
    )
    .await;

    assert!(data["access_token"].is_string());
    assert!(data["refresh_token"].is_string());
    assert_eq!(data["expires_in"], 900);
    assert_eq!(data["user"]["id"], admin.id);
    assert_eq!(data["user"]["role"], "admin");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn wrong_password_and_unknown_email_are_401(pool: PgPool) {
    create_admin(&pool, "chief@newsroom.test", "admin").await;

    for (email, password) in [
        ("chief@newsroom.test", "not-the-password"),
        ("ghost@newsroom.test", TEST_PASSWORD),
    ] {
        let response = post_json(
            common::build_test_app(pool.clone()),
            "/api/v1/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn account_locks_after_five_failures(pool: PgPool) {
    let admin = create_admin(&pool, "lockme@newsroom.test", "admin").await;
    let attempt = serde_json::json!({ "email": "lockme@newsroom.test", "password": "wrong" });

    for _ in 0..5 {
        let response = post_json(
            common::build_test_app(pool.clone()),
            "/api/v1/auth/login",
            attempt.clone(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Locked: even the right password is refused.
    let response = post_json(
        common::build_test_app(pool.clone()),
        "/api/v1/auth/login",
        serde_json::json!({ "email": "lockme@newsroom.test", "password": TEST_PASSWORD }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("locked"), "got: {error}");

    let stored = AdminUserRepo::find_by_id(&pool, admin.id).await.unwrap().unwrap();
    assert!(stored.locked_until.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn refresh_rotates_the_token(pool: PgPool) {
    create_admin(&pool, "editor@newsroom.test", "editor").await;
    let data = login(
        common::build_test_app(pool.clone()),
        "editor@newsroom.test",
        TEST_PASSWORD,
    )
    .await;
    let original = data["refresh_token"].as_str().unwrap().to_string();

    let response = post_json(
        common::build_test_app(pool.clone()),
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": original }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = body_json(response).await["data"]["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(rotated, original);

    // The old token was revoked by the rotation.
    let response = post_json(
        common::build_test_app(pool),
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": original }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn logout_revokes_refresh_tokens(pool: PgPool) {
    create_admin(&pool, "chief@newsroom.test", "admin").await;
    let data = login(
        common::build_test_app(pool.clone()),
        "chief@newsroom.test",
        TEST_PASSWORD,
    )
    .await;
    let access = data["access_token"].as_str().unwrap();
    let refresh = data["refresh_token"].as_str().unwrap();

    let response = post_json_auth(
        common::build_test_app(pool.clone()),
        "/api/v1/auth/logout",
        serde_json::json!({}),
        access,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = post_json(
        common::build_test_app(pool),
        "/api/v1/auth/refresh",
        serde_json::json!({ "refresh_token": refresh }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_routes_require_a_token(pool: PgPool) {
    let response = get(common::build_test_app(pool.clone()), "/api/v1/admin/subscribers").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_auth(
        common::build_test_app(pool),
        "/api/v1/admin/subscribers",
        "not-a-jwt",
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn editors_cannot_run_destructive_operations(pool: PgPool) {
    let token = token_for(&pool, "editor").await;

    let response = get_auth(
        common::build_test_app(pool.clone()),
        "/api/v1/admin/dashboard",
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = delete_auth(
        common::build_test_app(pool.clone()),
        "/api/v1/admin/subscribers/1",
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = common::post_auth(
        common::build_test_app(pool),
        "/api/v1/admin/subscribers/clean",
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
