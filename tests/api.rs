mod common;

use std::sync::atomic::Ordering;

use deskchat::api::ApiClient;
use deskchat::channel::{Channel, ConnectionState};
use deskchat::conversation::Conversation;
use deskchat::error::ChatError;
use deskchat::models::message::Origin;
use deskchat::models::user::UserId;
use deskchat::session::Session;

use common::{TestServer, EMAIL, LOCAL_ID, PASSWORD, PEER_ID};

async fn logged_in_api(server: &TestServer) -> ApiClient {
    let api = ApiClient::new(server.http_url.clone(), Session::new());
    api.login(EMAIL, PASSWORD).await.unwrap();
    api
}

#[tokio::test]
async fn test_login_stores_session() {
    let server = TestServer::spawn().await;
    let session = Session::new();
    let api = ApiClient::new(server.http_url.clone(), session.clone());

    let user = api.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(user.id, UserId(LOCAL_ID));
    assert_eq!(user.full_name, "Agent Smith");
    assert_eq!(session.access_token().as_deref(), Some(common::VALID_TOKEN));
    assert_eq!(session.refresh_token().as_deref(), Some("refresh-token"));
    assert_eq!(session.identity(), Some(UserId(LOCAL_ID)));
}

#[tokio::test]
async fn test_bad_credentials_are_authentication_error() {
    let server = TestServer::spawn().await;
    let session = Session::new();
    let api = ApiClient::new(server.http_url.clone(), session.clone());

    let err = api.login(EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, ChatError::Authentication(_)), "got {err:?}");
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_login_connect_and_list_peers() {
    let server = TestServer::spawn().await;
    let api = logged_in_api(&server).await;

    let channel = Channel::new(server.channel_config(), api.session().clone());
    channel.connect().await.unwrap();
    assert_eq!(channel.state(), ConnectionState::Connected);

    // four directory entries, one of them is us
    let peers = api.peers().await.unwrap();
    assert_eq!(peers.len(), 3);
    assert!(peers.iter().all(|p| p.id != UserId(LOCAL_ID)));
    let grace = peers.iter().find(|p| p.id == UserId(PEER_ID)).unwrap();
    assert_eq!(grace.display_name(), "Grace Hopper");

    channel.disconnect();
}

#[tokio::test]
async fn test_history_is_classified() {
    let server = TestServer::spawn().await;
    let api = logged_in_api(&server).await;

    let history = api.history(UserId(PEER_ID)).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].origin, Origin::Other);
    assert_eq!(history[0].body, "printer is on fire");
    assert_eq!(history[1].origin, Origin::Own);

    let conversation = Conversation::with_history(UserId(PEER_ID), history);
    assert_eq!(conversation.len(), 2);
}

#[tokio::test]
async fn test_unauthorized_history_drops_session() {
    let server = TestServer::spawn().await;
    let api = logged_in_api(&server).await;
    server.state.revoke_all_tokens();

    let err = api.history(UserId(PEER_ID)).await.unwrap_err();
    assert!(matches!(err, ChatError::HistoryFetch(_)));
    assert!(err.is_unauthorized());
    assert!(!api.session().is_authenticated());

    // the channel now refuses to connect until the user logs in again
    let channel = Channel::new(server.channel_config(), api.session().clone());
    assert!(matches!(
        channel.connect().await,
        Err(ChatError::Authentication(_))
    ));
}

#[tokio::test]
async fn test_directory_failure_degrades_to_empty() {
    let server = TestServer::spawn().await;
    let api = ApiClient::new(server.http_url.clone(), Session::with_token("expired"));

    let err = api.peers().await.unwrap_err();
    assert!(matches!(err, ChatError::DirectoryFetch(_)));
    assert!(err.is_unauthorized());

    let api = ApiClient::new(server.http_url.clone(), Session::with_token("expired"));
    assert!(api.peers_or_empty().await.is_empty());
}

#[tokio::test]
async fn test_history_server_error_degrades_to_empty() {
    let server = TestServer::spawn().await;
    let api = logged_in_api(&server).await;

    match api.history(UserId(500)).await {
        Err(ChatError::HistoryFetch(failure)) => assert_eq!(failure.status, Some(500)),
        other => panic!("expected history fetch error, got {other:?}"),
    }
    assert!(api.history_or_empty(UserId(500)).await.is_empty());
    // a 5xx leaves the session alone
    assert!(api.session().is_authenticated());
}

#[tokio::test]
async fn test_unreachable_directory_is_transport_failure() {
    let api = ApiClient::new("http://127.0.0.1:9", Session::with_token("t"));
    match api.peers().await {
        Err(ChatError::DirectoryFetch(failure)) => assert_eq!(failure.status, None),
        other => panic!("expected directory fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_logout_clears_session_best_effort() {
    let server = TestServer::spawn().await;
    let api = logged_in_api(&server).await;

    api.logout().await;
    assert_eq!(server.state.logouts.load(Ordering::SeqCst), 1);
    assert!(!api.session().is_authenticated());

    // nothing to do a second time
    api.logout().await;
    assert_eq!(server.state.logouts.load(Ordering::SeqCst), 1);

    let offline = ApiClient::new("http://127.0.0.1:9", Session::with_token("t"));
    offline.logout().await;
    assert!(!offline.session().is_authenticated());
}
