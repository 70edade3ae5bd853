//! Hub behaviour through the public API, including concurrent use.

#![allow(clippy::panic)]

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinSet;

use relay_gateway::domain::{Envelope, EventType, Role, UserId};
use relay_gateway::ws::{ConnectionHandle, ConnectionState, Hub, RouteOutcome};

fn notification(user: &str) -> Envelope {
    Envelope::notification(UserId::new(user), json!({ "title": "hello" }))
}

#[tokio::test]
async fn replacement_leaves_only_the_newest_connection() {
    let hub = Hub::new();
    let user = UserId::new("u-1");
    let (a, _rx_a) = ConnectionHandle::new(user.clone(), Role::Student, 8);
    let (b, mut rx_b) = ConnectionHandle::new(user.clone(), Role::Student, 8);

    hub.register(Arc::clone(&a)).await;
    hub.register(Arc::clone(&b)).await;

    assert!(a.state() >= ConnectionState::Closing);
    assert_eq!(b.state(), ConnectionState::Active);
    assert_eq!(hub.online_count().await, 1);

    assert!(!hub.unregister(&a).await);
    assert!(hub.is_online(&user).await);

    assert_eq!(
        hub.route_to_identity(&user, &notification("u-1")).await,
        RouteOutcome::Delivered
    );
    let Some(frame) = rx_b.recv().await else {
        panic!("newest connection got nothing");
    };
    assert!(frame.contains("\"notification\""));
}

#[tokio::test]
async fn offline_identity_is_dropped_silently() {
    let hub = Hub::new();
    let outcome = hub
        .route_to_identity(&UserId::new("ghost"), &notification("ghost"))
        .await;
    assert_eq!(outcome, RouteOutcome::Offline);
    assert_eq!(hub.stats().await.dropped_frames, 0);
}

#[tokio::test]
async fn concurrent_registration_keeps_one_connection_per_identity() {
    let hub = Arc::new(Hub::new());
    let mut tasks = JoinSet::new();
    for n in 0..64 {
        let hub = Arc::clone(&hub);
        tasks.spawn(async move {
            let user = UserId::new(format!("user-{}", n % 8));
            let (handle, rx) = ConnectionHandle::new(user, Role::Registrar, 4);
            hub.register(Arc::clone(&handle)).await;
            (handle, rx)
        });
    }
    let mut handles = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let Ok(pair) = joined else {
            panic!("registration task failed");
        };
        handles.push(pair);
    }

    assert_eq!(hub.online_count().await, 8);
    let active = handles
        .iter()
        .filter(|(h, _)| h.state() == ConnectionState::Active)
        .count();
    assert_eq!(active, 8);

    let envelope = Envelope::event(EventType::PortfolioCreated, None, json!({}));
    assert_eq!(hub.route_by_role(Role::Registrar, &envelope).await, 8);
    assert_eq!(hub.route_by_role(Role::Student, &envelope).await, 0);
}

#[tokio::test]
async fn routing_during_churn_never_blocks() {
    let hub = Arc::new(Hub::new());
    let (steady, mut steady_rx) = ConnectionHandle::new(UserId::new("steady"), Role::Admin, 1024);
    hub.register(Arc::clone(&steady)).await;

    let churn = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            for n in 0..200 {
                let (handle, _rx) =
                    ConnectionHandle::new(UserId::new(format!("c-{n}")), Role::Student, 1);
                hub.register(Arc::clone(&handle)).await;
                hub.unregister(&handle).await;
            }
        })
    };
    let sender = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            let user = UserId::new("steady");
            let mut delivered = 0;
            for _ in 0..200 {
                if hub.route_to_identity(&user, &notification("steady")).await
                    == RouteOutcome::Delivered
                {
                    delivered += 1;
                }
            }
            delivered
        })
    };

    assert!(churn.await.is_ok());
    let Ok(delivered) = sender.await else {
        panic!("sender task failed");
    };
    assert_eq!(delivered, 200);

    let mut received = 0;
    while steady_rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 200);
    assert_eq!(hub.online_users().await, vec![UserId::new("steady")]);
}

#[tokio::test]
async fn dropped_frames_are_counted() {
    let hub = Hub::new();
    let user = UserId::new("slow");
    let (handle, _rx) = ConnectionHandle::new(user.clone(), Role::Employer, 2);
    hub.register(handle).await;

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        outcomes.push(hub.route_to_identity(&user, &notification("slow")).await);
    }

    assert_eq!(
        outcomes,
        vec![
            RouteOutcome::Delivered,
            RouteOutcome::Delivered,
            RouteOutcome::Dropped,
            RouteOutcome::Dropped,
            RouteOutcome::Dropped,
        ]
    );
    assert_eq!(hub.stats().await.dropped_frames, 3);
}
