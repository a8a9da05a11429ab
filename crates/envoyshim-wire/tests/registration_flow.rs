//! Client → channel → registrar → store → discovery, over a real socket.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use envoyshim_core::{
    Action, Discovery, MemoryRegistry, Registrar, RegistrationRequest, RegistryStore, RetryPolicy,
};
use envoyshim_wire::{RegistrarClient, WireError, bind, serve};
use tokio_util::sync::CancellationToken;

struct Harness {
    path: PathBuf,
    store: Arc<dyn RegistryStore>,
    token: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start() -> Self {
        let path = std::env::temp_dir().join(format!("envoyshim-flow-{}.sock", uuid::Uuid::new_v4()));
        let listener = bind(&path).expect("bind");
        let store: Arc<dyn RegistryStore> = Arc::new(MemoryRegistry::new());
        let token = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            Arc::new(Registrar::new(store.clone())),
            token.clone(),
        ));
        Self {
            path,
            store,
            token,
            server,
        }
    }

    fn client(&self) -> RegistrarClient {
        RegistrarClient::new(&self.path).with_timeout(Duration::from_millis(500))
    }

    async fn stop(self) {
        self.token.cancel();
        self.server.await.expect("server task");
        let _ = std::fs::remove_file(&self.path);
    }
}

fn alpha() -> RegistrationRequest {
    RegistrationRequest::new(
        "192.168.1.10:8080".parse().unwrap(),
        "10.0.0.1:80".parse().unwrap(),
        "alpha",
        "dev",
        "http",
    )
}

#[tokio::test]
async fn register_and_deregister_over_the_socket() {
    let harness = Harness::start();
    let client = harness.client();
    let discovery = Discovery::new(harness.store.clone());

    let reply = client
        .register(&alpha().with_action(Action::Register))
        .await
        .expect("register");
    assert!(reply.is_success());

    let clusters = discovery.cluster_document().clusters;
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].name, "alpha-dev-8080");

    client
        .register(&alpha().with_action(Action::Deregister))
        .await
        .expect("deregister");
    assert!(discovery.cluster_document().clusters.is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn unknown_action_is_rejected_without_retry() {
    let harness = Harness::start();
    let client = harness.client();
    let calls = AtomicUsize::new(0);
    let req = alpha();

    let result = RetryPolicy::from_millis(&[1, 1, 1])
        .run(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            client.register(&req)
        })
        .await;

    match result {
        Err(WireError::Rejected(msg)) => assert!(msg.contains("unknown request action")),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(harness.store.is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn unreachable_channel_exhausts_retries() {
    let path = std::env::temp_dir().join(format!("envoyshim-missing-{}.sock", uuid::Uuid::new_v4()));
    let client = RegistrarClient::new(path).with_timeout(Duration::from_millis(20));
    let calls = AtomicUsize::new(0);
    let started = Instant::now();

    let req = alpha().with_action(Action::Register);
    let result = RetryPolicy::from_millis(&[10, 10])
        .run(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            client.register(&req)
        })
        .await;

    let err = result.expect_err("nothing is listening");
    assert!(matches!(
        err,
        WireError::Connect { .. } | WireError::DeadlineExceeded(_)
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn silent_server_hits_the_call_deadline() {
    let path = std::env::temp_dir().join(format!("envoyshim-silent-{}.sock", uuid::Uuid::new_v4()));
    // Accepts connections but never answers.
    let listener = bind(&path).expect("bind");
    let holder = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let client = RegistrarClient::new(&path).with_timeout(Duration::from_millis(20));
    let err = client
        .register(&alpha().with_action(Action::Register))
        .await
        .expect_err("no reply is coming");
    assert!(matches!(err, WireError::DeadlineExceeded(_)));
    assert!(err.to_string().contains("deadline exceeded"));

    holder.abort();
    let _ = std::fs::remove_file(&path);
}
