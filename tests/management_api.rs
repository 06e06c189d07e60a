use node_agent::proto::workload_management_client::WorkloadManagementClient;
use node_agent::proto::workload_service_client::WorkloadServiceClient;
use node_agent::proto::{CheckRequest, WorkloadAttributes, WorkloadInfo};
use node_agent::transport::connect_unix;
use node_agent::workload::mgmt::serve_management;
use node_agent::{WorkloadRegistry, WorkloadServerOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tonic::transport::Channel;

fn event(uid: &str) -> WorkloadInfo {
    WorkloadInfo {
        attrs: Some(WorkloadAttributes {
            uid: uid.into(),
            workload: "ratings".into(),
            namespace: "default".into(),
            service_account: "ratings-sa".into(),
        }),
        workload_path: String::new(),
    }
}

async fn connect_retry(path: &Path) -> Channel {
    for _ in 0..200 {
        if let Ok(channel) = connect_unix(path).await {
            return channel;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("could not connect to {}", path.display());
}

#[tokio::test]
async fn test_add_and_delete_listener() {
    let dir = tempfile::tempdir().unwrap();
    let mgmt_path = dir.path().join("mgmt").join("mgmt.sock");
    let registry = Arc::new(WorkloadRegistry::new(WorkloadServerOptions {
        path_prefix: dir.path().join("workloads"),
        sock_file: "/server.sock".into(),
    }));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn({
        let registry = Arc::clone(&registry);
        let mgmt_path = mgmt_path.clone();
        async move {
            serve_management(registry, &mgmt_path, async {
                let _ = stop_rx.await;
            })
            .await
        }
    });

    let mut client = WorkloadManagementClient::new(connect_retry(&mgmt_path).await);

    let added = client.add_listener(event("pod-1")).await.unwrap().into_inner();
    assert_eq!(added.status.unwrap().code, 0);
    assert!(registry.contains("pod-1"));

    let duplicate = client.add_listener(event("pod-1")).await.unwrap().into_inner();
    assert_eq!(duplicate.status.unwrap().code, 6);

    let workload_sock = dir.path().join("workloads").join("pod-1").join("server.sock");
    let check = WorkloadServiceClient::new(connect_retry(&workload_sock).await)
        .check(CheckRequest {
            name: "ratings".into(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        check.status.unwrap().message,
        "all good to workload with service account ratings-sa"
    );

    let deleted = client.del_listener(event("pod-1")).await.unwrap().into_inner();
    assert_eq!(deleted.status.unwrap().code, 0);
    assert!(!workload_sock.exists());

    let missing = client.del_listener(event("pod-1")).await.unwrap().into_inner();
    assert_eq!(missing.status.unwrap().code, 5);

    let invalid = client
        .add_listener(WorkloadInfo {
            attrs: None,
            workload_path: String::new(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(invalid.status.unwrap().code, 3);

    drop(client);
    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!mgmt_path.exists());
}
