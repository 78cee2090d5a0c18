use ddc_core::config::DockerArgs;
use ddc_core::host::{Host, Role, Selector};
use ddc_core::testing::MockRunner;
use ddc_core::transport::{argv, Transport};
use ddc_container::ContainerTransport;
use std::path::Path;
use std::sync::Arc;

fn transport(runner: Arc<MockRunner>) -> ContainerTransport {
    ContainerTransport::with_runner(
        DockerArgs {
            docker_path: "docker".into(),
        },
        runner,
    )
}

#[tokio::test]
async fn test_docker_exec() {
    let runner = Arc::new(MockRunner::with_responses([Ok("success")]));
    let t = transport(runner.clone());
    let host = Host::new("dremio-executor", Role::Executor);

    let out = t.execute(false, &host, &argv(["ls", "-l"])).await.unwrap();
    assert_eq!(out, "success");
    assert_eq!(
        runner.calls(),
        vec![argv(["docker", "exec", "dremio-executor", "ls", "-l"])]
    );
}

#[tokio::test]
async fn test_copy_from_container() {
    let runner = Arc::new(MockRunner::new());
    let t = transport(runner.clone());
    let host = Host::new("dremio", Role::Coordinator);

    t.copy_from_host(&host, "/var/log/dremio", Path::new("/out/logs"))
        .await
        .unwrap();
    assert_eq!(
        runner.calls(),
        vec![argv(["docker", "cp", "dremio:/var/log/dremio", "/out/logs"])]
    );
}

#[tokio::test]
async fn test_sudo_copy_from_degrades_to_plain() {
    let runner = Arc::new(MockRunner::new());
    let t = transport(runner.clone());
    let host = Host::new("dremio", Role::Coordinator);

    t.copy_from_host_sudo(&host, "dremio", "/opt/dremio/conf", Path::new("/out/conf"))
        .await
        .unwrap();
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].iter().any(|a| a == "sudo"));
    assert!(!t.needs_escalated_copy());
}

#[tokio::test]
async fn test_copy_to_container_fixes_ownership() {
    let runner = Arc::new(MockRunner::new());
    let t = transport(runner.clone());
    let host = Host::new("dremio", Role::Coordinator);

    t.copy_to_host_sudo(&host, "ignored", Path::new("ddc.yaml"), "/tmp/ddc/ddc.yaml")
        .await
        .unwrap();
    assert_eq!(
        runner.calls(),
        vec![
            argv(["docker", "cp", "ddc.yaml", "dremio:/tmp/ddc/ddc.yaml"]),
            argv([
                "docker",
                "exec",
                "--user",
                "root",
                "dremio",
                "chown",
                "dremio:dremio",
                "/tmp/ddc/ddc.yaml"
            ]),
        ]
    );
}

#[tokio::test]
async fn test_failed_copy_skips_chown() {
    let runner = Arc::new(MockRunner::with_responses([Err("No such container: dremio")]));
    let t = transport(runner.clone());
    let host = Host::new("dremio", Role::Coordinator);

    let err = t
        .copy_to_host(&host, Path::new("ddc.yaml"), "/tmp/ddc/ddc.yaml")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No such container: dremio");
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_docker_search_filters_by_role() {
    let listing = "'dremio-executor-1'\n'dremio-coordinator-1'\n\n";
    let runner = Arc::new(MockRunner::with_responses([Ok(listing), Ok(listing)]));
    let t = transport(runner.clone());

    let coordinators = t
        .find_hosts(&Selector::new("dremio", Role::Coordinator))
        .await
        .unwrap();
    assert_eq!(coordinators, vec!["dremio-coordinator-1"]);

    let executors = t
        .find_hosts(&Selector::new("dremio", Role::Executor))
        .await
        .unwrap();
    assert_eq!(executors, vec!["dremio-executor-1"]);

    assert_eq!(
        runner.calls()[0],
        argv([
            "docker",
            "ps",
            "--filter",
            "name=dremio",
            "--format",
            "'{{.Names}}'"
        ])
    );
}

#[tokio::test]
async fn test_docker_search_error_is_returned() {
    let runner = Arc::new(MockRunner::with_responses([Err(
        "Cannot connect to the Docker daemon",
    )]));
    let t = transport(runner);
    let err = t
        .find_hosts(&Selector::new("dremio", Role::Coordinator))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Docker daemon"));
}
