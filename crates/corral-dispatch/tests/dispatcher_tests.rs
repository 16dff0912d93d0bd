//! Dispatcher integration tests
//!
//! Covers partial-failure collection within a group, per-host timeouts,
//! ordered multi-group execution with short-circuit, and per-host
//! command templates.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use corral_core::{Env, Error, FailureKind};
use corral_dispatch::{
    CommandOutput, CommandTemplate, DispatchStep, HostGroupDispatcher, HostStatus,
    ResourceGraphBuilder,
};

fn dispatcher(transport: &Arc<MockTransport>) -> HostGroupDispatcher {
    HostGroupDispatcher::new(transport.clone()).with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_one_failing_host_does_not_abort_the_others() {
    let transport = Arc::new(MockTransport::new());
    transport.fail_host("n2", 1, "no space left");
    let servers = group("server", &["n1", "n2", "n3"]);

    let report = dispatcher(&transport)
        .run("mkdir -p /data", &servers, &Env::new())
        .await
        .unwrap();

    assert_eq!(report.total(), 3);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.succeeded_hosts(), vec!["n1", "n3"]);
    assert_eq!(transport.invocations_for("n1").len(), 1);
    assert_eq!(transport.invocations_for("n3").len(), 1);

    match report.into_result() {
        Err(Error::RemoteExecution {
            group,
            total,
            failures,
        }) => {
            assert_eq!(group, "server");
            assert_eq!(total, 3);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].host, "n2");
            assert_eq!(failures[0].exit_status(), Some(1));
            assert_eq!(failures[0].stderr, "no space left");
        }
        other => panic!("expected RemoteExecution, got {:?}", other.map(|r| r.total())),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_host_is_marked_timeout() {
    let transport = Arc::new(MockTransport::new());
    transport.delay_host("slow", Duration::from_secs(60));
    let clients = group("client", &["fast", "slow"]);

    let report = dispatcher(&transport)
        .run("true", &clients, &Env::new())
        .await
        .unwrap();

    assert!(report.result_for("fast").unwrap().is_success());
    assert_eq!(
        report.result_for("slow").unwrap().status,
        HostStatus::Failed(FailureKind::Timeout)
    );
    assert!(report.into_result().unwrap_err().to_string().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_hosts_in_a_group_run_concurrently() {
    let transport = Arc::new(MockTransport::new());
    for host in ["a", "b", "c", "d"] {
        transport.delay_host(host, Duration::from_secs(2));
    }
    let all = group("all", &["a", "b", "c", "d"]);

    let start = tokio::time::Instant::now();
    let report = dispatcher(&transport)
        .run("true", &all, &Env::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_run_ordered_stops_after_failed_group() {
    let transport = Arc::new(MockTransport::new());
    transport.fail_host("s1", 2, "");
    let clients = group("client", &["c1"]);
    let servers = group("server", &["s1", "s2"]);
    let metadata = group("metadata", &["m1"]);
    let env = Env::new();

    let steps = vec![
        DispatchStep::copy(&clients, vec![PathBuf::from("/p/hosts")]),
        DispatchStep::run(&servers, "start-server", &env),
        DispatchStep::run(&metadata, "start-md", &env),
    ];

    let err = dispatcher(&transport).run_ordered(&steps).await.unwrap_err();
    assert!(matches!(err, Error::RemoteExecution { ref group, .. } if group == "server"));

    // The failing group was fully collected, the later group never issued
    assert_eq!(transport.invocations_for("s2").len(), 1);
    assert!(transport.invocations_for("m1").is_empty());
    assert_eq!(transport.invocations_for("c1")[0].operation, "copy");
}

#[tokio::test]
async fn test_run_ordered_returns_every_report_on_success() {
    let transport = Arc::new(MockTransport::new());
    let env = Env::new();
    let steps = vec![
        DispatchStep::mkdir(&group("client", &["c1"]), vec![PathBuf::from("/mnt")], &env),
        DispatchStep::remove(&group("server", &["s1"]), vec![PathBuf::from("/d")], &env),
    ];

    let reports = dispatcher(&transport).run_ordered(&steps).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].operation, "mkdir");
    assert_eq!(reports[1].operation, "remove");
}

#[tokio::test]
async fn test_per_host_template_substitution() {
    let transport = Arc::new(MockTransport::new());
    let servers = group("server", &["n1", "n2"]);
    let template = CommandTemplate::new("pvfs2-server -a {{ host }} {{ conf }}")
        .with_var("conf", "/p/ofs.xml")
        .unwrap();

    dispatcher(&transport)
        .run(template, &servers, &Env::new())
        .await
        .unwrap();

    assert_eq!(
        transport.invocations_for("n2")[0].detail,
        "pvfs2-server -a n2 /p/ofs.xml"
    );
}

#[tokio::test]
async fn test_template_error_dispatches_nothing() {
    let transport = Arc::new(MockTransport::new());
    let result = dispatcher(&transport)
        .run("echo {{ missing }}", &group("client", &["c1"]), &Env::new())
        .await;

    assert!(matches!(result, Err(Error::Template(_))));
    assert!(transport.invocations().is_empty());
}

#[tokio::test]
async fn test_resource_graph_build() {
    let transport = Arc::new(MockTransport::new());
    transport.respond(
        "n1",
        "df",
        CommandOutput::success(
            "Filesystem Type 1024-blocks Used Available Capacity Mounted on\n\
             /dev/nvme0n1 xfs 1000 10 990 1% /mnt/nvme\n",
        ),
    );
    transport.respond(
        "n1",
        "ip -o",
        CommandOutput::success("2: ib0    inet 192.168.1.7/16 brd 192.168.255.255 scope global ib0\n"),
    );

    let dispatcher = dispatcher(&transport);
    let graph = ResourceGraphBuilder::new(&dispatcher)
        .build(&group("all", &["n1"]))
        .await
        .unwrap();

    assert_eq!(graph.find_mount("n1", "/mnt/nvme/ofs").unwrap().fs_type, "xfs");
    assert_eq!(graph.interfaces_for("n1").next().unwrap().interface, "ib0");
}
