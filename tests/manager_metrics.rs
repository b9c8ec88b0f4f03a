use std::collections::HashSet;
use std::sync::Arc;

use cachemgr::infra::telemetry;
use cachemgr::management::{IdentityTable, ManagementServer};
use cachemgr::manager::CacheManager;
use metrics_util::debugging::DebuggingRecorder;

#[test]
fn lifecycle_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let manager = CacheManager::builder()
        .domain("metrics")
        .identity_table(Arc::new(IdentityTable::new()))
        .management_server(Arc::new(ManagementServer::new()))
        .build()
        .expect("manager should start");

    manager.start_default_cache().expect("running");
    manager.start_cache("a").expect("running");
    manager.stop_cache("a").expect("running");
    let gateway = manager.gateway();
    assert!(gateway.invoke("stop", &[]).is_err());
    manager.stop();

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "cachemgr_cache_created_total",
        "cachemgr_cache_start_total",
        "cachemgr_cache_stop_total",
        "cachemgr_running_caches",
        "cachemgr_gateway_rejected_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
