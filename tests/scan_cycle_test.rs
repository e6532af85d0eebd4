use common::config::RotationTechnique;
use common::testing::TestConfigBuilder;
use prometheus::{Encoder, TextEncoder};
use rotator::RotatorDaemon;
use std::fs::{self, File};

const MIB: u64 = 1024 * 1024;

#[tokio::test]
async fn test_default_policy_rotates_oversized_log() {
    let dir = tempfile::tempdir().unwrap();
    let pod_dir = dir.path().join("payments").join("pod1");
    fs::create_dir_all(&pod_dir).unwrap();
    let log = pod_dir.join("app.log");
    File::create(&log).unwrap().set_len(120 * MIB).unwrap();

    // Production defaults: 100Mi threshold, rename
    let config = TestConfigBuilder::new(dir.path()).build();
    let daemon = RotatorDaemon::new(config).await.unwrap();

    let summary = daemon.run_cycle().await;
    assert_eq!(summary.rotated, 1);

    let rotated = pod_dir.join("app.log.1");
    assert_eq!(fs::metadata(&rotated).unwrap().len(), 120 * MIB);
    assert_eq!(fs::metadata(&log).unwrap().len(), 0);

    let metrics = daemon.metrics();
    assert_eq!(metrics.rotations("payments", RotationTechnique::Rename), 1);
    assert_eq!(metrics.bytes_rotated("payments"), 125_829_120);
    assert_eq!(metrics.namespace_usage("payments"), 125_829_120);

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&daemon.registry().gather(), &mut buffer)
        .unwrap();
    let exposition = String::from_utf8(buffer).unwrap();
    assert!(exposition.contains(
        r#"rotator_rotations_total{namespace="payments",technique="rename"} 1"#
    ));
    assert!(exposition.contains(r#"rotator_ns_usage_bytes{namespace="payments"} 125829120"#));

    let journal = fs::read_to_string(dir.path().join(".state").join("journal.json")).unwrap();
    let journal: serde_json::Value = serde_json::from_str(&journal).unwrap();
    assert_eq!(journal["files"][&*log.to_string_lossy()], "rotated");

    assert!(daemon.shutdown().await);
}
