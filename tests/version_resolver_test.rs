//! Tests for version resolution and tag handling.

use nodeprep::config::VersionPins;
use nodeprep::fetch::Fetcher;
use nodeprep::versions;
use nodeprep::ProvisionError;

#[test]
fn tag_name_is_extracted_from_release_metadata() {
    let release: serde_json::Value = serde_json::json!({
        "tag_name": "v1.7.22",
        "name": "containerd 1.7.22",
        "prerelease": false,
    });
    assert_eq!(versions::extract_tag_name(&release), Some("v1.7.22".to_string()));
}

#[test]
fn empty_or_missing_tag_name_is_not_usable() {
    let empty: serde_json::Value = serde_json::json!({ "tag_name": "" });
    assert_eq!(versions::extract_tag_name(&empty), None);

    let missing: serde_json::Value = serde_json::json!({ "name": "release" });
    assert_eq!(versions::extract_tag_name(&missing), None);
}

#[test]
fn malformed_tags_are_resolution_failures() {
    for bad in ["", "latest", "v", "release-notes", "../../etc"] {
        let err = versions::validate_tag("containerd", bad).unwrap_err();
        assert!(
            matches!(err, ProvisionError::VersionResolution(_)),
            "tag {:?} should be rejected",
            bad
        );
    }
}

#[test]
fn well_formed_tags_pass_validation() {
    for good in ["v1.7.22", "1.1.12", "v1.5.1", "v1.30.2"] {
        assert_eq!(versions::validate_tag("runc", good).unwrap(), good);
    }
}

#[test]
fn normalization_strips_prefix_and_derives_track() {
    assert_eq!(versions::strip_v_prefix("v1.7.22"), "1.7.22");
    assert_eq!(versions::strip_v_prefix("1.7.22"), "1.7.22");
    assert_eq!(versions::release_track("v1.30.2").unwrap(), "v1.30");
    assert_eq!(versions::release_track("1.30.2").unwrap(), "v1.30");
    assert_eq!(versions::release_track("v1.30").unwrap(), "v1.30");
}

#[test]
fn track_requires_major_and_minor() {
    let err = versions::release_track("v1").unwrap_err();
    assert!(matches!(err, ProvisionError::VersionResolution(_)));
}

#[tokio::test]
async fn fully_pinned_components_resolve_without_upstream_queries() {
    let fetcher = Fetcher::new().unwrap();
    let pins = VersionPins {
        container_runtime: Some("v1.7.22".to_string()),
        low_level_runtime: Some("v1.1.12".to_string()),
        network_plugins: Some("v1.5.1".to_string()),
        orchestration_track: Some("v1.30.2".to_string()),
    };

    let resolved = versions::resolve(&fetcher, &pins).await.unwrap();
    assert_eq!(resolved.container_runtime, "1.7.22");
    assert_eq!(resolved.low_level_runtime, "v1.1.12");
    assert_eq!(resolved.network_plugins, "v1.5.1");
    assert_eq!(resolved.orchestration_track, "v1.30");
}

#[tokio::test]
async fn an_empty_pin_never_reaches_url_construction() {
    let fetcher = Fetcher::new().unwrap();
    let pins = VersionPins {
        container_runtime: Some(String::new()),
        low_level_runtime: Some("v1.1.12".to_string()),
        network_plugins: Some("v1.5.1".to_string()),
        orchestration_track: Some("v1.30.2".to_string()),
    };

    let err = versions::resolve(&fetcher, &pins).await.unwrap_err();
    assert!(matches!(err, ProvisionError::VersionResolution(_)));
}
