//! Integration tests for running scenes end to end.

use fiber_core::{ObjectKind, StackKey, SurfaceEvent};
use fiber_demo::{run_scene, DemoConfig, SceneSpec};

const PIXEL_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

// ============================================================================
// Built-in scene
// ============================================================================

#[tokio::test]
async fn test_builtin_scene_layers_by_priority() {
    let spec = SceneSpec::builtin().expect("builtin scene should parse");
    let report = run_scene(&DemoConfig::new(), &spec)
        .await
        .expect("builtin scene should run");

    assert!(report.events.is_empty(), "unexpected events: {:?}", report.events);
    assert_eq!(report.layers.len(), spec.object_count());

    let kinds: Vec<ObjectKind> = report.layers.iter().map(|l| l.kind).collect();
    assert_eq!(kinds.first(), Some(&ObjectKind::Ellipse));
    assert_eq!(
        &kinds[kinds.len() - 2..],
        &[ObjectKind::Text, ObjectKind::Path]
    );

    let keys: Vec<StackKey> = report
        .layers
        .iter()
        .map(|l| l.key.expect("every layer should be tracked"))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[tokio::test]
async fn test_builtin_scene_json_report() {
    let spec = SceneSpec::builtin().expect("builtin scene should parse");
    let report = run_scene(&DemoConfig::new(), &spec)
        .await
        .expect("builtin scene should run");

    let json = report.to_json().expect("report should serialize");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(value["document"]["width"], 800.0);
    assert_eq!(
        value["layers"].as_array().map(Vec::len),
        Some(spec.object_count())
    );
}

// ============================================================================
// Scene files
// ============================================================================

#[tokio::test]
async fn test_scene_file_with_groups() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("scene.json");
    let scene = serde_json::json!({
        "nodes": [
            { "type": "object", "kind": "rect", "priority": 5 },
            { "type": "group", "priority": 1, "children": [
                { "type": "object", "kind": "circle", "priority": 9 }
            ]},
            { "type": "object", "kind": "image", "model": { "src": PIXEL_PNG, "width": 40 } },
            { "type": "object", "kind": "text", "model": { "text": "hello" }, "stackOrder": 0 }
        ]
    });
    std::fs::write(&path, scene.to_string()).expect("should write scene");

    let spec = SceneSpec::from_file(&path).await.expect("scene should load");
    let report = run_scene(&DemoConfig::new(), &spec)
        .await
        .expect("scene should run");

    let kinds: Vec<ObjectKind> = report.layers.iter().map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ObjectKind::Text,
            ObjectKind::Image,
            ObjectKind::Circle,
            ObjectKind::Rect,
        ]
    );

    let image = report
        .document
        .objects
        .iter()
        .find(|o| o.kind == ObjectKind::Image)
        .expect("image should be on the surface");
    assert!((image.props.scale_x.unwrap_or_default() - 40.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_missing_image_is_reported() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let spec = SceneSpec::from_json(
        r#"{"nodes":[
            {"type":"object","kind":"image","model":{"src":"missing.png"}},
            {"type":"object","kind":"rect"}
        ]}"#,
    )
    .expect("scene should parse");
    let config = DemoConfig {
        assets: Some(dir.path().to_path_buf()),
        ..DemoConfig::new()
    };

    let report = run_scene(&config, &spec).await.expect("scene should run");

    assert_eq!(report.document.kinds(), vec![ObjectKind::Rect]);
    assert!(matches!(
        report.events.as_slice(),
        [SurfaceEvent::ImageError { src, .. }] if src == "missing.png"
    ));
    assert!(report.render_text().contains("ImageError"));
}

#[tokio::test]
async fn test_missing_scene_file_fails() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let result = SceneSpec::from_file(&dir.path().join("nope.json")).await;
    assert!(result.is_err());
}
