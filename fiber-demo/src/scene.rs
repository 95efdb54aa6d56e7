//! Declarative scenes and the runner that mounts them.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use fiber_core::{
    normalize_key_selection, BindingOptions, FiberResult, FileImageLoader, ImageFactory,
    ImageLoader, MemorySurface, ObjectBinding, ObjectId, ObjectKind, Props, RenderContext,
    ScopeOptions, ShapeFactory, StackKey, SurfaceDocument, SurfaceEvent,
};
use serde::{Deserialize, Serialize};

use crate::DemoConfig;

const BUILTIN_SCENE: &str = include_str!("../scenes/default.json");

/// A scene file: a tree of groups and objects in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSpec {
    /// Top-level nodes.
    #[serde(default)]
    pub nodes: Vec<SceneNode>,
}

/// One node of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SceneNode {
    /// A scope whose overrides apply to every child.
    Group {
        /// Forced priority.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<i32>,
        /// Create children outside the queue.
        #[serde(default)]
        bypass: bool,
        /// Child nodes.
        #[serde(default)]
        children: Vec<SceneNode>,
    },
    /// A bound surface object.
    #[serde(rename_all = "camelCase")]
    Object {
        /// Object kind.
        kind: ObjectKind,
        /// Declarative model.
        #[serde(default)]
        model: Props,
        /// Explicit stacking sequence.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack_order: Option<u64>,
        /// Requested priority.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<i32>,
        /// Keys published on interaction.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bound_keys: Option<Vec<String>>,
    },
}

impl SceneSpec {
    /// The scene shipped with the demo.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled JSON does not parse.
    pub fn builtin() -> FiberResult<Self> {
        Self::from_json(BUILTIN_SCENE)
    }

    /// Parse a scene from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`fiber_core::FiberError::Serialization`] for malformed scenes.
    pub fn from_json(json: &str) -> FiberResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a scene file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn from_file(path: &Path) -> FiberResult<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Number of object nodes, including nested ones.
    #[must_use]
    pub fn object_count(&self) -> usize {
        fn count(nodes: &[SceneNode]) -> usize {
            nodes
                .iter()
                .map(|node| match node {
                    SceneNode::Group { children, .. } => count(children),
                    SceneNode::Object { .. } => 1,
                })
                .sum()
        }
        count(&self.nodes)
    }
}

/// One painted layer of a finished scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerReport {
    /// Object identity.
    pub id: ObjectId,
    /// Object kind.
    pub kind: ObjectKind,
    /// Stacking key, if the object was placed by a binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<StackKey>,
}

/// Outcome of running a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneReport {
    /// Layers bottom to top.
    pub layers: Vec<LayerReport>,
    /// Surface snapshot.
    pub document: SurfaceDocument,
    /// Diagnostics fired on the surface.
    pub events: Vec<SurfaceEvent>,
    /// Render requests observed.
    pub renders: u64,
}

impl SceneReport {
    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> FiberResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "Surface {}x{}, {} layers, {} renders\n",
            self.document.width,
            self.document.height,
            self.layers.len(),
            self.renders
        );
        for (index, layer) in self.layers.iter().enumerate() {
            let key = layer.key.map_or_else(
                || "untracked".to_string(),
                |key| format!("priority={} sequence={}", key.priority, key.sequence),
            );
            let _ = writeln!(out, "{index:>3}  {:<9} {key}", layer.kind.name());
        }
        for event in &self.events {
            let _ = writeln!(out, "  ! {event:?}");
        }
        out
    }
}

/// Mount `spec` on a fresh surface and wait until every creation settles.
///
/// # Errors
///
/// Returns an error if the surface cannot be attached or the context
/// cannot start.
pub async fn run_scene(config: &DemoConfig, spec: &SceneSpec) -> FiberResult<SceneReport> {
    let root = RenderContext::root(config.context);
    let surface = Arc::new(MemorySurface::new(config.width, config.height));
    root.attach(surface.clone())?;

    let loader: Arc<dyn ImageLoader> = Arc::new(match &config.assets {
        Some(dir) => FileImageLoader::with_base_dir(dir),
        None => FileImageLoader::new(),
    });

    let mut bindings = Vec::with_capacity(spec.object_count());
    mount_nodes(&root, &spec.nodes, &loader, &mut bindings)?;
    tracing::info!(objects = bindings.len(), "Scene mounted");

    root.start()?;
    root.on_idle().await;
    for binding in &bindings {
        if let Err(err) = binding.settled().await {
            tracing::warn!(kind = %binding.kind(), error = %err, "Object did not settle");
        }
    }

    let reconciler = root.reconciler();
    let document = surface.document();
    let layers = document
        .objects
        .iter()
        .map(|object| LayerReport {
            id: object.id,
            kind: object.kind,
            key: reconciler.as_ref().and_then(|r| r.key_of(object.id)),
        })
        .collect();
    let report = SceneReport {
        layers,
        document,
        events: surface.events(),
        renders: surface.render_count(),
    };

    drop(bindings);
    root.teardown();
    Ok(report)
}

fn mount_nodes(
    context: &RenderContext,
    nodes: &[SceneNode],
    loader: &Arc<dyn ImageLoader>,
    bindings: &mut Vec<ObjectBinding>,
) -> FiberResult<()> {
    for node in nodes {
        match node {
            SceneNode::Group {
                priority,
                bypass,
                children,
            } => {
                let scope = context.scope(ScopeOptions {
                    priority: *priority,
                    bypass: *bypass,
                });
                mount_nodes(&scope, children, loader, bindings)?;
            }
            SceneNode::Object {
                kind,
                model,
                stack_order,
                priority,
                bound_keys,
            } => {
                let options = BindingOptions {
                    sequence: *stack_order,
                    priority: *priority,
                    bound_keys: bound_keys
                        .as_deref()
                        .map(|names| normalize_key_selection(names, kind.bindable_keys())),
                };
                let binding = if *kind == ObjectKind::Image {
                    ObjectBinding::mount(
                        context,
                        ImageFactory::new(Arc::clone(loader)),
                        model.clone(),
                        options,
                    )
                } else {
                    ObjectBinding::mount(context, ShapeFactory::new(*kind)?, model.clone(), options)
                };
                bindings.push(binding);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scene_parses() {
        let spec = SceneSpec::builtin().expect("builtin scene should parse");
        assert_eq!(spec.object_count(), 10);
        assert!(matches!(
            spec.nodes.first(),
            Some(SceneNode::Object {
                kind: ObjectKind::Image,
                stack_order: Some(0),
                ..
            })
        ));
    }

    #[test]
    fn test_group_defaults() {
        let spec = SceneSpec::from_json(r#"{"nodes":[{"type":"group"}]}"#)
            .expect("empty group should parse");
        assert_eq!(
            spec.nodes,
            vec![SceneNode::Group {
                priority: None,
                bypass: false,
                children: Vec::new(),
            }]
        );
    }

    #[test]
    fn test_unknown_node_type_is_rejected() {
        let result = SceneSpec::from_json(r#"{"nodes":[{"type":"layer"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_text_lists_layers() {
        let report = SceneReport {
            layers: vec![LayerReport {
                id: ObjectId::new(),
                kind: ObjectKind::Rect,
                key: Some(StackKey::new(2, 5)),
            }],
            document: SurfaceDocument {
                width: 10.0,
                height: 20.0,
                objects: Vec::new(),
            },
            events: Vec::new(),
            renders: 3,
        };
        let text = report.render_text();
        assert!(text.starts_with("Surface 10x20, 1 layers, 3 renders"));
        assert!(text.contains("rect"));
        assert!(text.contains("priority=2 sequence=5"));
    }
}
