use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Handle to a node in the [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Group,
    Quad,
    Ring { segments: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f32; 3],
    pub scale: [f32; 3],
    pub rotation: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            scale: [1.0; 3],
            rotation: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Id of the layer that allocated the node.
    pub owner: String,
    pub kind: NodeKind,
    pub transform: Transform,
    pub color: [f32; 4],
    pub visible: bool,
}

impl Node {
    pub fn new(owner: &str, kind: NodeKind) -> Self {
        Self {
            owner: owner.to_string(),
            kind,
            transform: Transform::default(),
            color: [1.0; 4],
            visible: true,
        }
    }
}

/// Flat scene graph shared by all layers. Each layer only touches the
/// nodes it allocated.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: BTreeMap<NodeId, Node>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visible = visible;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn owned_by(&self, owner: &str) -> usize {
        self.nodes.values().filter(|n| n.owner == owner).count()
    }

    pub fn visible_count(&self) -> usize {
        self.nodes.values().filter(|n| n.visible).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov_degrees: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 5.0],
            target: [0.0; 3],
            fov_degrees: 60.0,
        }
    }
}

/// Output surface in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    /// False when the surface has been lost or was never acquired.
    pub available: bool,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            available: width > 0 && height > 0,
        }
    }

    pub fn lost() -> Self {
        Self {
            width: 0,
            height: 0,
            available: false,
        }
    }
}

/// Summary of what a frame would put on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawStats {
    pub nodes: usize,
    pub visible_nodes: usize,
}

/// Everything a layer may read or write while it renders. Owned by the
/// render driver and handed to each layer in turn.
#[derive(Debug)]
pub struct RenderContext {
    pub scene: Scene,
    pub camera: Camera,
    pub surface: Surface,
    pub pixel_ratio: f32,
    /// Size in logical (CSS-style) pixels.
    pub logical_size: (f32, f32),
}

impl RenderContext {
    pub fn new(width: u32, height: u32, pixel_ratio: f32) -> Self {
        let pixel_ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            pixel_ratio
        } else {
            1.0
        };
        Self {
            scene: Scene::new(),
            camera: Camera::default(),
            surface: Surface::new(width, height),
            pixel_ratio,
            logical_size: (width as f32 / pixel_ratio, height as f32 / pixel_ratio),
        }
    }

    pub fn aspect(&self) -> f32 {
        let (w, h) = self.logical_size;
        if h > 0.0 {
            w / h
        } else {
            1.0
        }
    }

    pub fn draw(&self) -> DrawStats {
        DrawStats {
            nodes: self.scene.len(),
            visible_nodes: self.scene.visible_count(),
        }
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(1280, 720, 1.0)
    }
}
