//! Node graphs. A tree owns its nodes and links; nodes are addressed by a
//! [`NodeId`] that stays valid while other nodes come and go.

use super::{check_struct, id::IdRef, unique_name, ModelError};
use crate::record::Record;
use log::debug;
use serde::Serialize;
use std::{collections::HashSet, fmt, num::NonZeroU64};

const MAX_NODE_NAME: usize = 63;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Input,
    Output,
}

/// The default value of a socket, stored in DNA as one of the
/// `bNodeSocketValue*` structs behind `default_value`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SocketValue {
    Float(f32),
    Int(i32),
    Boolean(bool),
    Vector([f32; 3]),
    Rgba([f32; 4]),
    String(String),
    Object(Option<IdRef>),
    Image(Option<IdRef>),
    Shader,
}

impl SocketValue {
    /// The DNA struct holding this value, `None` for sockets without one.
    pub fn struct_name(&self) -> Option<&'static str> {
        Some(match self {
            SocketValue::Float(_) => "bNodeSocketValueFloat",
            SocketValue::Int(_) => "bNodeSocketValueInt",
            SocketValue::Boolean(_) => "bNodeSocketValueBoolean",
            SocketValue::Vector(_) => "bNodeSocketValueVector",
            SocketValue::Rgba(_) => "bNodeSocketValueRGBA",
            SocketValue::String(_) => "bNodeSocketValueString",
            SocketValue::Object(_) => "bNodeSocketValueObject",
            SocketValue::Image(_) => "bNodeSocketValueImage",
            SocketValue::Shader => return None,
        })
    }

    /// Reads a `bNodeSocketValue*` record. `resolve` maps stored addresses
    /// to the datablocks they pointed at.
    pub fn from_record(
        record: &Record<'_>,
        resolve: &dyn Fn(NonZeroU64) -> Option<IdRef>,
    ) -> Result<SocketValue, crate::Error> {
        let value = match record.type_name() {
            "bNodeSocketValueFloat" => SocketValue::Float(record.get_f32("value")?),
            "bNodeSocketValueInt" => SocketValue::Int(record.get_i32("value")?),
            "bNodeSocketValueBoolean" => SocketValue::Boolean(record.get_u8("value")? != 0),
            "bNodeSocketValueVector" => SocketValue::Vector(record.get_f32_array("value")?),
            "bNodeSocketValueRGBA" => SocketValue::Rgba(record.get_f32_array("value")?),
            "bNodeSocketValueString" => SocketValue::String(record.get_string("value")?),
            "bNodeSocketValueObject" => {
                SocketValue::Object(record.get_pointer("value")?.and_then(resolve))
            }
            "bNodeSocketValueImage" => {
                SocketValue::Image(record.get_pointer("value")?.and_then(resolve))
            }
            other => {
                return Err(ModelError::VariantMismatch {
                    expected: "bNodeSocketValue",
                    found: other.to_string(),
                }
                .into())
            }
        };
        Ok(value)
    }

    pub fn reference(&self) -> Option<IdRef> {
        match self {
            SocketValue::Object(r) | SocketValue::Image(r) => *r,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Socket {
    pub name: String,
    pub value: SocketValue,
    /// Accepts any number of incoming links.
    pub multi_input: bool,
}

impl Socket {
    pub fn new<T: Into<String>>(name: T, value: SocketValue) -> Socket {
        Socket {
            name: name.into(),
            value,
            multi_input: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    id: NodeId,
    pub idname: String,
    pub name: String,
    pub inputs: Vec<Socket>,
    pub outputs: Vec<Socket>,
    pub location: [f32; 2],
    /// The frame this node sits in.
    pub parent: Option<NodeId>,
    /// Datablock used by the node, like the image of an image texture.
    pub data: Option<IdRef>,
}

impl Node {
    pub fn new<T: Into<String>>(idname: T, name: T) -> Node {
        Node {
            id: NodeId(0),
            idname: idname.into(),
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            location: [0.0; 2],
            parent: None,
            data: None,
        }
    }

    pub fn input(mut self, socket: Socket) -> Node {
        self.inputs.push(socket);
        self
    }

    pub fn output(mut self, socket: Socket) -> Node {
        self.outputs.push(socket);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    fn socket(&self, direction: Direction, index: usize) -> Option<&Socket> {
        match direction {
            Direction::Input => self.inputs.get(index),
            Direction::Output => self.outputs.get(index),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SocketRef {
    pub node: NodeId,
    pub direction: Direction,
    pub index: usize,
}

impl SocketRef {
    pub fn input(node: NodeId, index: usize) -> SocketRef {
        SocketRef {
            node,
            direction: Direction::Input,
            index,
        }
    }

    pub fn output(node: NodeId, index: usize) -> SocketRef {
        SocketRef {
            node,
            direction: Direction::Output,
            index,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub from: SocketRef,
    pub to: SocketRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeTree {
    pub idname: String,
    nodes: Vec<Node>,
    links: Vec<Link>,
    next_id: u32,
}

impl NodeTree {
    pub fn new<T: Into<String>>(idname: T) -> NodeTree {
        NodeTree {
            idname: idname.into(),
            ..NodeTree::default()
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn find(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn expect(&self, id: NodeId) -> Result<&Node, ModelError> {
        self.node(id).ok_or(ModelError::InvalidIndex {
            what: "node",
            index: id.0 as usize,
        })
    }

    /// Adds a node, renaming it if the tree already has one by that name.
    pub fn add_node(&mut self, mut node: Node) -> Result<NodeId, ModelError> {
        if node.name.is_empty() {
            return Err(ModelError::EmptyName("node"));
        }
        if let Some(parent) = node.parent {
            self.expect(parent)?;
        }
        let nodes = &self.nodes;
        node.name = unique_name(&node.name, MAX_NODE_NAME, |n| nodes.iter().any(|o| o.name == n));
        self.next_id += 1;
        node.id = NodeId(self.next_id);
        let id = node.id;
        self.nodes.push(node);
        Ok(id)
    }

    /// Removes a node with its links. Nodes inside it lose their parent.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, ModelError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(ModelError::InvalidIndex {
                what: "node",
                index: id.0 as usize,
            })?;
        let node = self.nodes.remove(index);
        let before = self.links.len();
        self.links.retain(|l| l.from.node != id && l.to.node != id);
        debug!(
            "removed node `{}` and {} links",
            node.name,
            before - self.links.len()
        );
        for other in &mut self.nodes {
            if other.parent == Some(id) {
                other.parent = None;
            }
        }
        Ok(node)
    }

    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if seen.insert(node) {
                stack.extend(
                    self.links
                        .iter()
                        .filter(|l| l.from.node == node)
                        .map(|l| l.to.node),
                );
            }
        }
        false
    }

    /// Links an output socket to an input socket. A link already arriving
    /// at a single input is replaced. Links never form a cycle.
    pub fn link(&mut self, from: SocketRef, to: SocketRef) -> Result<(), ModelError> {
        if from.direction != Direction::Output || to.direction != Direction::Input {
            return Err(ModelError::InvalidLink("links go from an output to an input".into()));
        }
        let invalid_socket = |s: SocketRef| ModelError::InvalidIndex {
            what: "socket",
            index: s.index,
        };
        let source = self
            .expect(from.node)?
            .socket(from.direction, from.index)
            .ok_or_else(|| invalid_socket(from))?;
        let target = self
            .expect(to.node)?
            .socket(to.direction, to.index)
            .ok_or_else(|| invalid_socket(to))?;
        if (source.value == SocketValue::Shader) != (target.value == SocketValue::Shader) {
            return Err(ModelError::InvalidLink(format!(
                "`{}` and `{}` carry different kinds of data",
                source.name, target.name
            )));
        }
        if self.reaches(to.node, from.node) {
            return Err(ModelError::InvalidLink(format!(
                "{} already depends on {}",
                from.node, to.node
            )));
        }
        if !target.multi_input {
            self.links.retain(|l| l.to != to);
        }
        self.links.retain(|l| !(l.from == from && l.to == to));
        self.links.push(Link { from, to });
        Ok(())
    }

    pub fn unlink(&mut self, from: SocketRef, to: SocketRef) -> bool {
        let before = self.links.len();
        self.links.retain(|l| !(l.from == from && l.to == to));
        before != self.links.len()
    }

    /// Links arriving at `socket`.
    pub fn links_to(&self, socket: SocketRef) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |l| l.to == socket)
    }

    /// Puts `child` inside `parent`. A node can't end up inside itself.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<(), ModelError> {
        self.expect(child)?;
        if let Some(parent) = parent {
            self.expect(parent)?;
            let mut current = Some(parent);
            while let Some(id) = current {
                if id == child {
                    let name = self.expect(child)?.name.clone();
                    return Err(ModelError::ParentCycle(name));
                }
                current = self.node(id).and_then(|n| n.parent);
            }
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = parent;
        }
        Ok(())
    }

    /// Every datablock the nodes use.
    pub fn references(&self) -> impl Iterator<Item = IdRef> + '_ {
        self.nodes.iter().flat_map(|node| {
            node.data.into_iter().chain(
                node.inputs
                    .iter()
                    .chain(node.outputs.iter())
                    .filter_map(|s| s.value.reference()),
            )
        })
    }
}

/// A material. Its shader graph is embedded, not a datablock of its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    pub color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub node_tree: Option<NodeTree>,
}

impl Default for Material {
    fn default() -> Material {
        Material {
            color: [0.8, 0.8, 0.8, 1.0],
            metallic: 0.0,
            roughness: 0.4,
            node_tree: None,
        }
    }
}

impl Material {
    /// Reads the surface settings of a `Material` record. The node tree is
    /// stored separately and is not read here.
    pub fn from_record(record: &Record<'_>) -> Result<Material, crate::Error> {
        check_struct(record, "Material")?;
        Ok(Material {
            color: [
                record.get_f32("r")?,
                record.get_f32("g")?,
                record.get_f32("b")?,
                record.get_f32("a")?,
            ],
            metallic: record.get_f32("metallic")?,
            roughness: record.get_f32("roughness")?,
            node_tree: None,
        })
    }

    pub fn references(&self) -> impl Iterator<Item = IdRef> + '_ {
        self.node_tree.iter().flat_map(NodeTree::references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::Catalog,
        model::id::{IdCode, SessionUid},
        parsers::Target,
        record::RecordBuf,
    };

    fn shader_tree() -> (NodeTree, NodeId, NodeId, NodeId) {
        let mut tree = NodeTree::new("ShaderNodeTree");
        let tex = tree
            .add_node(
                Node::new("ShaderNodeTexImage", "Image Texture")
                    .output(Socket::new("Color", SocketValue::Rgba([0.0; 4]))),
            )
            .unwrap();
        let bsdf = tree
            .add_node(
                Node::new("ShaderNodeBsdfPrincipled", "Principled BSDF")
                    .input(Socket::new("Base Color", SocketValue::Rgba([0.8, 0.8, 0.8, 1.0])))
                    .output(Socket::new("BSDF", SocketValue::Shader)),
            )
            .unwrap();
        let out = tree
            .add_node(
                Node::new("ShaderNodeOutputMaterial", "Material Output")
                    .input(Socket::new("Surface", SocketValue::Shader)),
            )
            .unwrap();
        (tree, tex, bsdf, out)
    }

    #[test]
    fn names_are_unique() {
        let (mut tree, ..) = shader_tree();
        let id = tree.add_node(Node::new("ShaderNodeTexImage", "Image Texture")).unwrap();
        assert_eq!(tree.node(id).unwrap().name, "Image Texture.001");
        assert!(tree.add_node(Node::new("ShaderNodeMath", "")).is_err());
    }

    #[test]
    fn links() {
        let (mut tree, tex, bsdf, out) = shader_tree();
        tree.link(SocketRef::output(tex, 0), SocketRef::input(bsdf, 0)).unwrap();
        tree.link(SocketRef::output(bsdf, 0), SocketRef::input(out, 0)).unwrap();
        assert_eq!(tree.links().len(), 2);

        assert!(matches!(
            tree.link(SocketRef::input(bsdf, 0), SocketRef::output(tex, 0)),
            Err(ModelError::InvalidLink(_))
        ));
        assert!(matches!(
            tree.link(SocketRef::output(tex, 0), SocketRef::input(out, 0)),
            Err(ModelError::InvalidLink(_))
        ));
        assert!(matches!(
            tree.link(SocketRef::output(tex, 3), SocketRef::input(bsdf, 0)),
            Err(ModelError::InvalidIndex { what: "socket", .. })
        ));

        let other = tree
            .add_node(
                Node::new("ShaderNodeRGB", "RGB").output(Socket::new("Color", SocketValue::Rgba([1.0; 4]))),
            )
            .unwrap();
        tree.link(SocketRef::output(other, 0), SocketRef::input(bsdf, 0)).unwrap();
        assert_eq!(tree.links_to(SocketRef::input(bsdf, 0)).count(), 1);
        assert_eq!(tree.links().len(), 2);

        tree.remove_node(bsdf).unwrap();
        assert!(tree.links().is_empty());
        assert!(tree.node(bsdf).is_none());
    }

    #[test]
    fn links_do_not_cycle() {
        let mut tree = NodeTree::new("ShaderNodeTree");
        let math = |name| {
            Node::new("ShaderNodeMath", name)
                .input(Socket::new("Value", SocketValue::Float(0.5)))
                .output(Socket::new("Value", SocketValue::Float(0.0)))
        };
        let a = tree.add_node(math("Math")).unwrap();
        let b = tree.add_node(math("Math")).unwrap();
        tree.link(SocketRef::output(a, 0), SocketRef::input(b, 0)).unwrap();
        assert!(tree.link(SocketRef::output(b, 0), SocketRef::input(a, 0)).is_err());
        assert!(tree.link(SocketRef::output(a, 0), SocketRef::input(a, 0)).is_err());
    }

    #[test]
    fn frames() {
        let (mut tree, tex, bsdf, _) = shader_tree();
        let frame = tree.add_node(Node::new("NodeFrame", "Frame")).unwrap();
        tree.set_parent(tex, Some(frame)).unwrap();
        tree.set_parent(bsdf, Some(tex)).unwrap();
        assert_eq!(
            tree.set_parent(frame, Some(bsdf)),
            Err(ModelError::ParentCycle("Frame".to_string()))
        );
        tree.remove_node(frame).unwrap();
        assert_eq!(tree.node(tex).unwrap().parent, None);
        assert_eq!(tree.node(bsdf).unwrap().parent, Some(tex));
    }

    #[test]
    fn socket_values_from_records() {
        let catalog = Catalog::builtin().unwrap();
        let layouts = catalog.layouts(Target::LITTLE_32).unwrap();
        let image = IdRef {
            code: IdCode::Image,
            uid: SessionUid::new(7).unwrap(),
        };
        let resolve = |address: NonZeroU64| {
            if address.get() == 0x1000 {
                Some(image)
            } else {
                None
            }
        };

        let mut buf = RecordBuf::zeroed(&layouts, "bNodeSocketValueVector").unwrap();
        buf.as_mut().set_slice("value", &[1.0f32, 2.0, 3.0]).unwrap();
        assert_eq!(
            SocketValue::from_record(&buf.as_record(), &resolve).unwrap(),
            SocketValue::Vector([1.0, 2.0, 3.0])
        );

        let mut buf = RecordBuf::zeroed(&layouts, "bNodeSocketValueImage").unwrap();
        buf.as_mut().set_pointer("value", NonZeroU64::new(0x1000)).unwrap();
        let value = SocketValue::from_record(&buf.as_record(), &resolve).unwrap();
        assert_eq!(value.reference(), Some(image));
        assert_eq!(value.struct_name(), Some("bNodeSocketValueImage"));

        let mut buf = RecordBuf::zeroed(&layouts, "bNodeSocketValueObject").unwrap();
        buf.as_mut().set_pointer("value", NonZeroU64::new(0x2000)).unwrap();
        assert_eq!(
            SocketValue::from_record(&buf.as_record(), &resolve).unwrap(),
            SocketValue::Object(None)
        );
    }

    #[test]
    fn socket_values_from_other_structs() {
        let catalog = Catalog::builtin().unwrap();
        let layouts = catalog.layouts(Target::LITTLE_64).unwrap();
        let resolve = |_: NonZeroU64| None;

        for name in ["MLoop", "bNodeSocket", "bNodeTree"].iter() {
            let buf = RecordBuf::zeroed(&layouts, name).unwrap();
            assert_eq!(
                SocketValue::from_record(&buf.as_record(), &resolve),
                Err(crate::Error::Model(ModelError::VariantMismatch {
                    expected: "bNodeSocketValue",
                    found: name.to_string(),
                }))
            );
        }
    }

    #[test]
    fn material_record() {
        let catalog = Catalog::builtin().unwrap();
        let layouts = catalog.layouts(Target::LITTLE_64).unwrap();
        let mut buf = RecordBuf::zeroed(&layouts, "Material").unwrap();
        buf.as_mut().set_f32("g", 0.5).unwrap();
        buf.as_mut().set_f32("roughness", 0.25).unwrap();
        let material = Material::from_record(&buf.as_record()).unwrap();
        assert_eq!(material.color[1], 0.5);
        assert_eq!(material.roughness, 0.25);

        let buf = RecordBuf::zeroed(&layouts, "Light").unwrap();
        assert!(matches!(
            Material::from_record(&buf.as_record()),
            Err(crate::Error::Model(ModelError::VariantMismatch { expected: "Material", .. }))
        ));
    }
}
