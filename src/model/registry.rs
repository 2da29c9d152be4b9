//! Ownership of every datablock in a session.
//!
//! Datablocks reference each other only through [`IdRef`]s. Removing a
//! datablock never touches the others, so their references may dangle;
//! resolving a dangling reference yields `None`.

use super::{
    anim::Action,
    armature::Armature,
    id::{IdCode, IdName, IdRef, SessionUid, MAX_NAME_LEN},
    mesh::Mesh,
    nodes::{Material, NodeTree},
    object::Object,
    unique_name, ModelError,
};
use linked_hash_map::LinkedHashMap;
use log::{debug, trace};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Datablock {
    Object(Object),
    Mesh(Mesh),
    Action(Action),
    NodeTree(NodeTree),
    Armature(Armature),
    Material(Material),
}

impl Datablock {
    pub fn code(&self) -> IdCode {
        match self {
            Datablock::Object(_) => IdCode::Object,
            Datablock::Mesh(_) => IdCode::Mesh,
            Datablock::Action(_) => IdCode::Action,
            Datablock::NodeTree(_) => IdCode::NodeTree,
            Datablock::Armature(_) => IdCode::Armature,
            Datablock::Material(_) => IdCode::Material,
        }
    }

    /// Every datablock this one points at, repeated once per use.
    pub fn references(&self) -> Vec<IdRef> {
        match self {
            Datablock::Object(object) => object.references(),
            Datablock::Mesh(mesh) => mesh.references().collect(),
            Datablock::NodeTree(tree) => tree.references().collect(),
            Datablock::Material(material) => material.references().collect(),
            Datablock::Action(_) | Datablock::Armature(_) => Vec::new(),
        }
    }
}

macro_rules! typed_access {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty);)+) => {
        $(
            pub fn $get(&self, id: IdRef) -> Option<&$ty> {
                match self.get(id)? {
                    Datablock::$variant(value) => Some(value),
                    _ => None,
                }
            }

            pub fn $get_mut(&mut self, id: IdRef) -> Option<&mut $ty> {
                match self.get_mut(id)? {
                    Datablock::$variant(value) => Some(value),
                    _ => None,
                }
            }
        )+
    };
}

#[derive(Debug, Clone)]
struct Entry {
    name: IdName,
    data: Datablock,
}

/// Owns datablocks, keyed by session uid, in insertion order.
#[derive(Debug, Default)]
pub struct Registry {
    entries: LinkedHashMap<SessionUid, Entry>,
    names: HashMap<IdCode, HashMap<String, SessionUid>>,
    last_uid: u32,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn name_taken(&self, code: IdCode, name: &str) -> bool {
        self.names
            .get(&code)
            .map_or(false, |names| names.contains_key(name))
    }

    /// Takes ownership of `data`. Its name is made unique among datablocks
    /// of the same kind by adding a `.NNN` suffix.
    pub fn add(&mut self, name: &str, data: Datablock) -> Result<IdRef, ModelError> {
        if name.is_empty() {
            return Err(ModelError::EmptyName("datablock"));
        }
        let code = data.code();
        let name = unique_name(name, MAX_NAME_LEN, |n| self.name_taken(code, n));
        let name = IdName::new(code, &name)?;

        self.last_uid += 1;
        let uid = SessionUid::new(self.last_uid).ok_or(ModelError::InvalidIndex {
            what: "session uid",
            index: 0,
        })?;
        debug!("adding {} as {}", name, uid);
        self.names
            .entry(code)
            .or_default()
            .insert(name.name().to_string(), uid);
        self.entries.insert(uid, Entry { name, data });
        Ok(IdRef { code, uid })
    }

    fn entry(&self, id: IdRef) -> Option<&Entry> {
        self.entries.get(&id.uid).filter(|e| e.data.code() == id.code)
    }

    /// `true` while a datablock with this uid exists.
    pub fn contains(&self, uid: SessionUid) -> bool {
        self.entries.contains_key(&uid)
    }

    /// Resolves a reference; `None` once the datablock was removed.
    pub fn get(&self, id: IdRef) -> Option<&Datablock> {
        self.entry(id).map(|e| &e.data)
    }

    pub fn get_mut(&mut self, id: IdRef) -> Option<&mut Datablock> {
        self.entries
            .get_mut(&id.uid)
            .filter(|e| e.data.code() == id.code)
            .map(|e| &mut e.data)
    }

    typed_access! {
        object, object_mut => Object(Object);
        mesh, mesh_mut => Mesh(Mesh);
        action, action_mut => Action(Action);
        node_tree, node_tree_mut => NodeTree(NodeTree);
        armature, armature_mut => Armature(Armature);
        material, material_mut => Material(Material);
    }

    /// Finds a datablock by kind and name.
    pub fn lookup(&self, code: IdCode, name: &str) -> Option<IdRef> {
        let uid = *self.names.get(&code)?.get(name)?;
        Some(IdRef { code, uid })
    }

    pub fn name_of(&self, id: IdRef) -> Option<&IdName> {
        self.entry(id).map(|e| &e.name)
    }

    /// Renames a datablock, keeping names unique. Returns the name it got.
    pub fn rename(&mut self, id: IdRef, name: &str) -> Result<IdName, ModelError> {
        let old = self
            .name_of(id)
            .cloned()
            .ok_or_else(|| ModelError::MissingDatablock(id.to_string()))?;
        if name.is_empty() {
            return Err(ModelError::EmptyName("datablock"));
        }
        if old.name() == name {
            return Ok(old);
        }
        let unique = unique_name(name, MAX_NAME_LEN, |n| self.name_taken(id.code, n));
        let new = IdName::new(id.code, &unique)?;
        if let Some(names) = self.names.get_mut(&id.code) {
            names.remove(old.name());
            names.insert(new.name().to_string(), id.uid);
        }
        if let Some(entry) = self.entries.get_mut(&id.uid) {
            entry.name = new.clone();
        }
        trace!("renamed {} to {}", old, new);
        Ok(new)
    }

    /// Removes a datablock. References to it elsewhere are left dangling.
    pub fn remove(&mut self, id: IdRef) -> Option<Datablock> {
        self.entry(id)?;
        let entry = self.entries.remove(&id.uid)?;
        if let Some(names) = self.names.get_mut(&id.code) {
            names.remove(entry.name.name());
        }
        debug!("removed {}", entry.name);
        Some(entry.data)
    }

    /// How many references from live datablocks point at `id`.
    pub fn users(&self, id: IdRef) -> usize {
        self.entries
            .values()
            .map(|e| e.data.references().iter().filter(|r| **r == id).count())
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdRef, &IdName, &Datablock)> {
        self.entries.iter().map(|(uid, e)| {
            (
                IdRef {
                    code: e.data.code(),
                    uid: *uid,
                },
                &e.name,
                &e.data,
            )
        })
    }

    /// Parents `child` to `parent`. Both must be live objects and the
    /// parent chain may not loop back to `child`.
    pub fn set_object_parent(&mut self, child: IdRef, parent: Option<IdRef>) -> Result<(), ModelError> {
        let missing = |id: IdRef| ModelError::MissingDatablock(id.to_string());
        self.object(child).ok_or_else(|| missing(child))?;
        if let Some(parent) = parent {
            self.object(parent).ok_or_else(|| missing(parent))?;
            let mut current = Some(parent);
            while let Some(id) = current {
                if id == child {
                    let name = self
                        .name_of(child)
                        .map_or_else(|| child.to_string(), IdName::to_string);
                    return Err(ModelError::ParentCycle(name));
                }
                current = self.object(id).and_then(Object::parent);
            }
        }
        if let Some(object) = self.object_mut(child) {
            object.parent = parent;
        }
        Ok(())
    }

    /// References held by live datablocks whose target no longer exists,
    /// as `(holder, target)` pairs.
    pub fn dangling_refs(&self) -> Vec<(IdRef, IdRef)> {
        self.iter()
            .flat_map(|(holder, _, data)| {
                data.references()
                    .into_iter()
                    .filter(|target| self.get(*target).is_none())
                    .map(move |target| (holder, target))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        modifier::{Modifier, ModifierKind},
        object::ObjectType,
    };

    fn mesh_object(registry: &mut Registry, name: &str) -> (IdRef, IdRef) {
        let mesh = registry.add(name, Datablock::Mesh(Mesh::new())).unwrap();
        let mut object = Object::new(ObjectType::Mesh);
        object.set_data(Some(mesh)).unwrap();
        let object = registry.add(name, Datablock::Object(object)).unwrap();
        (object, mesh)
    }

    #[test]
    fn names_are_unique_per_kind() {
        let mut registry = Registry::new();
        let (cube, cube_mesh) = mesh_object(&mut registry, "Cube");
        let (cube2, _) = mesh_object(&mut registry, "Cube");
        assert_eq!(registry.name_of(cube).unwrap().to_string(), "OBCube");
        assert_eq!(registry.name_of(cube_mesh).unwrap().to_string(), "MECube");
        assert_eq!(registry.name_of(cube2).unwrap().name(), "Cube.001");
        assert_eq!(registry.lookup(IdCode::Object, "Cube.001"), Some(cube2));
        assert_eq!(registry.len(), 4);
        assert!(registry.add("", Datablock::Action(Action::new())).is_err());
    }

    #[test]
    fn rename() {
        let mut registry = Registry::new();
        let (cube, _) = mesh_object(&mut registry, "Cube");
        let (other, _) = mesh_object(&mut registry, "Other");
        assert_eq!(registry.rename(other, "Cube").unwrap().name(), "Cube.001");
        assert_eq!(registry.lookup(IdCode::Object, "Other"), None);
        assert_eq!(registry.rename(cube, "Cube").unwrap().name(), "Cube");
        registry.rename(cube, "Box").unwrap();
        assert_eq!(registry.lookup(IdCode::Object, "Box"), Some(cube));
        assert_eq!(registry.lookup(IdCode::Object, "Cube"), None);
    }

    #[test]
    fn removal_leaves_dangling_refs() {
        let mut registry = Registry::new();
        let (cube, mesh) = mesh_object(&mut registry, "Cube");
        let (lamp, _) = mesh_object(&mut registry, "Lamp");
        registry
            .object_mut(lamp)
            .unwrap()
            .add_modifier(Modifier::new(
                "Boolean",
                ModifierKind::Boolean {
                    object: Some(cube),
                    operation: crate::model::modifier::BooleanOperation::Union,
                },
            ))
            .unwrap();
        assert_eq!(registry.users(mesh), 1);
        assert_eq!(registry.users(cube), 1);

        assert!(registry.remove(mesh).is_some());
        assert!(registry.get(mesh).is_none());
        assert!(registry.remove(mesh).is_none());
        assert_eq!(registry.object(cube).unwrap().data(), Some(mesh));
        assert_eq!(registry.dangling_refs(), [(cube, mesh)]);
        assert_eq!(registry.lookup(IdCode::Mesh, "Cube"), None);

        let wrong_code = IdRef {
            code: IdCode::Mesh,
            uid: cube.uid,
        };
        assert!(registry.get(wrong_code).is_none());
        assert!(registry.mesh(lamp).is_none());
    }

    #[test]
    fn parents() {
        let mut registry = Registry::new();
        let (a, mesh) = mesh_object(&mut registry, "A");
        let (b, _) = mesh_object(&mut registry, "B");
        let (c, _) = mesh_object(&mut registry, "C");
        registry.set_object_parent(b, Some(a)).unwrap();
        registry.set_object_parent(c, Some(b)).unwrap();
        assert_eq!(
            registry.set_object_parent(a, Some(c)),
            Err(ModelError::ParentCycle("OBA".to_string()))
        );
        assert!(registry.set_object_parent(a, Some(a)).is_err());
        assert!(registry.set_object_parent(a, Some(mesh)).is_err());
        assert_eq!(registry.users(a), 1);
        registry.set_object_parent(b, None).unwrap();
        assert_eq!(registry.users(a), 0);
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let mut registry = Registry::new();
        registry.add("Walk", Datablock::Action(Action::new())).unwrap();
        registry.add("Rig", Datablock::Armature(Armature::new())).unwrap();
        registry.add("Shader", Datablock::NodeTree(NodeTree::new("ShaderNodeTree"))).unwrap();
        let names: Vec<_> = registry.iter().map(|(_, name, _)| name.to_string()).collect();
        assert_eq!(names, ["ACWalk", "ARRig", "NTShader"]);
    }
}
