use super::{unique_name, ModelError};
use crate::record::Record;
use serde::Serialize;

const MAX_BONE_NAME: usize = 63;
const BONE_CONNECTED: i32 = 1 << 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bone {
    pub name: String,
    pub head: [f32; 3],
    pub tail: [f32; 3],
    pub roll: f32,
    /// Head sits on the parent's tail.
    pub connected: bool,
    parent: Option<usize>,
}

impl Bone {
    pub fn new<T: Into<String>>(name: T, head: [f32; 3], tail: [f32; 3]) -> Bone {
        Bone {
            name: name.into(),
            head,
            tail,
            roll: 0.0,
            connected: false,
            parent: None,
        }
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn length(&self) -> f32 {
        self.head
            .iter()
            .zip(self.tail.iter())
            .map(|(h, t)| (t - h) * (t - h))
            .sum::<f32>()
            .sqrt()
    }

    /// Reads a `Bone` record. Its parent link is a pointer and is left unset.
    pub fn from_record(record: &Record<'_>) -> Result<Bone, crate::Error> {
        let mut bone = Bone::new(
            record.get_string("name")?,
            record.get_f32_array("head")?,
            record.get_f32_array("tail")?,
        );
        bone.roll = record.get_f32("roll")?;
        bone.connected = record.get_i32("flag")? & BONE_CONNECTED != 0;
        Ok(bone)
    }
}

/// A bone hierarchy stored flat, children pointing at their parent's index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Armature {
    bones: Vec<Bone>,
}

impl Armature {
    pub fn new() -> Armature {
        Armature::default()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone_mut(&mut self, index: usize) -> Option<&mut Bone> {
        self.bones.get_mut(index)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    fn check(&self, index: usize) -> Result<(), ModelError> {
        if index < self.bones.len() {
            Ok(())
        } else {
            Err(ModelError::InvalidIndex { what: "bone", index })
        }
    }

    pub fn add_bone(&mut self, mut bone: Bone, parent: Option<usize>) -> Result<usize, ModelError> {
        if bone.name.is_empty() {
            return Err(ModelError::EmptyName("bone"));
        }
        if let Some(parent) = parent {
            self.check(parent)?;
        }
        let bones = &self.bones;
        bone.name = unique_name(&bone.name, MAX_BONE_NAME, |n| bones.iter().any(|b| b.name == n));
        bone.parent = parent;
        self.bones.push(bone);
        Ok(self.bones.len() - 1)
    }

    /// Removes a bone. Its children move up to its parent and lose their
    /// connection. Indices after `index` shift down by one.
    pub fn remove_bone(&mut self, index: usize) -> Result<Bone, ModelError> {
        self.check(index)?;
        let removed = self.bones.remove(index);
        for bone in &mut self.bones {
            match bone.parent {
                Some(p) if p == index => {
                    bone.parent = removed.parent.map(|p| if p > index { p - 1 } else { p });
                    bone.connected = false;
                }
                Some(p) if p > index => bone.parent = Some(p - 1),
                _ => {}
            }
        }
        Ok(removed)
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(move |(_, b)| b.parent == Some(index))
            .map(|(i, _)| i)
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(i, _)| i)
    }

    /// `index` followed by each of its ancestors.
    pub fn path_to_root(&self, index: usize) -> Result<Vec<usize>, ModelError> {
        self.check(index)?;
        let mut path = vec![index];
        let mut current = self.bones[index].parent;
        while let Some(parent) = current {
            if path.contains(&parent) {
                return Err(ModelError::ParentCycle(self.bones[index].name.clone()));
            }
            path.push(parent);
            current = self.bones[parent].parent;
        }
        Ok(path)
    }

    /// Moves `child` under `parent`, refusing to make a bone its own ancestor.
    pub fn set_parent(&mut self, child: usize, parent: Option<usize>) -> Result<(), ModelError> {
        self.check(child)?;
        if let Some(parent) = parent {
            if self.path_to_root(parent)?.contains(&child) {
                return Err(ModelError::ParentCycle(self.bones[child].name.clone()));
            }
        }
        self.bones[child].parent = parent;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::Catalog, parsers::Target, record::RecordBuf};

    fn spine() -> Armature {
        let mut arm = Armature::new();
        let root = arm.add_bone(Bone::new("Hips", [0.0; 3], [0.0, 0.0, 1.0]), None).unwrap();
        let spine = arm
            .add_bone(Bone::new("Spine", [0.0, 0.0, 1.0], [0.0, 0.0, 2.0]), Some(root))
            .unwrap();
        arm.add_bone(Bone::new("Head", [0.0, 0.0, 2.0], [0.0, 0.0, 2.5]), Some(spine))
            .unwrap();
        arm.add_bone(Bone::new("Arm", [0.0, 0.0, 2.0], [1.0, 0.0, 2.0]), Some(spine))
            .unwrap();
        arm
    }

    #[test]
    fn hierarchy() {
        let mut arm = spine();
        assert_eq!(arm.roots().collect::<Vec<_>>(), [0]);
        assert_eq!(arm.children(1).collect::<Vec<_>>(), [2, 3]);
        assert_eq!(arm.path_to_root(3).unwrap(), [3, 1, 0]);
        let index = arm.add_bone(Bone::new("Arm", [0.0; 3], [1.0; 3]), None).unwrap();
        assert_eq!(arm.bones()[index].name, "Arm.001");
        assert!(arm.add_bone(Bone::new("X", [0.0; 3], [1.0; 3]), Some(99)).is_err());
    }

    #[test]
    fn removing_reparents_children() {
        let mut arm = spine();
        arm.bone_mut(2).unwrap().connected = true;
        let spine = arm.remove_bone(1).unwrap();
        assert_eq!(spine.name, "Spine");
        let head = arm.find("Head").unwrap();
        assert_eq!(head, 1);
        assert_eq!(arm.bones()[head].parent(), Some(0));
        assert!(!arm.bones()[head].connected);
        assert_eq!(arm.path_to_root(2).unwrap(), [2, 0]);
    }

    #[test]
    fn no_parent_cycles() {
        let mut arm = spine();
        assert_eq!(
            arm.set_parent(0, Some(2)),
            Err(ModelError::ParentCycle("Hips".to_string()))
        );
        arm.set_parent(3, Some(0)).unwrap();
        assert_eq!(arm.children(0).count(), 2);
    }

    #[test]
    fn bone_record() {
        let catalog = Catalog::builtin().unwrap();
        let layouts = catalog.layouts(Target::LITTLE_64).unwrap();
        let mut buf = RecordBuf::zeroed(&layouts, "Bone").unwrap();
        let mut record = buf.as_mut();
        record.set_string("name", "Forearm.L").unwrap();
        record.set_slice("tail", &[0.0f32, 3.0, 4.0]).unwrap();
        record.set_i32("flag", BONE_CONNECTED).unwrap();
        let bone = Bone::from_record(&buf.as_record()).unwrap();
        assert_eq!(bone.name, "Forearm.L");
        assert_eq!(bone.length(), 5.0);
        assert!(bone.connected);
    }
}
