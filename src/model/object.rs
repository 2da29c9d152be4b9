use super::{
    anim::AnimData,
    id::{IdCode, IdRef},
    modifier::{GpencilModifier, Modifier, Resolve, ShaderFx},
    unique_name, ModelError,
};
use crate::record::Record;
use serde::Serialize;

const MAX_MODIFIER_NAME: usize = 63;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectType {
    Empty,
    Mesh,
    Curve,
    Surface,
    Text,
    Metaball,
    Light,
    Camera,
    Speaker,
    LightProbe,
    Lattice,
    Armature,
    GreasePencil,
    Hair,
    PointCloud,
    Volume,
}

impl ObjectType {
    pub const ALL: [ObjectType; 16] = [
        ObjectType::Empty,
        ObjectType::Mesh,
        ObjectType::Curve,
        ObjectType::Surface,
        ObjectType::Text,
        ObjectType::Metaball,
        ObjectType::Light,
        ObjectType::Camera,
        ObjectType::Speaker,
        ObjectType::LightProbe,
        ObjectType::Lattice,
        ObjectType::Armature,
        ObjectType::GreasePencil,
        ObjectType::Hair,
        ObjectType::PointCloud,
        ObjectType::Volume,
    ];

    pub fn tag(self) -> i16 {
        match self {
            ObjectType::Empty => 0,
            ObjectType::Mesh => 1,
            ObjectType::Curve => 2,
            ObjectType::Surface => 3,
            ObjectType::Text => 4,
            ObjectType::Metaball => 5,
            ObjectType::Light => 10,
            ObjectType::Camera => 11,
            ObjectType::Speaker => 12,
            ObjectType::LightProbe => 13,
            ObjectType::Lattice => 22,
            ObjectType::Armature => 25,
            ObjectType::GreasePencil => 26,
            ObjectType::Hair => 27,
            ObjectType::PointCloud => 28,
            ObjectType::Volume => 29,
        }
    }

    pub fn from_tag(tag: i16) -> Result<ObjectType, ModelError> {
        ObjectType::ALL
            .iter()
            .copied()
            .find(|t| t.tag() == tag)
            .ok_or(ModelError::UnknownVariant {
                family: "Object.type",
                tag: tag.into(),
            })
    }

    /// The kind of datablock `Object.data` points at, `None` for empties.
    pub fn data_code(self) -> Option<IdCode> {
        match self {
            ObjectType::Empty => None,
            ObjectType::Mesh => Some(IdCode::Mesh),
            ObjectType::Curve | ObjectType::Surface | ObjectType::Text => Some(IdCode::Curve),
            ObjectType::Light => Some(IdCode::Light),
            ObjectType::Camera => Some(IdCode::Camera),
            ObjectType::Lattice => Some(IdCode::Lattice),
            ObjectType::Armature => Some(IdCode::Armature),
            ObjectType::GreasePencil => Some(IdCode::GreasePencil),
            ObjectType::Metaball => Some(IdCode::MetaBall),
            ObjectType::Speaker => Some(IdCode::Speaker),
            ObjectType::LightProbe => Some(IdCode::LightProbe),
            ObjectType::Hair => Some(IdCode::Hair),
            ObjectType::PointCloud => Some(IdCode::PointCloud),
            ObjectType::Volume => Some(IdCode::Volume),
        }
    }
}

/// An object. It owns its modifier stacks; its data, parent and materials
/// are weak references resolved through the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Object {
    ty: ObjectType,
    data: Option<IdRef>,
    pub(crate) parent: Option<IdRef>,
    pub location: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
    pub materials: Vec<Option<IdRef>>,
    pub anim: Option<AnimData>,
    modifiers: Vec<Modifier>,
    gpencil_modifiers: Vec<GpencilModifier>,
    shader_effects: Vec<ShaderFx>,
}

fn check_index(index: usize, len: usize, what: &'static str) -> Result<(), ModelError> {
    if index < len {
        Ok(())
    } else {
        Err(ModelError::InvalidIndex { what, index })
    }
}

fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize, what: &'static str) -> Result<(), ModelError> {
    check_index(from, items.len(), what)?;
    check_index(to, items.len(), what)?;
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}

impl Object {
    pub fn new(ty: ObjectType) -> Object {
        Object {
            ty,
            data: None,
            parent: None,
            location: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            materials: Vec::new(),
            anim: None,
            modifiers: Vec::new(),
            gpencil_modifiers: Vec::new(),
            shader_effects: Vec::new(),
        }
    }

    /// Reads type, transform and the data and parent pointers.
    pub fn from_record(record: &Record<'_>, resolve: Resolve<'_>) -> Result<Object, crate::Error> {
        let mut object = Object::new(ObjectType::from_tag(record.get_i16("type")?)?);
        object.location = record.get_f32_array("loc")?;
        object.rotation = record.get_f32_array("rot")?;
        object.scale = record.get_f32_array("scale")?;
        if let Some(data) = record.get_pointer("data")?.and_then(resolve) {
            object.set_data(Some(data))?;
        }
        object.parent = record.get_pointer("parent")?.and_then(resolve);
        Ok(object)
    }

    pub fn ty(&self) -> ObjectType {
        self.ty
    }

    pub fn data(&self) -> Option<IdRef> {
        self.data
    }

    /// Sets the object data. It must be the kind of datablock the object
    /// type expects.
    pub fn set_data(&mut self, data: Option<IdRef>) -> Result<(), ModelError> {
        if let Some(data) = data {
            let expected = self.ty.data_code().ok_or_else(|| ModelError::VariantMismatch {
                expected: "no data",
                found: data.code.struct_name().to_string(),
            })?;
            if data.code != expected {
                return Err(ModelError::VariantMismatch {
                    expected: expected.struct_name(),
                    found: data.code.struct_name().to_string(),
                });
            }
        }
        self.data = data;
        Ok(())
    }

    /// Parents are set through the registry, which can check for cycles.
    pub fn parent(&self) -> Option<IdRef> {
        self.parent
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    pub fn modifier(&self, name: &str) -> Option<&Modifier> {
        self.modifiers.iter().find(|m| m.name == name)
    }

    pub fn modifier_mut(&mut self, name: &str) -> Option<&mut Modifier> {
        self.modifiers.iter_mut().find(|m| m.name == name)
    }

    /// Appends a modifier, renaming it if the stack already has that name.
    pub fn add_modifier(&mut self, mut modifier: Modifier) -> Result<usize, ModelError> {
        if self.ty == ObjectType::GreasePencil {
            return Err(ModelError::VariantMismatch {
                expected: "a non grease pencil object",
                found: modifier.ty().struct_name().to_string(),
            });
        }
        if modifier.name.is_empty() {
            modifier.name = modifier.ty().ui_name().to_string();
        }
        let stack = &self.modifiers;
        modifier.name = unique_name(&modifier.name, MAX_MODIFIER_NAME, |n| {
            stack.iter().any(|m| m.name == n)
        });
        self.modifiers.push(modifier);
        Ok(self.modifiers.len() - 1)
    }

    /// Moves a modifier to another position in the stack.
    pub fn move_modifier(&mut self, from: usize, to: usize) -> Result<(), ModelError> {
        move_item(&mut self.modifiers, from, to, "modifier")
    }

    pub fn remove_modifier(&mut self, index: usize) -> Result<Modifier, ModelError> {
        check_index(index, self.modifiers.len(), "modifier")?;
        Ok(self.modifiers.remove(index))
    }

    pub fn gpencil_modifiers(&self) -> &[GpencilModifier] {
        &self.gpencil_modifiers
    }

    pub fn add_gpencil_modifier(&mut self, mut modifier: GpencilModifier) -> Result<usize, ModelError> {
        if self.ty != ObjectType::GreasePencil {
            return Err(ModelError::VariantMismatch {
                expected: "a grease pencil object",
                found: modifier.ty.struct_name().to_string(),
            });
        }
        if modifier.name.is_empty() {
            modifier.name = modifier.ty.ui_name().to_string();
        }
        let stack = &self.gpencil_modifiers;
        modifier.name = unique_name(&modifier.name, MAX_MODIFIER_NAME, |n| {
            stack.iter().any(|m| m.name == n)
        });
        self.gpencil_modifiers.push(modifier);
        Ok(self.gpencil_modifiers.len() - 1)
    }

    pub fn remove_gpencil_modifier(&mut self, index: usize) -> Result<GpencilModifier, ModelError> {
        check_index(index, self.gpencil_modifiers.len(), "grease pencil modifier")?;
        Ok(self.gpencil_modifiers.remove(index))
    }

    pub fn shader_effects(&self) -> &[ShaderFx] {
        &self.shader_effects
    }

    pub fn add_shader_fx(&mut self, mut fx: ShaderFx) -> Result<usize, ModelError> {
        if self.ty != ObjectType::GreasePencil {
            return Err(ModelError::VariantMismatch {
                expected: "a grease pencil object",
                found: fx.kind.ty().struct_name().to_string(),
            });
        }
        if fx.name.is_empty() {
            fx.name = fx.kind.ty().ui_name().to_string();
        }
        let stack = &self.shader_effects;
        fx.name = unique_name(&fx.name, MAX_MODIFIER_NAME, |n| stack.iter().any(|f| f.name == n));
        self.shader_effects.push(fx);
        Ok(self.shader_effects.len() - 1)
    }

    pub fn move_shader_fx(&mut self, from: usize, to: usize) -> Result<(), ModelError> {
        move_item(&mut self.shader_effects, from, to, "shader effect")
    }

    pub fn remove_shader_fx(&mut self, index: usize) -> Result<ShaderFx, ModelError> {
        check_index(index, self.shader_effects.len(), "shader effect")?;
        Ok(self.shader_effects.remove(index))
    }

    /// Every datablock this object points at.
    pub fn references(&self) -> Vec<IdRef> {
        let mut refs: Vec<IdRef> = self.data.into_iter().chain(self.parent).collect();
        refs.extend(self.materials.iter().filter_map(|m| *m));
        refs.extend(self.modifiers.iter().flat_map(|m| m.kind.references()));
        if let Some(anim) = &self.anim {
            refs.extend(anim.references());
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::Catalog,
        model::{
            id::SessionUid,
            modifier::{GpencilModifierType, ModifierKind, ModifierType, ShaderFxKind, ShaderFxType},
        },
        parsers::Target,
        record::RecordBuf,
    };
    use std::num::NonZeroU64;

    fn id(code: IdCode, uid: u32) -> IdRef {
        IdRef {
            code,
            uid: SessionUid::new(uid).unwrap(),
        }
    }

    #[test]
    fn modifier_stack() {
        let mut object = Object::new(ObjectType::Mesh);
        let subsurf = || Modifier::new("", ModifierKind::new(ModifierType::Subsurf));
        object.add_modifier(subsurf()).unwrap();
        object.add_modifier(subsurf()).unwrap();
        object
            .add_modifier(Modifier::new("Bevel", ModifierKind::new(ModifierType::Bevel)))
            .unwrap();
        let names: Vec<_> = object.modifiers().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Subdivision", "Subdivision.001", "Bevel"]);

        object.move_modifier(2, 0).unwrap();
        assert_eq!(object.modifiers()[0].ty(), ModifierType::Bevel);
        assert!(object.move_modifier(0, 3).is_err());
        assert_eq!(object.remove_modifier(1).unwrap().name, "Subdivision");
        assert!(object.modifier("Subdivision.001").is_some());
        assert!(object
            .add_shader_fx(ShaderFx::new("", ShaderFxKind::Other(ShaderFxType::Glow)))
            .is_err());
    }

    #[test]
    fn grease_pencil_stacks() {
        let mut object = Object::new(ObjectType::GreasePencil);
        assert!(object
            .add_modifier(Modifier::new("", ModifierKind::new(ModifierType::Weld)))
            .is_err());
        object
            .add_gpencil_modifier(GpencilModifier::new("", GpencilModifierType::Noise))
            .unwrap();
        object
            .add_shader_fx(ShaderFx::new("", ShaderFxKind::Other(ShaderFxType::Glow)))
            .unwrap();
        object
            .add_shader_fx(ShaderFx::new("", ShaderFxKind::Other(ShaderFxType::Rim)))
            .unwrap();
        object.move_shader_fx(1, 0).unwrap();
        assert_eq!(object.shader_effects()[0].name, "Rim");
        assert_eq!(object.gpencil_modifiers()[0].name, "Noise");
    }

    #[test]
    fn data_must_match_type() {
        let mut object = Object::new(ObjectType::Mesh);
        object.set_data(Some(id(IdCode::Mesh, 1))).unwrap();
        assert!(object.set_data(Some(id(IdCode::Camera, 2))).is_err());
        assert_eq!(object.data(), Some(id(IdCode::Mesh, 1)));
        let mut empty = Object::new(ObjectType::Empty);
        assert!(empty.set_data(Some(id(IdCode::Mesh, 1))).is_err());
        empty.set_data(None).unwrap();
    }

    #[test]
    fn object_types() {
        for ty in ObjectType::ALL.iter() {
            assert_eq!(ObjectType::from_tag(ty.tag()), Ok(*ty));
        }
        assert_eq!(ObjectType::from_tag(29), Ok(ObjectType::Volume));
        assert!(ObjectType::from_tag(30).is_err());

        let mut metaball = Object::new(ObjectType::Metaball);
        metaball.set_data(Some(id(IdCode::MetaBall, 1))).unwrap();
        let mut speaker = Object::new(ObjectType::Speaker);
        assert!(speaker.set_data(Some(id(IdCode::Sound, 2))).is_err());
        speaker.set_data(Some(id(IdCode::Speaker, 3))).unwrap();
        let mut points = Object::new(ObjectType::PointCloud);
        points.set_data(Some(id(IdCode::PointCloud, 4))).unwrap();
    }

    #[test]
    fn references() {
        let mut object = Object::new(ObjectType::Mesh);
        object.set_data(Some(id(IdCode::Mesh, 1))).unwrap();
        object.materials.push(None);
        object.materials.push(Some(id(IdCode::Material, 2)));
        object
            .add_modifier(Modifier::new(
                "Armature",
                ModifierKind::Armature {
                    object: Some(id(IdCode::Object, 3)),
                    vertex_group: String::new(),
                },
            ))
            .unwrap();
        object.anim = Some(AnimData {
            action: Some(id(IdCode::Action, 4)),
            tracks: Vec::new(),
        });
        let uids: Vec<_> = object.references().iter().map(|r| r.uid.get()).collect();
        assert_eq!(uids, [1, 2, 3, 4]);
    }

    #[test]
    fn object_record() {
        let catalog = Catalog::builtin().unwrap();
        let layouts = catalog.layouts(Target::LITTLE_64).unwrap();
        let mesh = id(IdCode::Mesh, 9);
        let resolve = |a: NonZeroU64| if a.get() == 0x100 { Some(mesh) } else { None };

        let mut buf = RecordBuf::zeroed(&layouts, "Object").unwrap();
        let mut record = buf.as_mut();
        record.set_i16("type", ObjectType::Mesh.tag()).unwrap();
        record.set_slice("loc", &[1.0f32, 2.0, 3.0]).unwrap();
        record.set_slice("scale", &[1.0f32; 3]).unwrap();
        record.set_pointer("data", NonZeroU64::new(0x100)).unwrap();
        record.set_pointer("parent", NonZeroU64::new(0x200)).unwrap();

        let object = Object::from_record(&buf.as_record(), &resolve).unwrap();
        assert_eq!(object.ty(), ObjectType::Mesh);
        assert_eq!(object.location, [1.0, 2.0, 3.0]);
        assert_eq!(object.data(), Some(mesh));
        assert_eq!(object.parent(), None);

        buf.as_mut().set_i16("type", 99).unwrap();
        assert!(Object::from_record(&buf.as_record(), &resolve).is_err());
    }
}
