//! Tagged unions for the struct families that extend a base struct.
//!
//! Each family's base (`ModifierData`, `GpencilModifierData`,
//! `ShaderFxData`, `LineStyleModifier`) stores an integer `type`; the tag
//! enums here map it to the concrete struct, and the `*Kind` enums carry the
//! typed settings of the variants the model understands.

use super::{check_struct, id::IdRef, ModelError};
use crate::record::{Record, RecordError, RecordMut};
use serde::Serialize;
use std::{fmt, num::NonZeroU64};

/// Shown in the viewport.
pub const MODE_REALTIME: i32 = 1 << 0;
/// Used for final renders.
pub const MODE_RENDER: i32 = 1 << 1;

/// Maps stored addresses back to the datablocks they pointed at.
pub type Resolve<'r> = &'r dyn Fn(NonZeroU64) -> Option<IdRef>;
/// Gives the address a datablock is written at.
pub type AddressOf<'r> = &'r dyn Fn(IdRef) -> Option<NonZeroU64>;

macro_rules! dna_variants {
    (
        $(#[$meta:meta])*
        $name:ident, base $base:literal, field $field:literal {
            $($variant:ident = $tag:literal => $struct_name:literal, $ui_name:literal;)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];
            /// The struct every variant starts with.
            pub const BASE_STRUCT: &'static str = $base;
            /// Name of the field holding the base in each variant.
            pub const BASE_FIELD: &'static str = $field;

            pub fn tag(self) -> i32 {
                match self {
                    $($name::$variant => $tag,)+
                }
            }

            pub fn from_tag(tag: i32) -> Result<$name, ModelError> {
                match tag {
                    $($tag => Ok($name::$variant),)+
                    _ => Err(ModelError::UnknownVariant { family: $base, tag }),
                }
            }

            pub fn struct_name(self) -> &'static str {
                match self {
                    $($name::$variant => $struct_name,)+
                }
            }

            pub fn ui_name(self) -> &'static str {
                match self {
                    $($name::$variant => $ui_name,)+
                }
            }

            pub fn from_struct_name(name: &str) -> Option<$name> {
                match name {
                    $($struct_name => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.ui_name())
            }
        }
    };
}

dna_variants! {
    /// Mesh modifiers.
    ModifierType, base "ModifierData", field "modifier" {
        Subsurf = 1 => "SubsurfModifierData", "Subdivision";
        Lattice = 2 => "LatticeModifierData", "Lattice";
        Curve = 3 => "CurveModifierData", "Curve";
        Build = 4 => "BuildModifierData", "Build";
        Mirror = 5 => "MirrorModifierData", "Mirror";
        Decimate = 6 => "DecimateModifierData", "Decimate";
        Wave = 7 => "WaveModifierData", "Wave";
        Armature = 8 => "ArmatureModifierData", "Armature";
        Hook = 9 => "HookModifierData", "Hook";
        Boolean = 11 => "BooleanModifierData", "Boolean";
        Array = 12 => "ArrayModifierData", "Array";
        EdgeSplit = 13 => "EdgeSplitModifierData", "Edge Split";
        Displace = 14 => "DisplaceModifierData", "Displace";
        Smooth = 16 => "SmoothModifierData", "Smooth";
        Cast = 17 => "CastModifierData", "Cast";
        Bevel = 24 => "BevelModifierData", "Bevel";
        Shrinkwrap = 25 => "ShrinkwrapModifierData", "Shrinkwrap";
        Mask = 27 => "MaskModifierData", "Mask";
        SimpleDeform = 28 => "SimpleDeformModifierData", "Simple Deform";
        Solidify = 33 => "SolidifyModifierData", "Solidify";
        Screw = 34 => "ScrewModifierData", "Screw";
        Remesh = 41 => "RemeshModifierData", "Remesh";
        Skin = 42 => "SkinModifierData", "Skin";
        LaplacianSmooth = 43 => "LaplacianSmoothModifierData", "Laplacian Smooth";
        Triangulate = 44 => "TriangulateModifierData", "Triangulate";
        Wireframe = 48 => "WireframeModifierData", "Wireframe";
        CorrectiveSmooth = 51 => "CorrectiveSmoothModifierData", "Smooth Corrective";
        WeightedNormal = 54 => "WeightedNormalModifierData", "Weighted Normal";
        Weld = 55 => "WeldModifierData", "Weld";
    }
}

dna_variants! {
    /// Grease pencil stroke modifiers.
    GpencilModifierType, base "GpencilModifierData", field "modifier" {
        Noise = 1 => "NoiseGpencilModifierData", "Noise";
        Subdiv = 2 => "SubdivGpencilModifierData", "Subdivide";
        Thick = 3 => "ThickGpencilModifierData", "Thickness";
        Tint = 4 => "TintGpencilModifierData", "Tint";
        Array = 5 => "ArrayGpencilModifierData", "Array";
        Color = 8 => "ColorGpencilModifierData", "Hue/Saturation";
        Smooth = 11 => "SmoothGpencilModifierData", "Smooth";
        Offset = 13 => "OffsetGpencilModifierData", "Offset";
    }
}

dna_variants! {
    /// Grease pencil visual effects.
    ShaderFxType, base "ShaderFxData", field "shaderfx" {
        Blur = 1 => "BlurShaderFxData", "Blur";
        Colorize = 2 => "ColorizeShaderFxData", "Colorize";
        Flip = 3 => "FlipShaderFxData", "Flip";
        Glow = 4 => "GlowShaderFxData", "Glow";
        Pixel = 5 => "PixelShaderFxData", "Pixelate";
        Rim = 6 => "RimShaderFxData", "Rim";
        Shadow = 7 => "ShadowShaderFxData", "Shadow";
        Swirl = 8 => "SwirlShaderFxData", "Swirl";
        Wave = 9 => "WaveShaderFxData", "Wave Distortion";
    }
}

/// What a line style modifier changes. The struct name of a line style
/// modifier combines the channel and the [`LineStyleModifierType`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum LineStyleChannel {
    Color,
    Alpha,
    Thickness,
    Geometry,
}

impl LineStyleChannel {
    pub const ALL: [LineStyleChannel; 4] = [
        LineStyleChannel::Color,
        LineStyleChannel::Alpha,
        LineStyleChannel::Thickness,
        LineStyleChannel::Geometry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LineStyleChannel::Color => "Color",
            LineStyleChannel::Alpha => "Alpha",
            LineStyleChannel::Thickness => "Thickness",
            LineStyleChannel::Geometry => "Geometry",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum LineStyleModifierType {
    AlongStroke,
    DistanceFromCamera,
    DistanceFromObject,
    Material,
    Sampling,
    BezierCurve,
    SinusDisplacement,
    SpatialNoise,
    PerlinNoise1D,
    PerlinNoise2D,
    BackboneStretcher,
    TipRemover,
    Calligraphy,
    Polygonalization,
    GuidingLines,
    Blueprint,
    Offset2D,
    Transform2D,
    Tangent,
    Noise,
    CreaseAngle,
    Simplification,
    Curvature3D,
}

impl LineStyleModifierType {
    /// In tag order, starting at 1.
    pub const ALL: [LineStyleModifierType; 23] = [
        LineStyleModifierType::AlongStroke,
        LineStyleModifierType::DistanceFromCamera,
        LineStyleModifierType::DistanceFromObject,
        LineStyleModifierType::Material,
        LineStyleModifierType::Sampling,
        LineStyleModifierType::BezierCurve,
        LineStyleModifierType::SinusDisplacement,
        LineStyleModifierType::SpatialNoise,
        LineStyleModifierType::PerlinNoise1D,
        LineStyleModifierType::PerlinNoise2D,
        LineStyleModifierType::BackboneStretcher,
        LineStyleModifierType::TipRemover,
        LineStyleModifierType::Calligraphy,
        LineStyleModifierType::Polygonalization,
        LineStyleModifierType::GuidingLines,
        LineStyleModifierType::Blueprint,
        LineStyleModifierType::Offset2D,
        LineStyleModifierType::Transform2D,
        LineStyleModifierType::Tangent,
        LineStyleModifierType::Noise,
        LineStyleModifierType::CreaseAngle,
        LineStyleModifierType::Simplification,
        LineStyleModifierType::Curvature3D,
    ];
    pub const BASE_STRUCT: &'static str = "LineStyleModifier";

    pub fn tag(self) -> i32 {
        LineStyleModifierType::ALL
            .iter()
            .position(|t| *t == self)
            .map_or(0, |i| i as i32 + 1)
    }

    pub fn from_tag(tag: i32) -> Result<LineStyleModifierType, ModelError> {
        (tag as usize)
            .checked_sub(1)
            .filter(|_| tag > 0)
            .and_then(|i| LineStyleModifierType::ALL.get(i).copied())
            .ok_or(ModelError::UnknownVariant {
                family: LineStyleModifierType::BASE_STRUCT,
                tag,
            })
    }

    /// The name used in struct names, after the `_`.
    pub fn name(self) -> &'static str {
        match self {
            LineStyleModifierType::AlongStroke => "AlongStroke",
            LineStyleModifierType::DistanceFromCamera => "DistanceFromCamera",
            LineStyleModifierType::DistanceFromObject => "DistanceFromObject",
            LineStyleModifierType::Material => "Material",
            LineStyleModifierType::Sampling => "Sampling",
            LineStyleModifierType::BezierCurve => "BezierCurve",
            LineStyleModifierType::SinusDisplacement => "SinusDisplacement",
            LineStyleModifierType::SpatialNoise => "SpatialNoise",
            LineStyleModifierType::PerlinNoise1D => "PerlinNoise1D",
            LineStyleModifierType::PerlinNoise2D => "PerlinNoise2D",
            LineStyleModifierType::BackboneStretcher => "BackboneStretcher",
            LineStyleModifierType::TipRemover => "TipRemover",
            LineStyleModifierType::Calligraphy => "Calligraphy",
            LineStyleModifierType::Polygonalization => "Polygonalization",
            LineStyleModifierType::GuidingLines => "GuidingLines",
            LineStyleModifierType::Blueprint => "Blueprint",
            LineStyleModifierType::Offset2D => "2DOffset",
            LineStyleModifierType::Transform2D => "2DTransform",
            LineStyleModifierType::CreaseAngle => "CreaseAngle",
            LineStyleModifierType::Tangent => "Tangent",
            LineStyleModifierType::Simplification => "Simplification",
            LineStyleModifierType::Curvature3D => "Curvature_3D",
            LineStyleModifierType::Noise => "Noise",
        }
    }

    pub fn struct_name(self, channel: LineStyleChannel) -> String {
        format!("LineStyle{}Modifier_{}", channel.name(), self.name())
    }

    /// Splits `LineStyleColorModifier_AlongStroke` into its channel and type.
    pub fn parse_struct_name(name: &str) -> Option<(LineStyleChannel, LineStyleModifierType)> {
        let rest = name.strip_prefix("LineStyle")?;
        let (channel, ty) = rest.split_at(rest.find("Modifier_")?);
        let ty = &ty["Modifier_".len()..];
        let channel = LineStyleChannel::ALL
            .iter()
            .copied()
            .find(|c| c.name() == channel)?;
        let ty = LineStyleModifierType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == ty)?;
        Some((channel, ty))
    }
}

/// The fields every member of a tagged family shares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantHeader {
    pub tag: i32,
    pub mode: i32,
    pub name: String,
}

impl VariantHeader {
    /// Reads the header from `record` or from its `base` ancestor.
    pub fn read(record: &Record<'_>, base: &'static str) -> Result<VariantHeader, crate::Error> {
        let header = record.upcast(base).ok_or_else(|| ModelError::VariantMismatch {
            expected: base,
            found: record.type_name().to_string(),
        })?;
        Ok(VariantHeader {
            tag: header.get_i32("type")?,
            mode: header.get_i32("mode")?,
            name: header.get_string("name")?,
        })
    }

    fn write(&self, record: &mut RecordMut<'_>, base_field: &str) -> Result<(), RecordError> {
        let mut base = record.field_mut(base_field)?;
        base.set_i32("type", self.tag)?;
        base.set_i32("mode", self.mode)?;
        base.set_string("name", &self.name)
    }
}

fn mode_flags(show_viewport: bool, show_render: bool) -> i32 {
    let mut mode = 0;
    if show_viewport {
        mode |= MODE_REALTIME;
    }
    if show_render {
        mode |= MODE_RENDER;
    }
    mode
}

fn address(target: Option<IdRef>, address_of: AddressOf<'_>) -> Option<NonZeroU64> {
    target.and_then(address_of)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum BooleanOperation {
    Intersect,
    Union,
    Difference,
}

impl BooleanOperation {
    fn from_tag(tag: u8) -> Result<BooleanOperation, ModelError> {
        match tag {
            0 => Ok(BooleanOperation::Intersect),
            1 => Ok(BooleanOperation::Union),
            2 => Ok(BooleanOperation::Difference),
            _ => Err(ModelError::UnknownVariant {
                family: "BooleanModifierData.operation",
                tag: tag.into(),
            }),
        }
    }

    fn tag(self) -> u8 {
        match self {
            BooleanOperation::Intersect => 0,
            BooleanOperation::Union => 1,
            BooleanOperation::Difference => 2,
        }
    }
}

/// Settings of a mesh modifier. Variants the model does not read in detail
/// are kept as [`ModifierKind::Other`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ModifierKind {
    Subsurf {
        levels: i16,
        render_levels: i16,
        quality: i16,
    },
    Mirror {
        axis: i16,
        tolerance: f32,
        mirror_object: Option<IdRef>,
    },
    Array {
        count: i32,
        constant_offset: [f32; 3],
        relative_offset: [f32; 3],
        start_cap: Option<IdRef>,
        end_cap: Option<IdRef>,
    },
    Armature {
        object: Option<IdRef>,
        vertex_group: String,
    },
    Bevel {
        width: f32,
        segments: i32,
    },
    Boolean {
        object: Option<IdRef>,
        operation: BooleanOperation,
    },
    Displace {
        texture: Option<IdRef>,
        strength: f32,
        mid_level: f32,
    },
    Solidify {
        thickness: f32,
        offset: f32,
    },
    Weld {
        merge_distance: f32,
    },
    Other(ModifierType),
}

impl ModifierKind {
    /// Settings a freshly added modifier of type `ty` starts with.
    pub fn new(ty: ModifierType) -> ModifierKind {
        match ty {
            ModifierType::Subsurf => ModifierKind::Subsurf {
                levels: 1,
                render_levels: 2,
                quality: 3,
            },
            ModifierType::Mirror => ModifierKind::Mirror {
                axis: 1,
                tolerance: 0.001,
                mirror_object: None,
            },
            ModifierType::Array => ModifierKind::Array {
                count: 2,
                constant_offset: [1.0, 0.0, 0.0],
                relative_offset: [1.0, 0.0, 0.0],
                start_cap: None,
                end_cap: None,
            },
            ModifierType::Armature => ModifierKind::Armature {
                object: None,
                vertex_group: String::new(),
            },
            ModifierType::Bevel => ModifierKind::Bevel {
                width: 0.1,
                segments: 1,
            },
            ModifierType::Boolean => ModifierKind::Boolean {
                object: None,
                operation: BooleanOperation::Difference,
            },
            ModifierType::Displace => ModifierKind::Displace {
                texture: None,
                strength: 1.0,
                mid_level: 0.5,
            },
            ModifierType::Solidify => ModifierKind::Solidify {
                thickness: 0.01,
                offset: -1.0,
            },
            ModifierType::Weld => ModifierKind::Weld {
                merge_distance: 0.001,
            },
            other => ModifierKind::Other(other),
        }
    }

    pub fn ty(&self) -> ModifierType {
        match self {
            ModifierKind::Subsurf { .. } => ModifierType::Subsurf,
            ModifierKind::Mirror { .. } => ModifierType::Mirror,
            ModifierKind::Array { .. } => ModifierType::Array,
            ModifierKind::Armature { .. } => ModifierType::Armature,
            ModifierKind::Bevel { .. } => ModifierType::Bevel,
            ModifierKind::Boolean { .. } => ModifierType::Boolean,
            ModifierKind::Displace { .. } => ModifierType::Displace,
            ModifierKind::Solidify { .. } => ModifierType::Solidify,
            ModifierKind::Weld { .. } => ModifierType::Weld,
            ModifierKind::Other(ty) => *ty,
        }
    }

    pub fn references(&self) -> Vec<IdRef> {
        let refs = match self {
            ModifierKind::Mirror { mirror_object, .. } => vec![*mirror_object],
            ModifierKind::Array {
                start_cap, end_cap, ..
            } => vec![*start_cap, *end_cap],
            ModifierKind::Armature { object, .. } | ModifierKind::Boolean { object, .. } => {
                vec![*object]
            }
            ModifierKind::Displace { texture, .. } => vec![*texture],
            _ => Vec::new(),
        };
        refs.into_iter().flatten().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Modifier {
    pub name: String,
    pub kind: ModifierKind,
    pub show_viewport: bool,
    pub show_render: bool,
}

impl Modifier {
    pub fn new<T: Into<String>>(name: T, kind: ModifierKind) -> Modifier {
        Modifier {
            name: name.into(),
            kind,
            show_viewport: true,
            show_render: true,
        }
    }

    pub fn ty(&self) -> ModifierType {
        self.kind.ty()
    }

    /// Reads a concrete modifier record, dispatching on the base's `type`.
    pub fn from_record(record: &Record<'_>, resolve: Resolve<'_>) -> Result<Modifier, crate::Error> {
        let header = VariantHeader::read(record, ModifierType::BASE_STRUCT)?;
        let ty = ModifierType::from_tag(header.tag)?;
        check_struct(record, ty.struct_name())?;

        let object = |field: &str| -> Result<Option<IdRef>, RecordError> {
            Ok(record.get_pointer(field)?.and_then(resolve))
        };
        let kind = match ty {
            ModifierType::Subsurf => ModifierKind::Subsurf {
                levels: record.get_i16("levels")?,
                render_levels: record.get_i16("renderLevels")?,
                quality: record.get_i16("quality")?,
            },
            ModifierType::Mirror => ModifierKind::Mirror {
                axis: record.get_i16("axis")?,
                tolerance: record.get_f32("tolerance")?,
                mirror_object: object("mirror_ob")?,
            },
            ModifierType::Array => ModifierKind::Array {
                count: record.get_i32("count")?,
                constant_offset: record.get_f32_array("offset")?,
                relative_offset: record.get_f32_array("scale")?,
                start_cap: object("start_cap")?,
                end_cap: object("end_cap")?,
            },
            ModifierType::Armature => ModifierKind::Armature {
                object: object("object")?,
                vertex_group: record.get_string("defgrp_name")?,
            },
            ModifierType::Bevel => ModifierKind::Bevel {
                width: record.get_f32("value")?,
                segments: record.get_i32("res")?,
            },
            ModifierType::Boolean => ModifierKind::Boolean {
                object: object("object")?,
                operation: BooleanOperation::from_tag(record.get_u8("operation")?)?,
            },
            ModifierType::Displace => ModifierKind::Displace {
                texture: object("texture")?,
                strength: record.get_f32("strength")?,
                mid_level: record.get_f32("midlevel")?,
            },
            ModifierType::Solidify => ModifierKind::Solidify {
                thickness: record.get_f32("offset")?,
                offset: record.get_f32("offset_fac")?,
            },
            ModifierType::Weld => ModifierKind::Weld {
                merge_distance: record.get_f32("merge_dist")?,
            },
            other => ModifierKind::Other(other),
        };
        Ok(Modifier {
            name: header.name,
            kind,
            show_viewport: header.mode & MODE_REALTIME != 0,
            show_render: header.mode & MODE_RENDER != 0,
        })
    }

    /// Writes the header and the typed settings into a record of the
    /// matching struct. Fields the model doesn't know are left alone.
    pub fn write_record(
        &self,
        record: &mut RecordMut<'_>,
        address_of: AddressOf<'_>,
    ) -> Result<(), crate::Error> {
        let ty = self.ty();
        check_struct(&record.as_record(), ty.struct_name())?;
        VariantHeader {
            tag: ty.tag(),
            mode: mode_flags(self.show_viewport, self.show_render),
            name: self.name.clone(),
        }
        .write(record, ModifierType::BASE_FIELD)?;

        match &self.kind {
            ModifierKind::Subsurf {
                levels,
                render_levels,
                quality,
            } => {
                record.set_i16("levels", *levels)?;
                record.set_i16("renderLevels", *render_levels)?;
                record.set_i16("quality", *quality)?;
            }
            ModifierKind::Mirror {
                axis,
                tolerance,
                mirror_object,
            } => {
                record.set_i16("axis", *axis)?;
                record.set_f32("tolerance", *tolerance)?;
                record.set_pointer("mirror_ob", address(*mirror_object, address_of))?;
            }
            ModifierKind::Array {
                count,
                constant_offset,
                relative_offset,
                start_cap,
                end_cap,
            } => {
                record.set_i32("count", *count)?;
                record.set_slice("offset", constant_offset)?;
                record.set_slice("scale", relative_offset)?;
                record.set_pointer("start_cap", address(*start_cap, address_of))?;
                record.set_pointer("end_cap", address(*end_cap, address_of))?;
            }
            ModifierKind::Armature {
                object,
                vertex_group,
            } => {
                record.set_pointer("object", address(*object, address_of))?;
                record.set_string("defgrp_name", vertex_group)?;
            }
            ModifierKind::Bevel { width, segments } => {
                record.set_f32("value", *width)?;
                record.set_i32("res", *segments)?;
            }
            ModifierKind::Boolean { object, operation } => {
                record.set_pointer("object", address(*object, address_of))?;
                record.set_u8("operation", operation.tag())?;
            }
            ModifierKind::Displace {
                texture,
                strength,
                mid_level,
            } => {
                record.set_pointer("texture", address(*texture, address_of))?;
                record.set_f32("strength", *strength)?;
                record.set_f32("midlevel", *mid_level)?;
            }
            ModifierKind::Solidify { thickness, offset } => {
                record.set_f32("offset", *thickness)?;
                record.set_f32("offset_fac", *offset)?;
            }
            ModifierKind::Weld { merge_distance } => {
                record.set_f32("merge_dist", *merge_distance)?;
            }
            ModifierKind::Other(_) => {}
        }
        Ok(())
    }
}

/// A grease pencil modifier. Only the shared header is modelled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpencilModifier {
    pub name: String,
    pub ty: GpencilModifierType,
    pub show_viewport: bool,
    pub show_render: bool,
}

impl GpencilModifier {
    pub fn new<T: Into<String>>(name: T, ty: GpencilModifierType) -> GpencilModifier {
        GpencilModifier {
            name: name.into(),
            ty,
            show_viewport: true,
            show_render: true,
        }
    }

    pub fn from_record(record: &Record<'_>) -> Result<GpencilModifier, crate::Error> {
        let header = VariantHeader::read(record, GpencilModifierType::BASE_STRUCT)?;
        let ty = GpencilModifierType::from_tag(header.tag)?;
        check_struct(record, ty.struct_name())?;
        Ok(GpencilModifier {
            name: header.name,
            ty,
            show_viewport: header.mode & MODE_REALTIME != 0,
            show_render: header.mode & MODE_RENDER != 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ShaderFxKind {
    Blur {
        radius: [i32; 2],
        samples: i32,
    },
    Colorize {
        low_color: [f32; 4],
        high_color: [f32; 4],
        factor: f32,
    },
    Other(ShaderFxType),
}

impl ShaderFxKind {
    pub fn ty(&self) -> ShaderFxType {
        match self {
            ShaderFxKind::Blur { .. } => ShaderFxType::Blur,
            ShaderFxKind::Colorize { .. } => ShaderFxType::Colorize,
            ShaderFxKind::Other(ty) => *ty,
        }
    }
}

/// A grease pencil visual effect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShaderFx {
    pub name: String,
    pub kind: ShaderFxKind,
    pub show_viewport: bool,
    pub show_render: bool,
}

impl ShaderFx {
    pub fn new<T: Into<String>>(name: T, kind: ShaderFxKind) -> ShaderFx {
        ShaderFx {
            name: name.into(),
            kind,
            show_viewport: true,
            show_render: true,
        }
    }

    pub fn from_record(record: &Record<'_>) -> Result<ShaderFx, crate::Error> {
        let header = VariantHeader::read(record, ShaderFxType::BASE_STRUCT)?;
        let ty = ShaderFxType::from_tag(header.tag)?;
        check_struct(record, ty.struct_name())?;
        let kind = match ty {
            ShaderFxType::Blur => {
                let radius = record.get_i32_vec("radius")?;
                ShaderFxKind::Blur {
                    radius: [radius[0], radius[1]],
                    samples: record.get_i32("samples")?,
                }
            }
            ShaderFxType::Colorize => ShaderFxKind::Colorize {
                low_color: record.get_f32_array("low_color")?,
                high_color: record.get_f32_array("high_color")?,
                factor: record.get_f32("factor")?,
            },
            other => ShaderFxKind::Other(other),
        };
        Ok(ShaderFx {
            name: header.name,
            kind,
            show_viewport: header.mode & MODE_REALTIME != 0,
            show_render: header.mode & MODE_RENDER != 0,
        })
    }

    pub fn write_record(&self, record: &mut RecordMut<'_>) -> Result<(), crate::Error> {
        let ty = self.kind.ty();
        check_struct(&record.as_record(), ty.struct_name())?;
        VariantHeader {
            tag: ty.tag(),
            mode: mode_flags(self.show_viewport, self.show_render),
            name: self.name.clone(),
        }
        .write(record, ShaderFxType::BASE_FIELD)?;
        match &self.kind {
            ShaderFxKind::Blur { radius, samples } => {
                record.set_slice("radius", radius)?;
                record.set_i32("samples", *samples)?;
            }
            ShaderFxKind::Colorize {
                low_color,
                high_color,
                factor,
            } => {
                record.set_slice("low_color", low_color)?;
                record.set_slice("high_color", high_color)?;
                record.set_f32("factor", *factor)?;
            }
            ShaderFxKind::Other(_) => {}
        }
        Ok(())
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

    fn object(uid: u32) -> IdRef {
        IdRef {
            code: IdCode::Object,
            uid: SessionUid::new(uid).unwrap(),
        }
    }

    #[test]
    fn tags() {
        for ty in ModifierType::ALL {
            assert_eq!(ModifierType::from_tag(ty.tag()), Ok(*ty));
            assert_eq!(ModifierType::from_struct_name(ty.struct_name()), Some(*ty));
        }
        assert_eq!(
            ModifierType::from_tag(10),
            Err(ModelError::UnknownVariant {
                family: "ModifierData",
                tag: 10
            })
        );
        assert_eq!(ShaderFxType::Pixel.to_string(), "Pixelate");
        assert_eq!(ShaderFxType::BASE_FIELD, "shaderfx");
    }

    #[test]
    fn line_style_names() {
        for ty in LineStyleModifierType::ALL.iter() {
            assert_eq!(LineStyleModifierType::from_tag(ty.tag()), Ok(*ty));
        }
        let late: Vec<_> = [
            LineStyleModifierType::Tangent,
            LineStyleModifierType::Noise,
            LineStyleModifierType::CreaseAngle,
            LineStyleModifierType::Simplification,
            LineStyleModifierType::Curvature3D,
        ]
        .iter()
        .map(|t| t.tag())
        .collect();
        assert_eq!(late, [19, 20, 21, 22, 23]);
        assert_eq!(LineStyleModifierType::Offset2D.tag(), 17);
        assert_eq!(LineStyleModifierType::Transform2D.tag(), 18);
        assert!(LineStyleModifierType::from_tag(0).is_err());
        assert!(LineStyleModifierType::from_tag(24).is_err());
        assert_eq!(
            LineStyleModifierType::Curvature3D.struct_name(LineStyleChannel::Thickness),
            "LineStyleThicknessModifier_Curvature_3D"
        );
        assert_eq!(
            LineStyleModifierType::parse_struct_name("LineStyleGeometryModifier_2DOffset"),
            Some((LineStyleChannel::Geometry, LineStyleModifierType::Offset2D))
        );
        assert_eq!(LineStyleModifierType::parse_struct_name("LineStyleModifier"), None);
    }

    #[test]
    fn modifier_records() {
        let catalog = Catalog::builtin().unwrap();
        let target = object(3);
        let address_of = |r: IdRef| if r == target { NonZeroU64::new(0x40) } else { None };
        let resolve = |a: NonZeroU64| if a.get() == 0x40 { Some(target) } else { None };

        for t in [Target::LITTLE_32, Target::LITTLE_64].iter() {
            let layouts = catalog.layouts(*t).unwrap();
            let mut modifiers = vec![
                Modifier::new("Subdivision", ModifierKind::new(ModifierType::Subsurf)),
                Modifier::new("Array", ModifierKind::new(ModifierType::Array)),
                Modifier::new("Smooth", ModifierKind::new(ModifierType::Smooth)),
            ];
            modifiers.push(Modifier::new(
                "Boolean",
                ModifierKind::Boolean {
                    object: Some(target),
                    operation: BooleanOperation::Union,
                },
            ));
            modifiers[0].show_render = false;

            for modifier in &modifiers {
                let mut buf = RecordBuf::zeroed(&layouts, modifier.ty().struct_name()).unwrap();
                modifier.write_record(&mut buf.as_mut(), &address_of).unwrap();
                let read = Modifier::from_record(&buf.as_record(), &resolve).unwrap();
                assert_eq!(&read, modifier);
            }
        }
    }

    #[test]
    fn mismatched_records() {
        let catalog = Catalog::builtin().unwrap();
        let layouts = catalog.layouts(Target::default()).unwrap();
        let resolve = |_: NonZeroU64| -> Option<IdRef> { None };

        let mut buf = RecordBuf::zeroed(&layouts, "MirrorModifierData").unwrap();
        buf.as_mut()
            .field_mut("modifier")
            .unwrap()
            .set_i32("type", ModifierType::Subsurf.tag())
            .unwrap();
        assert_eq!(
            Modifier::from_record(&buf.as_record(), &resolve),
            Err(crate::Error::Model(ModelError::VariantMismatch {
                expected: "SubsurfModifierData",
                found: "MirrorModifierData".to_string(),
            }))
        );

        let buf = RecordBuf::zeroed(&layouts, "MLoop").unwrap();
        assert!(Modifier::from_record(&buf.as_record(), &resolve).is_err());

        let modifier = Modifier::new("Weld", ModifierKind::new(ModifierType::Weld));
        let mut buf = RecordBuf::zeroed(&layouts, "BevelModifierData").unwrap();
        assert!(modifier.write_record(&mut buf.as_mut(), &|_| None).is_err());
    }

    #[test]
    fn shader_fx_records() {
        let catalog = Catalog::builtin().unwrap();
        let layouts = catalog.layouts(Target::default()).unwrap();
        let fx = ShaderFx::new(
            "Blur",
            ShaderFxKind::Blur {
                radius: [5, 5],
                samples: 4,
            },
        );
        let mut buf = RecordBuf::zeroed(&layouts, "BlurShaderFxData").unwrap();
        fx.write_record(&mut buf.as_mut()).unwrap();
        assert_eq!(ShaderFx::from_record(&buf.as_record()).unwrap(), fx);

        let mut buf = RecordBuf::zeroed(&layouts, "TintGpencilModifierData").unwrap();
        let mut base = buf.as_mut();
        let mut base = base.field_mut("modifier").unwrap();
        base.set_i32("type", GpencilModifierType::Tint.tag()).unwrap();
        base.set_string("name", "Tint").unwrap();
        let modifier = GpencilModifier::from_record(&buf.as_record()).unwrap();
        assert_eq!(modifier.ty, GpencilModifierType::Tint);
        assert!(!modifier.show_viewport);
    }
}
