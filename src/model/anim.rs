//! Keyframe animation: actions own their curves and groups, curves own
//! their keyframes, tracks own their strips.

use super::{check_struct, id::IdRef, unique_name, ModelError};
use crate::record::{Record, RecordError, RecordMut};
use serde::Serialize;
use std::{cmp::Ordering, convert::TryFrom};

/// Keyframes closer than this on the frame axis are the same keyframe.
pub const FRAME_THRESHOLD: f32 = 0.01;

const MAX_GROUP_NAME: usize = 63;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Interpolation {
    Constant,
    Linear,
    Bezier,
    Back,
    Bounce,
    Circular,
    Cubic,
    Elastic,
    Exponential,
    Quadratic,
    Quartic,
    Quintic,
    Sine,
}

impl Interpolation {
    const TAGS: [Interpolation; 13] = [
        Interpolation::Constant,
        Interpolation::Linear,
        Interpolation::Bezier,
        Interpolation::Back,
        Interpolation::Bounce,
        Interpolation::Circular,
        Interpolation::Cubic,
        Interpolation::Elastic,
        Interpolation::Exponential,
        Interpolation::Quadratic,
        Interpolation::Quartic,
        Interpolation::Quintic,
        Interpolation::Sine,
    ];

    pub fn tag(self) -> i8 {
        Interpolation::TAGS
            .iter()
            .position(|i| *i == self)
            .map_or(0, |i| i as i8)
    }

    pub fn from_tag(tag: i8) -> Result<Interpolation, ModelError> {
        usize::try_from(tag)
            .ok()
            .and_then(|i| Interpolation::TAGS.get(i).copied())
            .ok_or(ModelError::UnknownVariant {
                family: "BezTriple.ipo",
                tag: tag.into(),
            })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum HandleType {
    Free,
    Auto,
    Vector,
    Aligned,
    AutoClamped,
    AlignedDoubleSided,
}

impl HandleType {
    const TAGS: [HandleType; 6] = [
        HandleType::Free,
        HandleType::Auto,
        HandleType::Vector,
        HandleType::Aligned,
        HandleType::AutoClamped,
        HandleType::AlignedDoubleSided,
    ];

    pub fn tag(self) -> i8 {
        HandleType::TAGS
            .iter()
            .position(|h| *h == self)
            .map_or(0, |i| i as i8)
    }

    pub fn from_tag(tag: i8) -> Result<HandleType, ModelError> {
        usize::try_from(tag)
            .ok()
            .and_then(|i| HandleType::TAGS.get(i).copied())
            .ok_or(ModelError::UnknownVariant {
                family: "BezTriple.h1",
                tag: tag.into(),
            })
    }
}

/// A keyframe: the control point and its two handles, as `(frame, value)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BezTriple {
    pub left: [f32; 2],
    pub co: [f32; 2],
    pub right: [f32; 2],
    pub interpolation: Interpolation,
    pub left_handle: HandleType,
    pub right_handle: HandleType,
    pub selected: bool,
}

impl BezTriple {
    pub fn new(frame: f32, value: f32) -> BezTriple {
        BezTriple {
            left: [frame - 1.0, value],
            co: [frame, value],
            right: [frame + 1.0, value],
            interpolation: Interpolation::Bezier,
            left_handle: HandleType::AutoClamped,
            right_handle: HandleType::AutoClamped,
            selected: false,
        }
    }

    pub fn frame(&self) -> f32 {
        self.co[0]
    }

    pub fn value(&self) -> f32 {
        self.co[1]
    }

    pub fn from_record(record: &Record<'_>) -> Result<BezTriple, crate::Error> {
        check_struct(record, "BezTriple")?;
        let vec: [f32; 9] = record.get_f32_array("vec")?;
        let point = |i: usize| [vec[i * 3], vec[i * 3 + 1]];
        Ok(BezTriple {
            left: point(0),
            co: point(1),
            right: point(2),
            interpolation: Interpolation::from_tag(record.get_i8("ipo")?)?,
            left_handle: HandleType::from_tag(record.get_i8("h1")?)?,
            right_handle: HandleType::from_tag(record.get_i8("h2")?)?,
            selected: record.get_i8("f2")? & 1 != 0,
        })
    }

    pub fn write_record(&self, record: &mut RecordMut<'_>) -> Result<(), crate::Error> {
        check_struct(&record.as_record(), "BezTriple")?;
        let mut vec = [0.0; 9];
        for (i, point) in [self.left, self.co, self.right].iter().enumerate() {
            vec[i * 3..i * 3 + 2].copy_from_slice(point);
        }
        record.set_slice("vec", &vec)?;
        record.set_i8("ipo", self.interpolation.tag())?;
        record.set_i8("h1", self.left_handle.tag())?;
        record.set_i8("h2", self.right_handle.tag())?;
        record.set_i8("f2", self.selected as i8)?;
        Ok(())
    }

    fn shift(&mut self, value: f32) {
        let delta = value - self.co[1];
        for point in [&mut self.left, &mut self.co, &mut self.right].iter_mut() {
            point[1] += delta;
        }
    }
}

/// An animation curve driving one element of one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FCurve {
    pub rna_path: String,
    pub array_index: i32,
    /// Index into the owning action's groups.
    pub group: Option<usize>,
    keyframes: Vec<BezTriple>,
}

impl FCurve {
    pub fn new<T: Into<String>>(rna_path: T, array_index: i32) -> FCurve {
        FCurve {
            rna_path: rna_path.into(),
            array_index,
            group: None,
            keyframes: Vec::new(),
        }
    }

    /// Keyframes, sorted by frame.
    /// Reads an `FCurve` record and its `bezt` array. The path string is
    /// stored in a block of its own, so it is passed in.
    pub fn from_record<T: Into<String>>(
        record: &Record<'_>,
        rna_path: T,
        keyframes: &[u8],
    ) -> Result<FCurve, crate::Error> {
        check_struct(record, "FCurve")?;
        let mut curve = FCurve::new(rna_path, record.get_i32("array_index")?);
        let keys = Record::array(record.layouts(), "BezTriple", keyframes)?;
        let total = record.get_u32("totvert")? as usize;
        if keys.len() != total {
            return Err(RecordError::LengthMismatch {
                field: "bezt".to_string(),
                capacity: total,
                actual: keys.len(),
            }
            .into());
        }
        for key in &keys {
            curve.keyframes.push(BezTriple::from_record(key)?);
        }
        curve
            .keyframes
            .sort_by(|a, b| a.frame().partial_cmp(&b.frame()).unwrap_or(Ordering::Equal));
        Ok(curve)
    }

    pub fn keyframes(&self) -> &[BezTriple] {
        &self.keyframes
    }

    /// Inserts a keyframe keeping frame order. A keyframe already on that
    /// frame gets the new value instead. Returns the keyframe's index.
    pub fn insert_keyframe(&mut self, frame: f32, value: f32) -> usize {
        let index = self
            .keyframes
            .partition_point(|k| k.frame() < frame - FRAME_THRESHOLD);
        match self.keyframes.get_mut(index) {
            Some(existing) if (existing.frame() - frame).abs() < FRAME_THRESHOLD => {
                existing.shift(value);
            }
            _ => self.keyframes.insert(index, BezTriple::new(frame, value)),
        }
        index
    }

    pub fn remove_keyframe(&mut self, index: usize) -> Result<BezTriple, ModelError> {
        if index >= self.keyframes.len() {
            return Err(ModelError::InvalidIndex {
                what: "keyframe",
                index,
            });
        }
        Ok(self.keyframes.remove(index))
    }

    /// First and last keyframed frame.
    pub fn frame_range(&self) -> Option<(f32, f32)> {
        Some((self.keyframes.first()?.frame(), self.keyframes.last()?.frame()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionGroup {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Action {
    fcurves: Vec<FCurve>,
    groups: Vec<ActionGroup>,
}

impl Action {
    pub fn new() -> Action {
        Action::default()
    }

    pub fn fcurves(&self) -> &[FCurve] {
        &self.fcurves
    }

    pub fn groups(&self) -> &[ActionGroup] {
        &self.groups
    }

    /// Adds a group with a name unique among this action's groups.
    pub fn add_group(&mut self, name: &str) -> Result<usize, ModelError> {
        if name.is_empty() {
            return Err(ModelError::EmptyName("action group"));
        }
        let groups = &self.groups;
        let name = unique_name(name, MAX_GROUP_NAME, |n| groups.iter().any(|g| g.name == n));
        self.groups.push(ActionGroup { name });
        Ok(self.groups.len() - 1)
    }

    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.name == name)
    }

    pub fn fcurve(&self, rna_path: &str, array_index: i32) -> Option<&FCurve> {
        self.fcurves
            .iter()
            .find(|c| c.rna_path == rna_path && c.array_index == array_index)
    }

    /// Finds a curve or creates it. A new curve joins `group`, which is
    /// created when missing.
    pub fn fcurve_mut_or_insert(
        &mut self,
        rna_path: &str,
        array_index: i32,
        group: Option<&str>,
    ) -> Result<&mut FCurve, ModelError> {
        let found = self
            .fcurves
            .iter()
            .position(|c| c.rna_path == rna_path && c.array_index == array_index);
        let index = match found {
            Some(index) => index,
            None => {
                let mut curve = FCurve::new(rna_path, array_index);
                if let Some(group) = group {
                    curve.group = match self.group_index(group) {
                        Some(index) => Some(index),
                        None => Some(self.add_group(group)?),
                    };
                }
                self.fcurves.push(curve);
                self.fcurves.len() - 1
            }
        };
        Ok(&mut self.fcurves[index])
    }

    /// Removes a group. Its curves stay in the action, ungrouped.
    pub fn remove_group(&mut self, index: usize) -> Result<ActionGroup, ModelError> {
        if index >= self.groups.len() {
            return Err(ModelError::InvalidIndex {
                what: "action group",
                index,
            });
        }
        for curve in &mut self.fcurves {
            curve.group = match curve.group {
                Some(g) if g == index => None,
                Some(g) if g > index => Some(g - 1),
                other => other,
            };
        }
        Ok(self.groups.remove(index))
    }

    pub fn fcurves_in_group(&self, index: usize) -> impl Iterator<Item = &FCurve> {
        self.fcurves
            .iter()
            .filter(move |c| c.group == Some(index))
    }

    /// The frames spanned by all curves.
    pub fn frame_range(&self) -> Option<(f32, f32)> {
        self.fcurves
            .iter()
            .filter_map(FCurve::frame_range)
            .fold(None, |acc, (start, end)| match acc {
                None => Some((start, end)),
                Some((s, e)) => Some((s.min(start), e.max(end))),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NlaStrip {
    pub name: String,
    pub action: Option<IdRef>,
    pub start: f32,
    pub end: f32,
    pub influence: f32,
}

impl NlaStrip {
    pub fn new<T: Into<String>>(name: T, action: Option<IdRef>, start: f32, end: f32) -> NlaStrip {
        NlaStrip {
            name: name.into(),
            action,
            start: start.min(end),
            end: start.max(end),
            influence: 1.0,
        }
    }

    fn overlaps(&self, other: &NlaStrip) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NlaTrack {
    pub name: String,
    strips: Vec<NlaStrip>,
}

impl NlaTrack {
    pub fn new<T: Into<String>>(name: T) -> NlaTrack {
        NlaTrack {
            name: name.into(),
            strips: Vec::new(),
        }
    }

    /// Strips, sorted by start frame.
    pub fn strips(&self) -> &[NlaStrip] {
        &self.strips
    }

    /// Adds a strip in frame order. Strips on one track never overlap.
    pub fn add_strip(&mut self, strip: NlaStrip) -> Result<usize, ModelError> {
        if self.strips.iter().any(|s| s.overlaps(&strip)) {
            return Err(ModelError::StripOverlap(strip.name));
        }
        let index = self.strips.partition_point(|s| s.start < strip.start);
        self.strips.insert(index, strip);
        Ok(index)
    }

    pub fn remove_strip(&mut self, index: usize) -> Result<NlaStrip, ModelError> {
        if index >= self.strips.len() {
            return Err(ModelError::InvalidIndex {
                what: "strip",
                index,
            });
        }
        Ok(self.strips.remove(index))
    }
}

/// Animation attached to a datablock.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnimData {
    pub action: Option<IdRef>,
    pub tracks: Vec<NlaTrack>,
}

impl AnimData {
    /// Every action this animation uses.
    pub fn references(&self) -> impl Iterator<Item = IdRef> + '_ {
        self.action.into_iter().chain(
            self.tracks
                .iter()
                .flat_map(|t| t.strips.iter().filter_map(|s| s.action)),
        )
    }
}
