//! The built-in schema, split by domain. Each domain is a declaration file
//! compiled into the crate; together they form one self-contained schema
//! that follows the layout rules for both pointer sizes.

use crate::{
    layout::{self, Layouts},
    parsers::Target,
    schema::{Schema, SchemaError, StructDef},
    Error,
};
use log::{debug, info};
use serde::Serialize;
use std::{collections::HashMap, fmt, str::FromStr};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Core,
    Animation,
    Geometry,
    Object,
    Material,
    Nodes,
    Modifier,
    GreasePencil,
    LineStyle,
    Armature,
    Screen,
    Brush,
    Physics,
    Render,
    Particle,
    WindowManager,
    Text,
    Sound,
    MovieClip,
    Mask,
    Volume,
}

impl Domain {
    pub const ALL: [Domain; 21] = [
        Domain::Core,
        Domain::Animation,
        Domain::Geometry,
        Domain::Object,
        Domain::Material,
        Domain::Nodes,
        Domain::Modifier,
        Domain::GreasePencil,
        Domain::LineStyle,
        Domain::Armature,
        Domain::Screen,
        Domain::Brush,
        Domain::Physics,
        Domain::Render,
        Domain::Particle,
        Domain::WindowManager,
        Domain::Text,
        Domain::Sound,
        Domain::MovieClip,
        Domain::Mask,
        Domain::Volume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Domain::Core => "core",
            Domain::Animation => "animation",
            Domain::Geometry => "geometry",
            Domain::Object => "object",
            Domain::Material => "material",
            Domain::Nodes => "nodes",
            Domain::Modifier => "modifier",
            Domain::GreasePencil => "gpencil",
            Domain::LineStyle => "linestyle",
            Domain::Armature => "armature",
            Domain::Screen => "screen",
            Domain::Brush => "brush",
            Domain::Physics => "physics",
            Domain::Render => "render",
            Domain::Particle => "particle",
            Domain::WindowManager => "windowmanager",
            Domain::Text => "text",
            Domain::Sound => "sound",
            Domain::MovieClip => "movieclip",
            Domain::Mask => "mask",
            Domain::Volume => "volume",
        }
    }

    /// File the domain's declarations live in, under `src/catalog/`.
    pub fn file_name(self) -> String {
        format!("{}.dna", self.name())
    }

    pub fn source(self) -> &'static str {
        match self {
            Domain::Core => include_str!("core.dna"),
            Domain::Animation => include_str!("animation.dna"),
            Domain::Geometry => include_str!("geometry.dna"),
            Domain::Object => include_str!("object.dna"),
            Domain::Material => include_str!("material.dna"),
            Domain::Nodes => include_str!("nodes.dna"),
            Domain::Modifier => include_str!("modifier.dna"),
            Domain::GreasePencil => include_str!("gpencil.dna"),
            Domain::LineStyle => include_str!("linestyle.dna"),
            Domain::Armature => include_str!("armature.dna"),
            Domain::Screen => include_str!("screen.dna"),
            Domain::Brush => include_str!("brush.dna"),
            Domain::Physics => include_str!("physics.dna"),
            Domain::Render => include_str!("render.dna"),
            Domain::Particle => include_str!("particle.dna"),
            Domain::WindowManager => include_str!("windowmanager.dna"),
            Domain::Text => include_str!("text.dna"),
            Domain::Sound => include_str!("sound.dna"),
            Domain::MovieClip => include_str!("movieclip.dna"),
            Domain::Mask => include_str!("mask.dna"),
            Domain::Volume => include_str!("volume.dna"),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .iter()
            .copied()
            .find(|d| d.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Domain::ALL.iter().map(|d| d.name()).collect();
                format!("unknown domain `{}`, expected one of {}", s, names.join(", "))
            })
    }
}

/// Every built-in struct and the domain it belongs to.
#[derive(Debug, Clone)]
pub struct Catalog {
    schema: Schema,
    domains: HashMap<String, Domain>,
}

impl Catalog {
    /// Parses and merges every domain, then checks the result is self-contained.
    pub fn builtin() -> Result<Catalog, Error> {
        let mut schema = Schema::new();
        let mut domains = HashMap::new();
        for domain in Domain::ALL.iter().copied() {
            let part = Schema::from_source(domain.source())?;
            debug!("domain {} declares {} structs", domain, part.len());
            for name in part.struct_names() {
                domains.insert(name.to_string(), domain);
            }
            schema.merge(part)?;
        }
        schema.check()?;
        info!("built-in catalog: {} structs", schema.len());
        Ok(Catalog { schema, domains })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }

    pub fn get(&self, name: &str) -> Option<&StructDef> {
        self.schema.get(name)
    }

    pub fn domain_of(&self, name: &str) -> Option<Domain> {
        self.domains.get(name).copied()
    }

    /// Structs of one domain in declaration order.
    pub fn structs_in(&self, domain: Domain) -> impl Iterator<Item = &StructDef> {
        let domains = &self.domains;
        self.schema
            .structs()
            .filter(move |def| domains.get(&def.name) == Some(&domain))
    }

    pub fn layouts(&self, target: Target) -> Result<Layouts, SchemaError> {
        Layouts::compute(&self.schema, target)
    }

    /// Checks the layout rules for both pointer sizes.
    pub fn validate(&self) -> Result<(), Error> {
        Ok(layout::validate(&self.schema)?)
    }
}
