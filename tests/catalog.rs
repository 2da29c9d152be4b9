use blend_dna::{
    model::{
        id::IdCode,
        modifier::{GpencilModifierType, LineStyleModifierType, ModifierType, ShaderFxType},
    },
    parsers::sdna::Dna,
    schema::StructDef,
    Catalog, Domain, Endianness, Layouts, PointerSize, Schema, Target,
};
use std::{collections::BTreeSet, path::PathBuf};
use walkdir::WalkDir;

const KNOWN_SIZES: &[(&str, usize, usize)] = &[
    ("ListBase", 8, 16),
    ("ID", 132, 168),
    ("IDProperty", 108, 128),
    ("BezTriple", 72, 72),
    ("MVert", 20, 20),
    ("MEdge", 12, 12),
    ("MPoly", 12, 12),
    ("MLoop", 8, 8),
    ("ModifierData", 100, 120),
    ("SubsurfModifierData", 124, 152),
    ("Object", 1144, 1440),
    ("Mesh", 1488, 1704),
    ("bNode", 400, 464),
    ("bNodeSocket", 444, 488),
    ("bNodeLink", 32, 56),
    ("Bone", 368, 400),
    ("FCurve", 84, 120),
    ("ShaderFxData", 92, 104),
    ("GpencilModifierData", 92, 104),
    ("LineStyleModifier", 88, 96),
    ("bScreen", 204, 296),
    ("ARegion", 320, 424),
    ("PointCache", 1364, 1392),
    ("CustomData", 220, 232),
    ("CurveMapping", 344, 392),
    ("Scene", 4752, 5040),
    ("RenderData", 4012, 4104),
    ("Collection", 216, 304),
    ("BakeData", 1308, 1320),
    ("bPoseChannel", 720, 816),
    ("bPoseChannel_Runtime", 32, 48),
    ("Object_Runtime", 112, 160),
    ("Brush", 2108, 2192),
    ("bGPDstroke", 232, 256),
    ("bGPdata", 308, 376),
    ("Image", 1384, 1504),
    ("Material", 268, 336),
    ("Camera", 264, 328),
    ("bNodeTree", 356, 480),
    ("MTFace", 32, 32),
    ("MetaBall", 228, 304),
    ("Hair", 620, 704),
    ("PointCloud", 396, 464),
    ("EditBone", 2404, 2432),
    ("LightProbe", 220, 272),
    ("View3D", 1276, 1320),
    ("ToolSettings", 464, 536),
    ("wmWindowManager", 272, 416),
    ("wmWindow", 220, 336),
    ("WorkSpace", 184, 256),
    ("Text", 192, 256),
    ("bSound", 1224, 1288),
    ("Speaker", 188, 232),
    ("MovieClip", 2244, 2336),
    ("Mask", 168, 216),
    ("CacheFile", 2288, 2344),
    ("Volume", 1264, 1320),
    ("ParticleSettings", 748, 928),
    ("ParticleSystem", 560, 688),
];

fn names(structs: Vec<&StructDef>) -> BTreeSet<String> {
    structs.into_iter().map(|def| def.name.clone()).collect()
}

#[test]
fn builtin_catalog_follows_the_layout_rules() {
    let catalog = Catalog::builtin().unwrap();
    assert_eq!(catalog.schema().len(), 312);
    catalog.validate().unwrap();
}

#[test]
fn known_struct_sizes() {
    let catalog = Catalog::builtin().unwrap();
    let layouts32 = catalog.layouts(Target::LITTLE_32).unwrap();
    let layouts64 = catalog.layouts(Target::LITTLE_64).unwrap();

    for &(name, size32, size64) in KNOWN_SIZES {
        assert_eq!(layouts32.get(name).unwrap().size, size32, "{} on 32-bit", name);
        assert_eq!(layouts64.get(name).unwrap().size, size64, "{} on 64-bit", name);
    }
}

#[test]
fn sdna_round_trip() {
    let catalog = Catalog::builtin().unwrap();
    let schema = catalog.schema();

    for &pointer_size in &PointerSize::ALL {
        for &endianness in &[Endianness::Little, Endianness::Big] {
            let target = Target::new(pointer_size, endianness);
            let layouts = catalog.layouts(target).unwrap();
            let bytes = schema.to_dna(&layouts).unwrap().to_sdna(endianness).unwrap();
            assert_eq!(&bytes[..4], b"SDNA");

            let dna = Dna::from_sdna(&bytes, endianness).unwrap();
            assert_eq!(dna.structs.len(), schema.len());

            let decoded = Schema::from_dna(&dna, pointer_size).unwrap();
            let decoded_layouts = Layouts::compute(&decoded, target).unwrap();
            for def in schema.structs() {
                let other = decoded.get(&def.name).unwrap();
                let names: Vec<_> = def.fields.iter().map(|f| &f.name).collect();
                let other_names: Vec<_> = other.fields.iter().map(|f| &f.name).collect();
                assert_eq!(names, other_names, "{} fields", def.name);
                assert_eq!(
                    layouts.get(&def.name).unwrap().size,
                    decoded_layouts.get(&def.name).unwrap().size,
                    "{} on {:?}",
                    def.name,
                    target
                );
            }
        }
    }
}

#[test]
fn every_declaration_file_is_a_domain() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/catalog");
    let mut files = BTreeSet::new();
    for entry in WalkDir::new(&dir) {
        let entry = entry.unwrap();
        let file_name = entry.file_name().to_string_lossy();
        if file_name.ends_with(".dna") {
            files.insert(file_name.into_owned());
        }
    }

    let domains: BTreeSet<_> = Domain::ALL.iter().map(|d| d.file_name()).collect();
    assert_eq!(files, domains);

    let catalog = Catalog::builtin().unwrap();
    let total: usize = Domain::ALL
        .iter()
        .map(|&d| catalog.structs_in(d).count())
        .sum();
    assert_eq!(total, catalog.schema().len());
    assert_eq!(catalog.domain_of("Object"), Some(Domain::Object));
}

#[test]
fn modifier_families_match_their_tags() {
    let catalog = Catalog::builtin().unwrap();
    let schema = catalog.schema();

    let mut modifiers = names(schema.variants_of(ModifierType::BASE_STRUCT));
    assert!(modifiers.remove("MappingInfoModifierData"));
    let tagged: BTreeSet<_> = ModifierType::ALL
        .iter()
        .map(|t| t.struct_name().to_string())
        .collect();
    assert_eq!(modifiers, tagged);

    let gpencil = names(schema.variants_of(GpencilModifierType::BASE_STRUCT));
    let tagged: BTreeSet<_> = GpencilModifierType::ALL
        .iter()
        .map(|t| t.struct_name().to_string())
        .collect();
    assert_eq!(gpencil, tagged);

    let effects = names(schema.variants_of(ShaderFxType::BASE_STRUCT));
    let tagged: BTreeSet<_> = ShaderFxType::ALL
        .iter()
        .map(|t| t.struct_name().to_string())
        .collect();
    assert_eq!(effects, tagged);

    let line_style = schema.variants_of(LineStyleModifierType::BASE_STRUCT);
    assert_eq!(line_style.len(), 15);
    for def in line_style {
        let (channel, ty) = LineStyleModifierType::parse_struct_name(&def.name)
            .unwrap_or_else(|| panic!("{} is not a line style modifier name", def.name));
        assert_eq!(ty.struct_name(channel), def.name);
    }
}

#[test]
fn datablocks_start_with_an_id() {
    let catalog = Catalog::builtin().unwrap();
    for code in IdCode::ALL {
        let def = catalog
            .get(code.struct_name())
            .unwrap_or_else(|| panic!("no struct for {}", code));
        let first = &def.fields[0];
        assert_eq!((first.type_name.as_str(), first.ident.as_str()), ("ID", "id"));
    }
}
