use super::{truncate, ModelError};
use crate::record::{Record, RecordError};
use serde::Serialize;
use std::{fmt, num::NonZeroU32, str::FromStr};

/// Size of `ID.name`: two code bytes, the name and a NUL terminator.
pub const MAX_ID_NAME: usize = 66;
/// Longest name that fits next to the code and the terminator.
pub const MAX_NAME_LEN: usize = MAX_ID_NAME - 3;

macro_rules! id_codes {
    ($($variant:ident = $code:literal => $struct_name:literal,)+) => {
        /// The kind of a datablock, stored as the first two bytes of its name.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum IdCode {
            $($variant,)+
        }

        impl IdCode {
            pub const ALL: &'static [IdCode] = &[$(IdCode::$variant,)+];

            pub fn code(self) -> [u8; 2] {
                match self {
                    $(IdCode::$variant => *$code,)+
                }
            }

            /// The DNA struct datablocks of this kind are stored as.
            pub fn struct_name(self) -> &'static str {
                match self {
                    $(IdCode::$variant => $struct_name,)+
                }
            }

            pub fn from_code(code: [u8; 2]) -> Option<IdCode> {
                match &code {
                    $($code => Some(IdCode::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

id_codes! {
    Object = b"OB" => "Object",
    Mesh = b"ME" => "Mesh",
    Curve = b"CU" => "Curve",
    Lattice = b"LT" => "Lattice",
    Material = b"MA" => "Material",
    Texture = b"TE" => "Tex",
    Image = b"IM" => "Image",
    World = b"WO" => "World",
    Camera = b"CA" => "Camera",
    Light = b"LA" => "Light",
    Scene = b"SC" => "Scene",
    Screen = b"SR" => "bScreen",
    Action = b"AC" => "bAction",
    NodeTree = b"NT" => "bNodeTree",
    Armature = b"AR" => "bArmature",
    Brush = b"BR" => "Brush",
    Collection = b"GR" => "Collection",
    GreasePencil = b"GD" => "bGPdata",
    LineStyle = b"LS" => "FreestyleLineStyle",
    ShapeKey = b"KE" => "Key",
    Library = b"LI" => "Library",
    PaintCurve = b"PC" => "PaintCurve",
    Palette = b"PL" => "Palette",
    MetaBall = b"MB" => "MetaBall",
    Text = b"TX" => "Text",
    Sound = b"SO" => "bSound",
    Speaker = b"SK" => "Speaker",
    LightProbe = b"LP" => "LightProbe",
    WindowManager = b"WM" => "wmWindowManager",
    WorkSpace = b"WS" => "WorkSpace",
    Particle = b"PA" => "ParticleSettings",
    MovieClip = b"MC" => "MovieClip",
    Mask = b"MS" => "Mask",
    CacheFile = b"CF" => "CacheFile",
    Hair = b"HA" => "Hair",
    PointCloud = b"PT" => "PointCloud",
    Volume = b"VO" => "Volume",
}

impl fmt::Display for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        write!(f, "{}{}", code[0] as char, code[1] as char)
    }
}

impl FromStr for IdCode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            [a, b] => IdCode::from_code([*a, *b]),
            _ => None,
        }
        .ok_or_else(|| ModelError::UnknownIdCode(s.to_string()))
    }
}

/// A datablock name together with its code, as stored in `ID.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdName {
    code: IdCode,
    name: String,
}

impl IdName {
    /// Names longer than [`MAX_NAME_LEN`] bytes are truncated.
    pub fn new(code: IdCode, name: &str) -> Result<IdName, ModelError> {
        let name = truncate(name, MAX_NAME_LEN);
        if name.is_empty() {
            return Err(ModelError::EmptyName("datablock"));
        }
        Ok(IdName {
            code,
            name: name.to_string(),
        })
    }

    /// Decodes a stored `ID.name`, code prefix included.
    pub fn from_bytes(bytes: &[u8]) -> Result<IdName, ModelError> {
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        let bytes = &bytes[..end];
        if bytes.len() < 2 {
            return Err(ModelError::UnknownIdCode(
                String::from_utf8_lossy(bytes).into_owned(),
            ));
        }
        let code = IdCode::from_code([bytes[0], bytes[1]]).ok_or_else(|| {
            ModelError::UnknownIdCode(String::from_utf8_lossy(&bytes[..2]).into_owned())
        })?;
        IdName::new(code, &String::from_utf8_lossy(&bytes[2..]))
    }

    /// Reads the name of a datablock record, or of an `ID` record.
    pub fn from_record(record: &Record<'_>) -> Result<IdName, crate::Error> {
        let id = record.upcast("ID").ok_or_else(|| RecordError::TypeMismatch {
            field: "id".to_string(),
            expected: "a datablock",
        })?;
        Ok(IdName::from_bytes(&id.get_u8_vec("name")?)?)
    }

    pub fn to_bytes(&self) -> [u8; MAX_ID_NAME] {
        let mut out = [0; MAX_ID_NAME];
        out[..2].copy_from_slice(&self.code.code());
        out[2..2 + self.name.len()].copy_from_slice(self.name.as_bytes());
        out
    }

    pub fn code(&self) -> IdCode {
        self.code
    }

    /// The user visible name, without the code.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for IdName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.code, self.name)
    }
}

/// Identity of a datablock for the length of a session. Never zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionUid(NonZeroU32);

impl SessionUid {
    pub fn new(value: u32) -> Option<SessionUid> {
        NonZeroU32::new(value).map(SessionUid)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for SessionUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A weak, lookup-only reference to a datablock. It does not keep the
/// datablock alive; resolving it after removal yields nothing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IdRef {
    pub code: IdCode,
    pub uid: SessionUid,
}

impl fmt::Display for IdRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.code, self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in IdCode::ALL {
            assert_eq!(IdCode::from_code(code.code()), Some(*code));
            assert_eq!(code.to_string().parse::<IdCode>(), Ok(*code));
        }
        assert_eq!(IdCode::Screen.struct_name(), "bScreen");
        assert_eq!("WM".parse::<IdCode>(), Ok(IdCode::WindowManager));
        assert_eq!(IdCode::Particle.struct_name(), "ParticleSettings");
        assert_eq!(IdCode::Sound.struct_name(), "bSound");

        let codes: std::collections::BTreeSet<_> = IdCode::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes.len(), IdCode::ALL.len());
        assert!("XX".parse::<IdCode>().is_err());
        assert!("OBJ".parse::<IdCode>().is_err());
    }

    #[test]
    fn names_carry_code_prefix() {
        let name = IdName::new(IdCode::Object, "Cube").unwrap();
        let bytes = name.to_bytes();
        assert_eq!(&bytes[..7], b"OBCube\0");
        assert_eq!(IdName::from_bytes(&bytes), Ok(name.clone()));
        assert_eq!(name.to_string(), "OBCube");
    }

    #[test]
    fn long_names_are_truncated() {
        let name = IdName::new(IdCode::Mesh, &"x".repeat(100)).unwrap();
        assert_eq!(name.name().len(), MAX_NAME_LEN);
        assert_eq!(name.to_bytes()[MAX_ID_NAME - 1], 0);
    }

    #[test]
    fn bad_names() {
        assert_eq!(
            IdName::new(IdCode::Mesh, ""),
            Err(ModelError::EmptyName("datablock"))
        );
        assert!(matches!(
            IdName::from_bytes(b"ZZthing\0"),
            Err(ModelError::UnknownIdCode(_))
        ));
        assert!(IdName::from_bytes(b"O").is_err());
    }
}
