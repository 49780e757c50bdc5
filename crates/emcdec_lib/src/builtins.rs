use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::EmcError;

mod tables {
    include!(concat!(env!("OUT_DIR"), "/builtin_tables.rs"));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Numeric,
    // index into the script's raw string table
    RawString,
    // id in a language file
    LanguageStringId,
}

impl From<tables::DefKind> for ParamKind {
    fn from(k: tables::DefKind) -> Self {
        match k {
            tables::DefKind::Num => ParamKind::Numeric,
            tables::DefKind::Str => ParamKind::RawString,
            tables::DefKind::StrId => ParamKind::LanguageStringId,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Numeric => write!(f, "num"),
            ParamKind::RawString => write!(f, "str"),
            ParamKind::LanguageStringId => write!(f, "strid"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub params: Vec<Param>,
}

impl Signature {
    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", p.name, p.kind)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinRegistry {
    #[serde(default)]
    functions: BTreeMap<String, Signature>,
}

impl BuiltinRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let functions = tables::BUILTIN_DEFS
            .iter()
            .map(|d| {
                let params = d
                    .params
                    .iter()
                    .map(|(name, kind)| Param {
                        name: (*name).to_string(),
                        kind: (*kind).into(),
                    })
                    .collect();
                (d.name.to_string(), Signature { params })
            })
            .collect();
        Self { functions }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, EmcError> {
        Ok(toml::from_str(s)?)
    }

    pub fn lookup(&self, name: &str) -> Option<&Signature> {
        self.functions.get(name)
    }

    pub fn has_parameters(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(Signature::has_params)
    }

    pub fn insert(&mut self, name: impl Into<String>, sig: Signature) -> Option<Signature> {
        self.functions.insert(name.into(), sig)
    }

    // entries of `other` win
    pub fn extend(&mut self, other: BuiltinRegistry) {
        self.functions.extend(other.functions);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Signature)> {
        self.functions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn default_table_is_loaded() {
        let reg = BuiltinRegistry::builtin();
        assert_eq!(reg.len(), 17);

        let sig = reg.lookup("testGameFlag").unwrap();
        assert_eq!(
            sig.params,
            vec![Param {
                name: "flag".into(),
                kind: ParamKind::Numeric
            }]
        );

        let sig = reg.lookup("playDialogueTalkText").unwrap();
        assert_eq!(sig.params[0].kind, ParamKind::LanguageStringId);

        let sig = reg.lookup("initAnimStruct").unwrap();
        let names: Vec<_> = sig.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["file", "index", "x", "y", "offscreenBuffer", "wsaFlags"]);
        assert_eq!(sig.params[0].kind, ParamKind::RawString);
    }

    #[test]
    fn has_parameters() {
        let reg = BuiltinRegistry::builtin();
        assert!(reg.has_parameters("setGameFlag"));
        assert!(!reg.has_parameters("clearDialogueField"));
        assert!(reg.lookup("clearDialogueField").is_some());
        assert!(!reg.has_parameters("noSuchFunction"));
        assert!(reg.lookup("noSuchFunction").is_none());
    }

    #[test]
    fn toml_overlay_extends_and_replaces() {
        let overlay = BuiltinRegistry::from_toml_str(
            r#"
            [functions.playSoundEffect]
            params = [{ name = "track", kind = "numeric" }, { name = "volume", kind = "numeric" }]

            [functions.testGameFlag]
            params = [{ name = "gameFlag", kind = "numeric" }]

            [functions.fadePalette]
            "#,
        )
        .unwrap();
        assert_eq!(overlay.len(), 3);
        assert!(!overlay.has_parameters("fadePalette"));

        let mut reg = BuiltinRegistry::builtin();
        reg.extend(overlay);
        assert_eq!(reg.len(), 19);
        assert_eq!(reg.lookup("playSoundEffect").unwrap().params.len(), 2);
        assert_eq!(reg.lookup("testGameFlag").unwrap().params[0].name, "gameFlag");
    }

    #[test]
    fn toml_overlay_rejects_unknown_kind() {
        let err = BuiltinRegistry::from_toml_str(
            r#"
            [functions.broken]
            params = [{ name = "x", kind = "float" }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, EmcError::Registry(_)));
    }

    #[test]
    fn signature_display() {
        let reg = BuiltinRegistry::builtin();
        assert_eq!(reg.lookup("loadBitmap").unwrap().to_string(), "(file: str, param: num)");
        assert_eq!(reg.lookup("clearDialogueField").unwrap().to_string(), "()");
    }
}
