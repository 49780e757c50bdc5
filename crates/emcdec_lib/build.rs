use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root(crate_dir: &Path) -> PathBuf {
    crate_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("crate directory should be <root>/crates/<name>")
        .to_path_buf()
}

fn take_until_paren_close<'a>(s: &'a str) -> Option<&'a str> {
    let s = s.trim();
    let j = s.rfind(')')?;
    Some(s[..j].trim())
}

fn kind_ident(kind: &str) -> &'static str {
    match kind {
        "NUM" => "Num",
        "STR" => "Str",
        "STRID" => "StrId",
        other => panic!("unknown builtin parameter kind `{other}`"),
    }
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let root = workspace_root(&manifest_dir);

    let def_path = root.join("data").join("builtins.def");
    println!("cargo:rerun-if-changed={}", def_path.display());

    let def_src = fs::read_to_string(&def_path).expect("read data/builtins.def");

    let mut funcs: Vec<(String, Vec<(String, &'static str)>)> = Vec::new();
    for (line_no, line) in def_src.lines().enumerate() {
        let l = line.trim();
        if l.is_empty() || l.starts_with('#') {
            continue;
        }
        let rest = match l.strip_prefix("DEF(") {
            Some(v) => v,
            None => panic!("builtins.def:{}: expected DEF(...)", line_no + 1),
        };
        let inner = match take_until_paren_close(rest) {
            Some(v) => v,
            None => panic!("builtins.def:{}: missing `)`", line_no + 1),
        };
        let mut parts = inner.split(',').map(|p| p.trim());
        let name = parts.next().unwrap_or("").to_string();
        if name.is_empty() {
            panic!("builtins.def:{}: missing function name", line_no + 1);
        }
        if funcs.iter().any(|(n, _)| *n == name) {
            panic!("builtins.def:{}: `{name}` defined twice", line_no + 1);
        }

        let mut params = Vec::new();
        for p in parts {
            let mut kv = p.split_whitespace();
            let (kind, pname) = match (kv.next(), kv.next(), kv.next()) {
                (Some(k), Some(n), None) => (k, n),
                _ => panic!("builtins.def:{}: bad parameter `{p}`", line_no + 1),
            };
            params.push((pname.to_string(), kind_ident(kind)));
        }
        funcs.push((name, params));
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let out_path = out_dir.join("builtin_tables.rs");

    let mut out = String::new();

    out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq)]\n");
    out.push_str("pub enum DefKind {\n");
    out.push_str("    Num,\n");
    out.push_str("    Str,\n");
    out.push_str("    StrId,\n");
    out.push_str("}\n\n");

    out.push_str("#[derive(Debug, Clone, Copy)]\n");
    out.push_str("pub struct BuiltinDef {\n");
    out.push_str("    pub name: &'static str,\n");
    out.push_str("    pub params: &'static [(&'static str, DefKind)],\n");
    out.push_str("}\n\n");

    out.push_str("pub const BUILTIN_DEFS: &[BuiltinDef] = &[\n");
    for (name, params) in &funcs {
        out.push_str(&format!("    BuiltinDef {{ name: \"{}\", params: &[", name));
        for (i, (pname, kind)) in params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("(\"{}\", DefKind::{})", pname, kind));
        }
        out.push_str("] },\n");
    }
    out.push_str("];\n");

    fs::write(out_path, out).expect("write generated builtin tables");
}
