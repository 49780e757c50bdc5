use log::warn;

use crate::builtins::{BuiltinRegistry, ParamKind};
use crate::parser::parse_hex;

// Disassembly with each known builtin call followed by the values of its
// arguments, read from the PUSH lines right above it:
//
//   CALL loadBitmap args: 0(file):KEEP.CPS 1(param):3
//
// Other lines pass through unchanged.
pub fn annotate<S: AsRef<str>>(lines: &[S], registry: &BuiltinRegistry, strings: Option<&[String]>) -> Vec<String> {
    (0..lines.len())
        .map(|at| annotate_line(lines, at, registry, strings).unwrap_or_else(|| lines[at].as_ref().trim_end().to_string()))
        .collect()
}

fn annotate_line<S: AsRef<str>>(
    lines: &[S],
    at: usize,
    registry: &BuiltinRegistry,
    strings: Option<&[String]>,
) -> Option<String> {
    let line = lines[at].as_ref();
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("CALL") {
        return None;
    }
    let name = tokens.next()?;
    let sig = registry.lookup(name).filter(|s| s.has_params())?;

    let mut out = format!("{} args:", line.trim_end());
    for (i, param) in sig.params.iter().enumerate() {
        let value = at.checked_sub(i + 1).and_then(|p| push_value(lines[p].as_ref()));
        let text = match value {
            Some(v) => render_arg(param.kind, v, strings, at),
            None => {
                warn!("line {}: argument {} of {name} is not a PUSH", at + 1, param.name);
                "?".to_string()
            }
        };
        out.push_str(&format!(" {i}({}):{text}", param.name));
    }
    Some(out)
}

fn push_value(line: &str) -> Option<i64> {
    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some("PUSH"), Some(v)) => parse_hex(v),
        _ => None,
    }
}

fn render_arg(kind: ParamKind, v: i64, strings: Option<&[String]>, at: usize) -> String {
    match kind {
        ParamKind::Numeric => v.to_string(),
        ParamKind::RawString => {
            let found = usize::try_from(v).ok().and_then(|i| strings?.get(i));
            match found {
                Some(s) => s.clone(),
                None => {
                    if let Some(table) = strings {
                        warn!("line {}: string index {v} outside a table of {}", at + 1, table.len());
                    }
                    format!("<str:{v}>")
                }
            }
        }
        // language files are not loaded here
        ParamKind::LanguageStringId => format!("<strid:{v}>"),
    }
}
