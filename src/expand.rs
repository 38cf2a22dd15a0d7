// src/expand.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # Variable/Function Expander
//!
//! Expands `$NAME` and `${FN:arg1,arg2,...}` tokens in a command template
//! against an `Environment`. Variable substitution runs in one left-to-right
//! pass; function calls are then resolved innermost-first, with arguments
//! recursively expanded before the function runs. Unbound `$NAME` tokens are
//! left untouched on purpose -- there is no escape syntax, so substrings
//! like `$MFT` must survive when nothing binds `MFT`.

use std::collections::HashMap;

const MAX_FUNCTION_DEPTH: usize = 16;

#[derive(Debug)]
pub struct ExpandError(pub String);

impl std::fmt::Display for ExpandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "template expansion error: {}", self.0)
    }
}
impl std::error::Error for ExpandError {}

/// The variable scope for one dispatch. A thin wrapper over a map so call
/// sites can build it with the builder-ish `with` methods below instead of
/// repeating `.insert(...)` everywhere.
#[derive(Debug, Default, Clone)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

type BuiltinFn = fn(&[String]) -> Result<String, ExpandError>;

fn builtin_table() -> HashMap<&'static str, BuiltinFn> {
    let mut m: HashMap<&'static str, BuiltinFn> = HashMap::new();
    m.insert("PATH", fn_path);
    m.insert("REPLACE", fn_replace);
    m
}

#[cfg(windows)]
const HOST_SEPARATOR: char = '\\';
#[cfg(not(windows))]
const HOST_SEPARATOR: char = '/';

fn fn_path(args: &[String]) -> Result<String, ExpandError> {
    if args.len() != 1 {
        return Err(ExpandError(format!(
            "PATH expects 1 argument, got {}",
            args.len()
        )));
    }
    let other = if HOST_SEPARATOR == '\\' { '/' } else { '\\' };
    Ok(args[0].chars().map(|c| if c == other { HOST_SEPARATOR } else { c }).collect())
}

fn fn_replace(args: &[String]) -> Result<String, ExpandError> {
    if args.len() != 3 {
        return Err(ExpandError(format!(
            "REPLACE expects 3 arguments, got {}",
            args.len()
        )));
    }
    Ok(args[0].replace(args[1].as_str(), &args[2]))
}

/// Expands `template` against `env`. Performs variable substitution first,
/// then resolves function calls innermost-first.
pub fn expand(template: &str, env: &Environment) -> Result<String, ExpandError> {
    let after_vars = substitute_variables(template, env);
    resolve_functions(&after_vars, &builtin_table(), 0)
}

fn substitute_variables(template: &str, env: &Environment) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    // `$` (0x24) can never appear as a continuation byte of a multibyte
    // UTF-8 sequence, so scanning for it byte-by-byte never lands `i`
    // mid-codepoint; `literal_start` only ever gets sliced against such
    // boundaries, so copying non-token runs via `&str` slices (instead of
    // pushing individual bytes as `char`) keeps multibyte text intact.
    let mut i = 0;
    let mut literal_start = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_alphabetic() {
            out.push_str(&template[literal_start..i]);
            let start = i + 1;
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
            {
                end += 1;
            }
            let name = &template[start..end];
            if let Some(value) = env.get(name) {
                out.push_str(value);
            } else {
                // Unbound: pass the literal token through untouched.
                out.push('$');
                out.push_str(name);
            }
            i = end;
            literal_start = i;
        } else {
            i += 1;
        }
    }
    out.push_str(&template[literal_start..]);
    out
}

/// Resolves `${FN:arg1,arg2,...}` tokens, deepest nesting first. Because
/// `substitute_variables` already ran, `$NAME` tokens are gone by this
/// point; only function-call syntax and unbound `$NAME` passthroughs (which
/// never start a `${` group) remain.
fn resolve_functions(
    input: &str,
    table: &HashMap<&'static str, BuiltinFn>,
    depth: usize,
) -> Result<String, ExpandError> {
    if depth > MAX_FUNCTION_DEPTH {
        return Err(ExpandError(format!(
            "function nesting exceeds limit of {MAX_FUNCTION_DEPTH}"
        )));
    }

    // Find the innermost `${...}` group: the last `${` before its matching
    // `}` with no further `${` in between.
    let Some(start) = find_innermost_group(input) else {
        return Ok(input.to_string());
    };
    let open = start;
    let body_start = open + 2;
    let close = find_matching_close(input, body_start)
        .ok_or_else(|| ExpandError("unterminated ${...} group".to_string()))?;

    let body = &input[body_start..close];
    let (fn_name, args_raw) = body
        .split_once(':')
        .ok_or_else(|| ExpandError(format!("malformed function call \"{body}\"")))?;

    let args = split_top_level_commas(args_raw)
        .into_iter()
        .map(|a| resolve_functions(&a, table, depth + 1))
        .collect::<Result<Vec<_>, _>>()?;

    let func = table
        .get(fn_name)
        .ok_or_else(|| ExpandError(format!("unknown function \"{fn_name}\"")))?;
    let result = func(&args)?;

    let mut out = String::with_capacity(input.len());
    out.push_str(&input[..open]);
    out.push_str(&result);
    out.push_str(&input[close + 1..]);

    resolve_functions(&out, table, depth + 1)
}

/// Finds the start index of the innermost `${` group: the last `${` that
/// appears before the first unmatched `}` that closes it, i.e. a `${` with
/// no nested `${` inside its body.
fn find_innermost_group(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            starts.push(i);
        }
        i += 1;
    }
    // The innermost group is the one whose body contains no other `${`:
    // scan starts from the last one found, since `${` tokens nest left to
    // right in source order and the last-opened one without its own child
    // is nearest the leaves.
    for &s in starts.iter().rev() {
        let body_start = s + 2;
        if let Some(close) = find_matching_close(input, body_start) {
            let body = &input[body_start..close];
            if !body.contains("${") {
                return Some(s);
            }
        }
    }
    None
}

/// Given the index just after an opening `${`, finds the index of the
/// matching `}`, honoring `{`/`}` nesting within the body.
fn find_matching_close(input: &str, body_start: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut depth = 1usize;
    let mut i = body_start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Splits a function's argument list on commas that are not nested inside
/// a `{`/`}` group (so a nested `${FN:a,b}` argument isn't split apart).
fn split_top_level_commas(input: &str) -> Vec<String> {
    if input.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in input.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_bound_variable() {
        let env = Environment::new().with("FILE", "/out/mft");
        assert_eq!(expand("echo $FILE", &env).unwrap(), "echo /out/mft");
    }

    #[test]
    fn leaves_unbound_variable_literal() {
        let env = Environment::new();
        assert_eq!(expand("echo $MFT", &env).unwrap(), "echo $MFT");
    }

    #[test]
    fn preserves_multibyte_utf8_around_a_substitution() {
        let env = Environment::new().with("FILE", "/out/café/notes.ini");
        assert_eq!(
            expand("cat \"$FILE\" > café-résumé.log", &env).unwrap(),
            "cat \"/out/café/notes.ini\" > café-résumé.log"
        );
    }

    #[test]
    fn replace_function_simple() {
        let env = Environment::new();
        assert_eq!(expand("${REPLACE:abcabc,a,X}", &env).unwrap(), "XbcXbc");
    }

    #[test]
    fn path_function_converts_separators() {
        let env = Environment::new();
        let out = expand("${PATH:/a/b/c}", &env).unwrap();
        #[cfg(windows)]
        assert_eq!(out, "\\a\\b\\c");
        #[cfg(not(windows))]
        assert_eq!(out, "/a/b/c");
    }

    // Nested function call with three levels of `${...}` nesting, matching
    // the general shape used in the dispatcher's worked scenarios: innermost
    // REPLACE runs first, then PATH, then the outer REPLACE over the fully
    // resolved string. REPLACE is a plain literal-substring substitution, so
    // it also matches occurrences introduced by an inner replacement (e.g.
    // the "e" inside an inner "_test_" is a legitimate match for a later
    // REPLACE on "e") -- there is no provenance tracking between nesting
    // levels, only textual substitution.
    #[test]
    fn nested_expansion_three_levels() {
        let env = Environment::new().with("FILENAME", "x.bin");
        let template = "${REPLACE:${PATH:/${REPLACE:abcaaea,a,_test_}/def/ghi},e,[$FILENAME]}";
        let out = expand(template, &env).unwrap();
        let inner = "abcaaea".replace('a', "_test_");
        let after_path = format!("/{inner}/def/ghi");
        let expected = after_path.replace('e', "[x.bin]");
        assert_eq!(out, expected);
    }

    #[test]
    fn rejects_unknown_function() {
        let env = Environment::new();
        assert!(expand("${NOPE:1}", &env).is_err());
    }

    #[test]
    fn deterministic_round_trip() {
        let env = Environment::new().with("FILE", "/x").with("USERNAME", "bob");
        let template = "run $FILE as $USERNAME then $FILE";
        let a = expand(template, &env).unwrap();
        let b = expand(template, &env).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains("$FILE"));
        assert!(!a.contains("$USERNAME"));
    }
}
