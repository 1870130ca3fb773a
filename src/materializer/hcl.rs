//! Small, purpose-built HCL formatting — not a general HCL AST, just
//! enough to emit `module`/`provider` blocks and typed argument values.
//! Modeled as plain formatting functions over `serde_yaml::Value`, the
//! same way the retrieval pack's closest Terraform-adjacent examples
//! treat HCL as typed data rather than reaching for a parser crate.

use std::fmt::Write as _;

/// A bare identifier or dotted traversal (`module.vpc.id`, `var.prefix`)
/// is emitted unquoted so a template-substituted reference composes into
/// a real HCL expression rather than a string literal.
fn looks_like_hcl_expression(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if s == "true" || s == "false" || s == "null" {
        return true;
    }
    if s.parse::<f64>().is_ok() {
        return true;
    }
    let mut chars = s.chars();
    let Some(first) = chars.next() else { return false };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']' | '-'))
}

pub fn value(v: &serde_yaml::Value) -> String {
    match v {
        serde_yaml::Value::Null => "null".to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => {
            if looks_like_hcl_expression(s) {
                s.clone()
            } else {
                quote(s)
            }
        }
        serde_yaml::Value::Sequence(items) => {
            let rendered: Vec<String> = items.iter().map(value).collect();
            format!("[{}]", rendered.join(", "))
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = String::from("{\n");
            for (k, v) in map {
                let key = k.as_str().unwrap_or_default();
                writeln!(out, "    {key} = {}", value(v)).ok();
            }
            out.push_str("  }");
            out
        }
        serde_yaml::Value::Tagged(t) => value(&t.value),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Renders a `kind "label" { ...assignments... }` block from a mapping of
/// attribute name to value.
pub fn block(kind: &str, label: Option<&str>, attrs: &serde_yaml::Mapping) -> String {
    let mut out = String::new();
    match label {
        Some(label) => writeln!(out, "{kind} \"{label}\" {{").ok(),
        None => writeln!(out, "{kind} {{").ok(),
    };
    for (k, v) in attrs {
        let key = k.as_str().unwrap_or_default();
        writeln!(out, "  {key} = {}", value(v)).ok();
    }
    out.push_str("}\n");
    out
}
