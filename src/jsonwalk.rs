//! Generic JSON tree traversal used by the PII and content-size evaluators.
//! Both scan the same shape of data — string leaves and array lengths — so
//! they share one recursive walker instead of each re-implementing descent
//! into objects and arrays.

use serde_json::Value;

/// A string leaf found while walking a JSON value, together with the path
/// segments that led to it (for diagnostics, not used for addressing).
pub struct StringLeaf<'a> {
    pub value: &'a str,
    pub path: Vec<String>,
}

/// Visit every string leaf in `value`, depth-first.
pub fn walk_strings<'a>(value: &'a Value, f: &mut dyn FnMut(StringLeaf<'a>)) {
    walk_strings_at(value, Vec::new(), f);
}

fn walk_strings_at<'a>(value: &'a Value, path: Vec<String>, f: &mut dyn FnMut(StringLeaf<'a>)) {
    match value {
        Value::String(s) => f(StringLeaf { value: s, path }),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let mut p = path.clone();
                p.push(i.to_string());
                walk_strings_at(item, p, f);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                let mut p = path.clone();
                p.push(k.clone());
                walk_strings_at(v, p, f);
            }
        }
        _ => {}
    }
}

/// Rewrite every string leaf in place using `f`, which returns the
/// replacement (unchanged if no match). Used by redact_with transforms.
pub fn map_strings(value: &mut Value, f: &mut dyn FnMut(&str) -> String) {
    match value {
        Value::String(s) => {
            let replaced = f(s);
            if replaced != *s {
                *s = replaced;
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                map_strings(item, f);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                map_strings(v, f);
            }
        }
        _ => {}
    }
}

/// Every array leaf in the tree, for the structured-data row-count check.
pub fn walk_arrays<'a>(value: &'a Value, f: &mut dyn FnMut(&'a [Value])) {
    match value {
        Value::Array(items) => {
            f(items);
            for item in items {
                walk_arrays(item, f);
            }
        }
        Value::Object(map) => {
            for (_, v) in map {
                walk_arrays(v, f);
            }
        }
        _ => {}
    }
}

/// Whether a string leaf looks like source code: triple-backtick fenced.
pub fn looks_like_fenced_code(s: &str) -> bool {
    s.contains("```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walk_strings_visits_nested_leaves() {
        let v = json!({"a": "x", "b": {"c": ["y", "z"]}});
        let mut seen = Vec::new();
        walk_strings(&v, &mut |leaf| seen.push(leaf.value.to_string()));
        seen.sort();
        assert_eq!(seen, vec!["x", "y", "z"]);
    }

    #[test]
    fn map_strings_rewrites_leaves() {
        let mut v = json!({"a": "hello", "b": ["world"]});
        map_strings(&mut v, &mut |s| s.to_uppercase());
        assert_eq!(v["a"], "HELLO");
        assert_eq!(v["b"][0], "WORLD");
    }

    #[test]
    fn walk_arrays_visits_every_array_including_nested() {
        let v = json!({"rows": [[1,2],[3,4]], "other": [1,2,3]});
        let mut lens = Vec::new();
        walk_arrays(&v, &mut |a| lens.push(a.len()));
        lens.sort();
        assert_eq!(lens, vec![2, 2, 2, 3]);
    }
}
