//! Dotted/indexed JSON path resolution and creation.
//!
//! The grammar is dotted keys with zero-based `[n]` array indices:
//! `contacts[0].profile.name`. Resolution never fails; a missing segment or
//! out-of-bounds index yields `None`.

use serde_json::Value;

/// One segment of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object key.
    Key(String),
    /// Zero-based array index.
    Index(usize),
}

/// Parse a path string into segments. Returns `None` for paths the grammar
/// cannot express (empty path, unbalanced brackets, non-numeric index).
pub fn parse(path: &str) -> Option<Vec<Segment>> {
    if path.is_empty() {
        return None;
    }
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        let mut rest = part;
        // Leading key, then any number of [n] suffixes.
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_owned()));
            }
            rest = &rest[bracket..];
            while !rest.is_empty() {
                if !rest.starts_with('[') {
                    return None;
                }
                let close = rest.find(']')?;
                let index: usize = rest[1..close].parse().ok()?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
            }
        } else {
            segments.push(Segment::Key(rest.to_owned()));
        }
    }
    Some(segments)
}

/// Resolve a path against a value. `None` means absent.
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse(path)?;
    let mut current = value;
    for segment in &segments {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}

/// Write `new_value` into `target` at `path`, creating intermediate objects
/// as needed. Writing through an existing scalar overwrites it with an
/// object. Index segments are not creatable and abort the write.
///
/// Returns `false` when the path could not be written.
pub fn write(target: &mut Value, path: &str, new_value: Value) -> bool {
    let Some(segments) = parse(path) else {
        return false;
    };
    let mut current = target;
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        match segment {
            Segment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(serde_json::Map::new());
                }
                let map = current.as_object_mut().expect("just ensured object");
                if last {
                    map.insert(key.clone(), new_value);
                    return true;
                }
                current = map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
            }
            Segment::Index(index) => {
                // Only pre-existing array slots are writable.
                let Some(slot) = current.as_array_mut().and_then(|a| a.get_mut(*index)) else {
                    return false;
                };
                if last {
                    *slot = new_value;
                    return true;
                }
                current = slot;
            }
        }
    }
    false
}

/// Render a resolved value the way template substitution and condition
/// comparison see it: strings verbatim, null as empty, everything else as
/// compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
