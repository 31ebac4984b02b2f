use pixelwar_shared::store::{SERVER_TIMESTAMP, SERVER_VALUE_KEY, StorePath};
use serde_json::{Map, Value};

/// In-memory JSON tree. Empty objects and `null` leaves never persist, so a
/// path reads as `null` exactly when nothing is stored under it.
#[derive(Debug, Default)]
pub struct StoreTree {
    root: Value,
}

impl StoreTree {
    pub fn new() -> Self {
        Self { root: Value::Null }
    }

    pub fn get(&self, path: &StorePath) -> Value {
        let mut node = &self.root;
        for segment in path.segments() {
            match node.get(segment) {
                Some(child) => node = child,
                None => return Value::Null,
            }
        }
        node.clone()
    }

    /// Replace the subtree at `path`. Server-value placeholders are resolved
    /// to `now_ms`. Returns true when the stored value changed.
    pub fn set(&mut self, path: &StorePath, value: Value, now_ms: i64) -> bool {
        let value = normalize(resolve_server_values(value, now_ms));
        if value.is_null() {
            return self.remove(path);
        }
        if self.get(path) == value {
            return false;
        }

        let mut node = &mut self.root;
        for segment in path.segments() {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                return false;
            };
            node = map.entry(segment.clone()).or_insert(Value::Null);
        }
        *node = value;
        true
    }

    /// Remove the subtree at `path` and prune emptied ancestors.
    pub fn remove(&mut self, path: &StorePath) -> bool {
        let removed = remove_at(&mut self.root, path.segments());
        if removed && self.root.as_object().is_some_and(Map::is_empty) {
            self.root = Value::Null;
        }
        removed
    }
}

fn remove_at(node: &mut Value, segments: &[String]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        let removed = !node.is_null();
        *node = Value::Null;
        return removed;
    };
    let Value::Object(map) = node else {
        return false;
    };
    if rest.is_empty() {
        return map.remove(first).is_some();
    }
    let Some(child) = map.get_mut(first) else {
        return false;
    };
    let removed = remove_at(child, rest);
    if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
        map.remove(first);
    }
    removed
}

fn is_server_timestamp(map: &Map<String, Value>) -> bool {
    map.len() == 1
        && map
            .get(SERVER_VALUE_KEY)
            .and_then(Value::as_str)
            .is_some_and(|v| v == SERVER_TIMESTAMP)
}

/// Replace every `{".sv": "timestamp"}` with `now_ms`.
pub fn resolve_server_values(value: Value, now_ms: i64) -> Value {
    match value {
        Value::Object(map) if is_server_timestamp(&map) => Value::from(now_ms),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, resolve_server_values(v, now_ms)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| resolve_server_values(v, now_ms))
                .collect(),
        ),
        other => other,
    }
}

/// Drop `null` members and objects left empty by that, recursively.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).expect("valid test path")
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut tree = StoreTree::new();
        assert!(tree.set(&path("cityPlayers/Ankara/c1"), json!(true), 0));
        assert_eq!(tree.get(&path("cityPlayers")), json!({"Ankara": {"c1": true}}));
        assert_eq!(tree.get(&path("cityPlayers/Izmir")), Value::Null);
        assert!(!tree.set(&path("cityPlayers/Ankara/c1"), json!(true), 0));
    }

    #[test]
    fn server_timestamps_are_resolved() {
        let mut tree = StoreTree::new();
        tree.set(
            &path("pixels/1-2"),
            json!({"color": "#e6194b", "serverTimestamp": {".sv": "timestamp"}}),
            1234,
        );
        assert_eq!(
            tree.get(&path("pixels/1-2/serverTimestamp")),
            json!(1234)
        );
        assert_eq!(tree.get(&path("pixels/1-2/color")), json!("#e6194b"));
    }

    #[test]
    fn removing_the_last_child_prunes_ancestors() {
        let mut tree = StoreTree::new();
        tree.set(&path("cityPlayers/Ankara/c1"), json!(true), 0);
        tree.set(&path("pixels/0-0"), json!({"color": "#000000"}), 0);

        assert!(tree.remove(&path("cityPlayers/Ankara/c1")));
        assert_eq!(tree.get(&path("cityPlayers")), Value::Null);
        assert_eq!(tree.get(&StorePath::root()), json!({"pixels": {"0-0": {"color": "#000000"}}}));

        assert!(!tree.remove(&path("cityPlayers/Ankara/c1")));
        assert!(tree.remove(&path("pixels")));
        assert_eq!(tree.get(&StorePath::root()), Value::Null);
    }

    #[test]
    fn writing_null_or_empty_objects_removes() {
        let mut tree = StoreTree::new();
        tree.set(&path("paintTimes/u1"), json!(10), 0);
        assert!(tree.set(&path("paintTimes/u1"), Value::Null, 0));
        assert_eq!(tree.get(&path("paintTimes")), Value::Null);

        assert!(!tree.set(&path("a/b"), json!({"c": {}, "d": null}), 0));
        assert_eq!(tree.get(&StorePath::root()), Value::Null);
    }

    #[test]
    fn writing_below_a_leaf_replaces_it() {
        let mut tree = StoreTree::new();
        tree.set(&path("a"), json!(5), 0);
        tree.set(&path("a/b"), json!(6), 0);
        assert_eq!(tree.get(&path("a")), json!({"b": 6}));
    }
}
