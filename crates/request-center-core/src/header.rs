use serde::{Deserialize, Serialize};

/// Case-insensitive, order-preserving header container shared by the
/// request and response sides of a [`crate::record::RequestRecord`].
///
/// Lookup is case-insensitive; `set` replaces the value of an existing
/// entry in place (so iteration order is untouched) or appends a new one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderPipe(Vec<(String, String)>);

impl HeaderPipe {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// First value matching `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first entry matching `name`, or append a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            entry.1 = value.into();
        } else {
            self.0.push((name, value.into()));
        }
    }

    /// Remove every entry matching `name`.
    pub fn delete(&mut self, name: &str) {
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, String)> for HeaderPipe {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut pipe = Self::new();
        for (k, v) in iter {
            pipe.set(k, v);
        }
        pipe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_round_trip() {
        let mut h = HeaderPipe::new();
        h.set("Content-Type", "application/json");
        assert_eq!(h.get("content-type"), Some("application/json"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn set_replaces_without_reordering() {
        let mut h = HeaderPipe::new();
        h.set("a", "1");
        h.set("b", "2");
        h.set("a", "3");
        let entries: Vec<_> = h.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn delete_then_set_yields_new_value() {
        let mut h = HeaderPipe::new();
        h.set("x-trace", "old");
        h.delete("X-Trace");
        assert_eq!(h.get("x-trace"), None);
        h.set("x-trace", "new");
        assert_eq!(h.get("x-trace"), Some("new"));
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut h = HeaderPipe::new();
        h.set("z", "1");
        h.set("a", "2");
        h.set("m", "3");
        let names: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }
}
