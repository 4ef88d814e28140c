//! Cross-device propagation of detections.
//!
//! Physically co-located units share a detection outcome: a trigger seen on a
//! source device is also recorded against each of its mirrors.

use std::collections::BTreeMap;

/// Mapping from a source device to the devices that mirror its triggers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorMap {
    links: BTreeMap<String, Vec<String>>,
}

impl MirrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `mirror` as a target for triggers detected on `source`.
    ///
    /// Self links and repeated links are ignored.
    pub fn link(&mut self, source: impl Into<String>, mirror: impl Into<String>) {
        let source = source.into();
        let mirror = mirror.into();
        if source == mirror {
            return;
        }
        let mirrors = self.links.entry(source).or_default();
        if !mirrors.contains(&mirror) {
            mirrors.push(mirror);
        }
    }

    pub fn mirrors_of(&self, source: &str) -> &[String] {
        self.links.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Devices a detection on `source` is recorded against, the source first.
    pub fn targets<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        std::iter::once(source).chain(self.mirrors_of(source).iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Links ordered by source device.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.links
            .iter()
            .map(|(source, mirrors)| (source.as_str(), mirrors.as_slice()))
    }
}

impl<S, M> FromIterator<(S, M)> for MirrorMap
where
    S: Into<String>,
    M: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (S, M)>>(iter: I) -> Self {
        let mut map = MirrorMap::new();
        for (source, mirror) in iter {
            map.link(source, mirror);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_device_targets_only_itself() {
        let map = MirrorMap::from_iter([("Device-01", "Device-03")]);
        assert_eq!(map.targets("Device-02").collect::<Vec<_>>(), vec!["Device-02"]);
    }

    #[test]
    fn mapped_device_targets_source_then_mirrors() {
        let map = MirrorMap::from_iter([
            ("Device-01", "Device-03"),
            ("Device-01", "Device-04"),
            ("Device-01", "Device-03"),
        ]);
        assert_eq!(
            map.targets("Device-01").collect::<Vec<_>>(),
            vec!["Device-01", "Device-03", "Device-04"]
        );
    }

    #[test]
    fn self_links_are_ignored() {
        let map = MirrorMap::from_iter([("Device-01", "Device-01")]);
        assert!(map.is_empty());
        assert_eq!(map.targets("Device-01").count(), 1);
    }

    #[test]
    fn propagation_is_not_transitive() {
        let map = MirrorMap::from_iter([("Device-01", "Device-03"), ("Device-03", "Device-05")]);
        assert_eq!(
            map.targets("Device-01").collect::<Vec<_>>(),
            vec!["Device-01", "Device-03"]
        );
    }

    #[test]
    fn links_iterate_in_source_order() {
        let map = MirrorMap::from_iter([
            ("Device-05", "Device-06"),
            ("Device-01", "Device-03"),
            ("Device-01", "Device-04"),
        ]);
        let links: Vec<(&str, Vec<&str>)> = map
            .iter()
            .map(|(source, mirrors)| (source, mirrors.iter().map(String::as_str).collect()))
            .collect();
        assert_eq!(
            links,
            vec![
                ("Device-01", vec!["Device-03", "Device-04"]),
                ("Device-05", vec!["Device-06"]),
            ]
        );
    }
}
