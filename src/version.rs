use std::cmp::Ordering;

/// A release identifier as published in manifests and used for version folder names.
#[derive(Debug, Clone)]
struct ReleaseVersion<'a> {
    numbers: Vec<u64>,
    /// Text after `-`, e.g. `beta.2`; a release without one ranks above any pre-release.
    pre_release: Option<&'a str>,
}

impl<'a> ReleaseVersion<'a> {
    /// `None` unless the core is dotted numbers (`v` prefix and `+build` suffix allowed).
    fn parse(text: &'a str) -> Option<Self> {
        let text = text.trim().trim_start_matches(['v', 'V']);
        let text = text.split_once('+').map_or(text, |(core, _build)| core);
        let (core, pre_release) = match text.split_once('-') {
            Some((core, pre)) => (core, Some(pre).filter(|p| !p.is_empty())),
            None => (text, None),
        };
        let numbers = core
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self { numbers, pre_release })
    }

    fn number(&self, index: usize) -> u64 {
        self.numbers.get(index).copied().unwrap_or(0)
    }
}

impl Ord for ReleaseVersion<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        (0..len)
            .map(|i| self.number(i).cmp(&other.number(i)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| match (self.pre_release, other.pre_release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()),
            })
    }
}

impl PartialEq for ReleaseVersion<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for ReleaseVersion<'_> {}

impl PartialOrd for ReleaseVersion<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Order two version strings. Dotted numeric versions compare numerically with missing
/// parts as zero; anything unparsable sorts before them, by case-insensitive text.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (ReleaseVersion::parse(a), ReleaseVersion::parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.trim().to_lowercase().cmp(&b.trim().to_lowercase()),
    }
}

/// True when `candidate` is strictly newer than `installed`.
pub fn is_newer(candidate: &str, installed: &str) -> bool {
    compare_versions(candidate, installed) == Ordering::Greater
}
