/// Strips denylisted fragments from inbound strings.
///
/// Input is split on whitespace; every word that contains one of the
/// denylisted fragments (compared case-insensitively) is dropped and the
/// remaining words are joined with single spaces. With an empty denylist no
/// word is dropped, but whitespace is still collapsed.
///
/// This only keeps such fragments out of later diagnostic output. Storage
/// backends bind every value as a query parameter regardless.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    // Stored upper-cased.
    denylist: Vec<String>,
}

impl Normalizer {
    pub fn new<I, S>(denylist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let denylist = denylist
            .into_iter()
            .map(|fragment| fragment.as_ref().trim().to_uppercase())
            .filter(|fragment| !fragment.is_empty())
            .collect();

        Self { denylist }
    }

    pub fn is_empty(&self) -> bool {
        self.denylist.is_empty()
    }

    pub fn normalize(&self, input: &str) -> String {
        input
            .split_whitespace()
            .filter(|word| !self.is_denied(word))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn is_denied(&self, word: &str) -> bool {
        let word = word.to_uppercase();
        self.denylist
            .iter()
            .any(|fragment| word.contains(fragment.as_str()))
    }
}
