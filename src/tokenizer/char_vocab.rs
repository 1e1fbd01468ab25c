use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{FALLBACK_ID, TokenId};
use crate::error::{CharRnnError, Result};

/// Bidirectional mapping between characters and dense ids `0..len()`.
///
/// Characters outside the vocabulary encode to [`FALLBACK_ID`] instead of
/// failing, so noisy input degrades into a wildcard class rather than halting
/// training or sampling. Decoding an id outside the vocabulary is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharVocab {
    id_to_char: Vec<char>,
    char_to_id: HashMap<char, TokenId>,
}

#[derive(Serialize, Deserialize)]
struct VocabFile {
    chars: Vec<char>,
}

impl CharVocab {
    /// Build a vocabulary from characters in id order; repeated characters keep
    /// their first id.
    pub fn from_chars<I>(chars: I) -> Result<Self>
    where
        I: IntoIterator<Item = char>,
    {
        let mut id_to_char = Vec::new();
        let mut char_to_id = HashMap::new();
        for ch in chars {
            if char_to_id.contains_key(&ch) {
                continue;
            }
            char_to_id.insert(ch, id_to_char.len() as TokenId);
            id_to_char.push(ch);
        }

        if id_to_char.is_empty() {
            return Err(CharRnnError::EmptyVocabulary);
        }

        Ok(Self {
            id_to_char,
            char_to_id,
        })
    }

    /// Collect every character observed in `texts`, assigning ids in sorted
    /// character order so the same corpus always yields the same vocabulary.
    pub fn fit<'a, I>(texts: I) -> Result<Self>
    where
        I: Iterator<Item = &'a str>,
    {
        let observed: BTreeSet<char> = texts.flat_map(str::chars).collect();
        let vocab = Self::from_chars(observed)?;
        debug!(vocab_size = vocab.len(), "fitted character vocabulary");
        Ok(vocab)
    }

    pub fn len(&self) -> usize {
        self.id_to_char.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_char.is_empty()
    }

    pub fn chars(&self) -> &[char] {
        &self.id_to_char
    }

    pub fn contains(&self, ch: char) -> bool {
        self.char_to_id.contains_key(&ch)
    }

    pub fn lookup(&self, ch: char) -> Option<TokenId> {
        self.char_to_id.get(&ch).copied()
    }

    /// Map `ch` to its id, substituting [`FALLBACK_ID`] for unknown characters.
    pub fn lookup_or_default(&self, ch: char) -> TokenId {
        self.lookup(ch).unwrap_or(FALLBACK_ID)
    }

    /// Like [`lookup_or_default`](Self::lookup_or_default), but reports the
    /// substitution.
    pub fn char_to_id(&self, ch: char) -> TokenId {
        match self.lookup(ch) {
            Some(id) => id,
            None => {
                warn!(character = ?ch, "unexpected character, using fallback id {FALLBACK_ID}");
                FALLBACK_ID
            }
        }
    }

    pub fn id_to_char(&self, id: TokenId) -> Result<char> {
        self.id_to_char
            .get(id as usize)
            .copied()
            .ok_or(CharRnnError::InvalidId {
                id,
                vocab_size: self.len(),
            })
    }

    /// Encode `text`, logging one warning per distinct unknown character.
    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        let mut unknown: BTreeMap<char, usize> = BTreeMap::new();
        let ids = text
            .chars()
            .map(|ch| match self.lookup(ch) {
                Some(id) => id,
                None => {
                    *unknown.entry(ch).or_default() += 1;
                    FALLBACK_ID
                }
            })
            .collect();

        for (ch, count) in unknown {
            warn!(
                character = ?ch,
                occurrences = count,
                "unexpected character, using fallback id {FALLBACK_ID}"
            );
        }

        ids
    }

    pub fn decode(&self, ids: &[TokenId]) -> Result<String> {
        ids.iter().map(|&id| self.id_to_char(id)).collect()
    }

    /// Reject `text` if it contains any character the vocabulary cannot
    /// represent exactly.
    pub fn validate_corpus(&self, text: &str) -> Result<()> {
        match text.chars().find(|ch| !self.contains(*ch)) {
            Some(ch) => Err(CharRnnError::UnknownCharacter(ch)),
            None => Ok(()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = VocabFile {
            chars: self.id_to_char.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        debug!(path = %path.display(), "saved character vocabulary");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let file: VocabFile = serde_json::from_str(&contents)?;
        let vocab = Self::from_chars(file.chars)?;
        debug!(path = %path.display(), vocab_size = vocab.len(), "loaded character vocabulary");
        Ok(vocab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fit_assigns_dense_sorted_ids() {
        let vocab = CharVocab::fit(["hello", "world"].into_iter()).expect("fit");
        assert_eq!(vocab.chars(), &['d', 'e', 'h', 'l', 'o', 'r', 'w']);
        for (idx, &ch) in vocab.chars().iter().enumerate() {
            assert_eq!(vocab.lookup(ch), Some(idx as TokenId));
        }
    }

    #[test]
    fn every_known_char_round_trips() {
        let text = "To be, or not to be: that is the question.\n";
        let vocab = CharVocab::fit(std::iter::once(text)).expect("fit");
        for ch in text.chars() {
            let id = vocab.char_to_id(ch);
            assert_eq!(vocab.id_to_char(id).expect("decode"), ch);
        }
    }

    #[test]
    fn unknown_char_maps_to_fallback() {
        let vocab = CharVocab::fit(std::iter::once("xyz")).expect("fit");
        assert_eq!(vocab.char_to_id('Q'), FALLBACK_ID);
        assert_eq!(vocab.lookup_or_default('Q'), FALLBACK_ID);
        assert_eq!(vocab.lookup('Q'), None);
        assert_eq!(vocab.encode("xQz"), vec![0, 0, 2]);
    }

    #[test]
    fn out_of_range_id_is_rejected() {
        let vocab = CharVocab::fit(std::iter::once("ab")).expect("fit");
        let err = vocab.id_to_char(2).unwrap_err();
        assert!(matches!(
            err,
            CharRnnError::InvalidId {
                id: 2,
                vocab_size: 2
            }
        ));
        assert!(vocab.decode(&[0, 1, 7]).is_err());
    }

    #[test]
    fn empty_vocabulary_is_rejected() {
        assert!(matches!(
            CharVocab::fit(std::iter::once("")),
            Err(CharRnnError::EmptyVocabulary)
        ));
    }

    #[test]
    fn from_chars_keeps_first_occurrence() {
        let vocab = CharVocab::from_chars("abca".chars()).expect("vocab");
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.lookup('a'), Some(0));
        assert_eq!(vocab.lookup('c'), Some(2));
    }

    #[test]
    fn validate_corpus_reports_first_missing_char() {
        let vocab = CharVocab::fit(std::iter::once("abc")).expect("fit");
        assert!(vocab.validate_corpus("cab").is_ok());
        assert!(matches!(
            vocab.validate_corpus("abz!"),
            Err(CharRnnError::UnknownCharacter('z'))
        ));
    }

    #[test]
    fn save_and_load_preserve_ids() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("vocab.json");
        let vocab = CharVocab::fit(std::iter::once("the \"quick\"\nfox")).expect("fit");
        vocab.save(&path).expect("save");
        let loaded = CharVocab::load(&path).expect("load");
        assert_eq!(loaded, vocab);
    }
}
