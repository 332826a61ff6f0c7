//! Canonical signatures and duplicate detection within one run.

use std::collections::HashMap;
use std::fmt;

use unicode_normalization::UnicodeNormalization;

use crate::identifiers::{extract_doi, extract_url};
use crate::query::{collapse_whitespace, derive_title};
use crate::ReferenceRecord;

/// Identity of a reference for duplicate lookup.
///
/// Priority is DOI, then URL, then the derived title, then the whole text.
/// Two references are the same only when their signatures are equal after
/// normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signature {
    Doi(String),
    Url(String),
    Title(String),
    RawNormalized(String),
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Doi(doi) => write!(f, "doi:{}", doi),
            Signature::Url(url) => write!(f, "url:{}", url),
            Signature::Title(title) => write!(f, "title:{}", title),
            Signature::RawNormalized(text) => write!(f, "text:{}", text),
        }
    }
}

/// NFKC, lowercase, whitespace collapsed.
fn normalize_text(s: &str) -> String {
    let folded: String = s.nfkc().collect::<String>().to_lowercase();
    collapse_whitespace(&folded)
}

impl Signature {
    pub fn of(record: &ReferenceRecord) -> Self {
        let text = &record.stripped_text;

        if let Some(doi) = extract_doi(text) {
            return Signature::Doi(doi.to_lowercase());
        }
        if let Some(url) = extract_url(text) {
            return Signature::Url(url.trim_end_matches('/').to_string());
        }
        if let Some(title) = derive_title(&collapse_whitespace(text)) {
            let title = normalize_text(&title);
            let title = title.trim_end_matches(['.', ',', ';', ':']);
            return Signature::Title(title.to_string());
        }
        Signature::RawNormalized(normalize_text(text))
    }
}

/// Signatures for every record plus the "duplicate of" mapping.
///
/// Records are never removed; a repeat only gains `duplicate_of = Some(first)`.
#[derive(Debug, Clone, Default)]
pub struct DedupPlan {
    /// One signature per record, same order as the input.
    pub signatures: Vec<Signature>,
    /// `duplicate_of[i]` is the 1-based index of the first record sharing
    /// record `i + 1`'s signature.
    pub duplicate_of: Vec<Option<usize>>,
}

impl DedupPlan {
    pub fn build(records: &[ReferenceRecord]) -> Self {
        let mut first_seen: HashMap<Signature, usize> = HashMap::new();
        let mut signatures = Vec::with_capacity(records.len());
        let mut duplicate_of = Vec::with_capacity(records.len());

        for record in records {
            let sig = Signature::of(record);
            match first_seen.get(&sig) {
                Some(&first) => {
                    tracing::debug!(index = record.index, of = first, signature = %sig, "duplicate reference");
                    duplicate_of.push(Some(first));
                }
                None => {
                    first_seen.insert(sig.clone(), record.index);
                    duplicate_of.push(None);
                }
            }
            signatures.push(sig);
        }

        Self {
            signatures,
            duplicate_of,
        }
    }

    /// Original index for a 1-based reference index, if it is a duplicate.
    pub fn original_of(&self, index: usize) -> Option<usize> {
        index
            .checked_sub(1)
            .and_then(|i| self.duplicate_of.get(i).copied().flatten())
    }

    pub fn unique_count(&self) -> usize {
        self.duplicate_of.iter().filter(|d| d.is_none()).count()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicate_of.len() - self.unique_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_references;

    fn record(index: usize, text: &str) -> ReferenceRecord {
        ReferenceRecord {
            index,
            raw_text: text.to_string(),
            stripped_text: text.to_string(),
        }
    }

    #[test]
    fn doi_signature_from_scenario_text() {
        let refs =
            parse_references("[1] Smith J. Title One. J Sci. 2020;12:1-5. https://doi.org/10.1/abc");
        assert_eq!(Signature::of(&refs[0]).to_string(), "doi:10.1/abc");
    }

    #[test]
    fn same_doi_different_text_is_duplicate() {
        let records = vec![
            record(1, "Smith J. Title One. J Sci. 2020. https://doi.org/10.1/ABC"),
            record(2, "J. Smith, \"Title one\", Journal of Science, 2020, doi:10.1/abc."),
        ];
        let plan = DedupPlan::build(&records);
        assert_eq!(plan.signatures[0], plan.signatures[1]);
        assert_eq!(plan.duplicate_of, vec![None, Some(1)]);
        assert_eq!(plan.original_of(2), Some(1));
        assert_eq!(plan.unique_count(), 1);
        assert_eq!(plan.duplicate_count(), 1);
    }

    #[test]
    fn url_signature_ignores_trailing_slash() {
        let a = Signature::of(&record(1, "Report. https://example.org/report/"));
        let b = Signature::of(&record(2, "Report (copy). https://example.org/report"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "url:https://example.org/report");
    }

    #[test]
    fn title_signature_is_case_and_width_insensitive() {
        let a = Signature::of(&record(1, "Smith J. Deep Learning  For Widgets. Proc A. 2019."));
        let b = Signature::of(&record(2, "Doe K. deep learning for ｗidgets. Other venue. 2021."));
        assert_eq!(a, Signature::Title("deep learning for widgets".into()));
        assert_eq!(a, b);
    }

    #[test]
    fn raw_text_fallback() {
        let sig = Signature::of(&record(1, "Some   Unparseable, Thing"));
        assert_eq!(sig.to_string(), "text:some unparseable, thing");
    }

    #[test]
    fn first_seen_wins_for_later_repeats() {
        let records = vec![
            record(1, "doi:10.2/x"),
            record(2, "doi:10.3/y"),
            record(3, "doi:10.2/x"),
            record(4, "doi:10.2/X"),
        ];
        let plan = DedupPlan::build(&records);
        assert_eq!(plan.duplicate_of, vec![None, None, Some(1), Some(1)]);
    }
}
