//! Splits raw text into ordered, language-homogeneous segments.

use crate::classifier::WordClassifier;
use crate::{Language, Segment};

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split text into sentence-like units.
///
/// A unit ends after a run of `.`, `!` or `?` and any whitespace following
/// it; the punctuation stays attached to the unit it closes. Units that are
/// blank are skipped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !is_terminal(c) {
            continue;
        }
        while chars.next_if(|&(_, next)| is_terminal(next)).is_some() {}
        while chars.next_if(|&(_, next)| next.is_whitespace()).is_some() {}

        let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
        let unit = &text[start..end];
        if !unit.trim().is_empty() {
            units.push(unit);
        }
        start = end;
    }

    let tail = &text[start..];
    if !tail.trim().is_empty() {
        units.push(tail);
    }
    units
}

/// Segment `text` into language runs using `classifier` for every word.
///
/// Consecutive words with the same language inside one sentence unit are
/// joined with single spaces. Words without any letters or digits inherit the
/// language of the run they sit in. Whitespace-only input, and units made only
/// of punctuation, produce no segments.
pub fn segment_text(text: &str, classifier: &mut WordClassifier) -> Vec<Segment> {
    let mut segments = Vec::new();

    for unit in split_sentences(text) {
        let mut current: Option<(Language, Vec<&str>)> = None;
        // Punctuation-only words seen before the unit's first classified word
        let mut leading: Vec<&str> = Vec::new();

        for word in unit.split_whitespace() {
            let Some(label) = classifier.classify(word) else {
                match current.as_mut() {
                    Some((_, words)) => words.push(word),
                    None => leading.push(word),
                }
                continue;
            };
            let language = label.language();

            match current.as_mut() {
                Some((lang, words)) if *lang == language => words.push(word),
                Some(_) => {
                    if let Some((lang, words)) = current.take() {
                        push_segment(&mut segments, lang, &words);
                    }
                    current = Some((language, vec![word]));
                }
                None => {
                    let mut words = std::mem::take(&mut leading);
                    words.push(word);
                    current = Some((language, words));
                }
            }
        }

        if let Some((lang, words)) = current {
            push_segment(&mut segments, lang, &words);
        }
    }

    segments
}

fn push_segment(segments: &mut Vec<Segment>, language: Language, words: &[&str]) {
    let order = segments.len();
    segments.push(Segment {
        text: words.join(" "),
        language,
        order,
    });
}
