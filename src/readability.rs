//! Flesch reading-ease and Flesch-Kincaid grade over plain text.

use std::time::{Duration, Instant};

/// Abbreviations whose trailing period never ends a sentence.
const TITLES: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "capt", "gen", "lt", "col", "sgt", "rev",
    "hon",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingEase {
    pub sentence_count: u64,
    pub word_count: u64,
    pub syllable_count: u64,
    pub ease: f64,
    pub grade: f64,
}

impl ReadingEase {
    pub fn from_counts(sentence_count: u64, word_count: u64, syllable_count: u64) -> Option<Self> {
        if word_count == 0 {
            return None;
        }
        let sentences = sentence_count.max(1) as f64;
        let words = word_count as f64;
        let syllables = syllable_count as f64;

        let words_per_sentence = words / sentences;
        let syllables_per_word = syllables / words;
        Some(Self {
            sentence_count: sentence_count.max(1),
            word_count,
            syllable_count,
            ease: 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word,
            grade: 0.39 * words_per_sentence + 11.8 * syllables_per_word - 15.59,
        })
    }

    /// Rough label matching the usual Flesch bands.
    pub fn difficulty(&self) -> &'static str {
        match self.ease {
            e if e >= 90.0 => "Very easy",
            e if e >= 80.0 => "Easy",
            e if e >= 70.0 => "Fairly easy",
            e if e >= 60.0 => "Standard",
            e if e >= 50.0 => "Fairly difficult",
            e if e >= 30.0 => "Difficult",
            _ => "Very difficult",
        }
    }
}

/// Scores `text`, yielding to the runtime whenever `wakeup` has elapsed since
/// the last yield and reporting the fraction processed right after.
pub async fn estimate(
    text: &str,
    wakeup: Duration,
    mut on_progress: impl FnMut(f64),
) -> Option<ReadingEase> {
    if !text.chars().any(char::is_alphabetic) {
        return None;
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let total = tokens.len();
    let mut last_yield = Instant::now();

    let mut sentences = 0u64;
    let mut words = 0u64;
    let mut syllables = 0u64;
    let mut open_sentence = false;

    for (idx, raw) in tokens.iter().enumerate() {
        let word = strip_punctuation(raw);
        if word.chars().any(char::is_alphabetic) {
            words += 1;
            syllables += count_syllables(word);
            open_sentence = true;
        }

        let next = tokens.get(idx + 1).copied();
        if open_sentence && ends_sentence(raw, next) {
            sentences += 1;
            open_sentence = false;
        }

        if last_yield.elapsed() >= wakeup {
            tokio::task::yield_now().await;
            last_yield = Instant::now();
            on_progress((idx + 1) as f64 / total as f64);
        }
    }
    if open_sentence {
        sentences += 1;
    }
    on_progress(1.0);

    ReadingEase::from_counts(sentences, words, syllables)
}

fn strip_punctuation(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric())
}

fn ends_sentence(token: &str, next: Option<&str>) -> bool {
    let trimmed = token.trim_end_matches(['"', '\'', '\u{201d}', '\u{2019}', ')']);
    if !trimmed.ends_with(['.', '!', '?']) {
        return false;
    }

    let bare = strip_punctuation(trimmed).to_lowercase();
    if trimmed.ends_with('.') && TITLES.contains(&bare.as_str()) {
        return false;
    }

    match next {
        None => true,
        Some(next) => next
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase() || matches!(c, '"' | '\'' | '\u{201c}' | '\u{2018}')),
    }
}

/// Vowel-group count with the common silent-`e` and `-le` corrections.
pub fn count_syllables(word: &str) -> u64 {
    let word: String = word
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if word.is_empty() {
        return 0;
    }
    if word.len() <= 3 {
        return 1;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0u64;
    let mut prev_vowel = false;
    for c in word.chars() {
        let vowel = is_vowel(c);
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }

    if word.ends_with('e') && !word.ends_with("le") && !word.ends_with("ee") {
        count = count.saturating_sub(1);
    }
    if word.ends_with("es") || word.ends_with("ed") {
        let stem = &word[..word.len() - 2];
        if !stem.ends_with(['t', 'd']) && !stem.ends_with(['s', 'x', 'z']) {
            count = count.saturating_sub(1);
        }
    }
    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syllable_heuristic_handles_common_words() {
        assert_eq!(count_syllables("cat"), 1);
        assert_eq!(count_syllables("table"), 2);
        assert_eq!(count_syllables("make"), 1);
        assert_eq!(count_syllables("beautiful"), 3);
        assert_eq!(count_syllables("wanted"), 2);
        assert_eq!(count_syllables("jumped"), 1);
    }

    #[tokio::test]
    async fn titles_do_not_end_sentences() {
        let text = "Mr. Smith met Dr. Jones. They talked! Was it fun? \"Yes.\" The end";
        let ease = estimate(text, Duration::from_secs(60), |_| {}).await.unwrap();
        assert_eq!(ease.sentence_count, 5);
        assert_eq!(ease.word_count, 13);
    }

    #[tokio::test]
    async fn no_alphabetic_content_gives_none() {
        assert!(estimate("", Duration::ZERO, |_| {}).await.is_none());
        assert!(estimate("123 456 ... !!", Duration::ZERO, |_| {}).await.is_none());
    }

    #[tokio::test]
    async fn scoring_is_deterministic_and_matches_the_formula() {
        let text = "The cat sat on the mat. The dog ran to the park.";
        let a = estimate(text, Duration::ZERO, |_| {}).await.unwrap();
        let b = estimate(text, Duration::from_secs(60), |_| {}).await.unwrap();
        assert_eq!(a, b);

        assert_eq!((a.sentence_count, a.word_count, a.syllable_count), (2, 12, 12));
        let expected = ReadingEase::from_counts(2, 12, 12).unwrap();
        assert!((a.ease - expected.ease).abs() < 1e-9);
        assert!((a.ease - (206.835 - 1.015 * 6.0 - 84.6)).abs() < 1e-9);
        assert!((a.grade - (0.39 * 6.0 + 11.8 - 15.59)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn progress_reaches_one_and_never_decreases() {
        let text = "Word. ".repeat(200);
        let mut seen = Vec::new();
        estimate(&text, Duration::ZERO, |p| seen.push(p)).await.unwrap();
        assert!(seen.len() > 1);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }
}
