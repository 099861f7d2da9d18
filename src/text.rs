//! Small facts about Japanese text: script classes, edit distance, and the
//! change ratio used for confidence scoring.

/// Is this a kanji (CJK unified ideograph)?
pub fn is_kanji(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '々' | '〆')
}

/// Is this hiragana? The sokuon `っ` and small vowels count.
pub fn is_hiragana(c: char) -> bool {
    matches!(c, '\u{3041}'..='\u{3096}')
}

/// Is this katakana? The long-vowel mark `ー` counts, since it only appears
/// inside katakana words in practice.
pub fn is_katakana(c: char) -> bool {
    matches!(c, '\u{30A1}'..='\u{30FA}' | 'ー')
}

/// Is this any kana at all?
pub fn is_kana(c: char) -> bool {
    is_hiragana(c) || is_katakana(c)
}

/// Fraction of characters in `s` that are katakana, in `[0, 1]`. Empty
/// strings score 0.
pub fn katakana_ratio(s: &str) -> f32 {
    script_ratio(s, is_katakana)
}

/// Fraction of characters in `s` that are hiragana, in `[0, 1]`.
pub fn hiragana_ratio(s: &str) -> f32 {
    script_ratio(s, is_hiragana)
}

fn script_ratio(s: &str, pred: fn(char) -> bool) -> f32 {
    let total = s.chars().count();
    if total == 0 {
        return 0.0;
    }
    let matching = s.chars().filter(|&c| pred(c)).count();
    matching as f32 / total as f32
}

/// Levenshtein distance over characters (not bytes — Japanese text is
/// multi-byte throughout).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two-row DP.
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// `levenshtein(a, b) / max(len(a), len(b))`, the fraction of the longer
/// string that changed. Two empty strings have ratio 0.
pub fn change_ratio(a: &str, b: &str) -> f32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    levenshtein(a, b) as f32 / max_len as f32
}

/// Remove every long-vowel mark from a string.
pub fn strip_choon(s: &str) -> String {
    s.chars().filter(|&c| c != 'ー').collect()
}

/// Remove every sokuon (`っ` / `ッ`) from a string.
pub fn strip_sokuon(s: &str) -> String {
    s.chars().filter(|&c| c != 'っ' && c != 'ッ').collect()
}

/// Does this kana begin a consonant row that commonly follows a sokuon
/// (k/g/s/z/t/d/p/b)? Used as a phonetic-plausibility signal when restoring
/// dropped sokuon marks.
pub fn sokuon_friendly(c: char) -> bool {
    matches!(
        c,
        'か'..='ご' | 'さ'..='ぞ' | 'た'..='ど' | 'ば'..='ぽ'
            | 'カ'..='ゴ' | 'サ'..='ゾ' | 'タ'..='ド' | 'バ'..='ポ'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_classes() {
        assert!(is_kanji('需'));
        assert!(is_kanji('々'));
        assert!(!is_kanji('あ'));
        assert!(is_hiragana('っ'));
        assert!(is_katakana('ー'));
        assert!(is_katakana('コ'));
        assert!(!is_hiragana('コ'));
    }

    #[test]
    fn levenshtein_counts_chars_not_bytes() {
        assert_eq!(levenshtein("がこう", "がっこう"), 1);
        assert_eq!(levenshtein("コヒー", "コーヒー"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn change_ratio_is_normalized() {
        assert_eq!(change_ratio("", ""), 0.0);
        assert_eq!(change_ratio("abcd", "abcd"), 0.0);
        assert!((change_ratio("abcd", "abce") - 0.25).abs() < 1e-6);
        assert_eq!(change_ratio("ab", ""), 1.0);
    }

    #[test]
    fn strip_helpers() {
        assert_eq!(strip_choon("コーヒー"), "コヒ");
        assert_eq!(strip_sokuon("がっこう"), "がこう");
        assert!(sokuon_friendly('こ'));
        assert!(sokuon_friendly('ト'));
        assert!(!sokuon_friendly('あ'));
        assert!(!sokuon_friendly('ま'));
    }

    #[test]
    fn ratios() {
        assert!((katakana_ratio("コーヒー") - 1.0).abs() < 1e-6);
        assert!((katakana_ratio("コー1ー") - 0.75).abs() < 1e-6);
        assert!((hiragana_ratio("がっこう") - 1.0).abs() < 1e-6);
    }
}
