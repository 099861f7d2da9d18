//! The shared morphological tokenizer capability.
//!
//! The host application owns a real morphological analyzer; this crate only
//! needs an injected `tokenize` capability. [`Tokenizer`] is that seam, and
//! every detector receives one `Arc` at construction time so a single
//! instance is shared without hidden globals.
//!
//! [`LexiconTokenizer`] is the built-in implementation: longest-match against
//! a small lexicon of words the correction tables care about, with a
//! script-run fallback for everything else. It guarantees that concatenating
//! the token surfaces reproduces the input exactly, which the detectors'
//! char-offset bookkeeping relies on.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::text::{is_hiragana, is_kanji, is_katakana};

/// Part-of-speech classes the detectors distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartOfSpeech {
    /// Nouns, including compound academic terms.
    Noun,
    /// Verbs in any conjugation.
    Verb,
    /// i- and na-adjectives.
    Adjective,
    /// Adverbs.
    Adverb,
    /// Case and binding particles (の, を, に, ...).
    Particle,
    /// Auxiliary verbs and the copula (です, ます, だ, ...).
    Auxiliary,
    /// Punctuation, digits, Latin letters.
    Symbol,
    /// Nothing better known.
    Unknown,
}

impl PartOfSpeech {
    /// Content words carry lexical meaning; particles, auxiliaries and
    /// symbols do not.
    pub fn is_content(self) -> bool {
        matches!(
            self,
            PartOfSpeech::Noun
                | PartOfSpeech::Verb
                | PartOfSpeech::Adjective
                | PartOfSpeech::Adverb
        )
    }
}

/// Conjugation forms the detectors distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConjugationForm {
    /// Dictionary form.
    Base,
    /// Conjunctive (renyōkei) form, the stem an auxiliary attaches to.
    Renyokei,
    /// Any other conjugation.
    Other,
    /// Not a conjugating word.
    None,
}

/// One token from the morphological analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Surface form, exactly as it appears in the text.
    pub surface: String,
    /// Best-guess part of speech.
    pub pos: PartOfSpeech,
    /// Reading in kana, when the analyzer knows the word.
    pub reading: Option<String>,
    /// Conjugation form, for verbs.
    pub conjugation: ConjugationForm,
    /// Whether the analyzer recognized the surface as a dictionary word.
    pub known: bool,
}

impl Token {
    /// A single known content word — the validity test candidate
    /// replacements must pass.
    pub fn is_valid_content_word(&self) -> bool {
        self.known && self.pos.is_content()
    }
}

/// The tokenizer capability injected into detectors.
pub trait Tokenizer: Send + Sync {
    /// Split `text` into an ordered token sequence. Concatenating the
    /// surfaces must reproduce `text`.
    fn tokenize(&self, text: &str) -> Vec<Token>;
}

struct LexEntry {
    pos: PartOfSpeech,
    reading: &'static str,
    conjugation: ConjugationForm,
}

macro_rules! lex {
    ($($surface:literal => ($pos:ident, $reading:literal, $conj:ident),)*) => {
        &[$(($surface, LexEntry {
            pos: PartOfSpeech::$pos,
            reading: $reading,
            conjugation: ConjugationForm::$conj,
        })),*]
    };
}

/// The built-in lexicon. Small by design: it covers the vocabulary the
/// correction tables and tests exercise, plus enough common words to make
/// neighbor-context scoring meaningful. The host's real analyzer replaces
/// all of this through the [`Tokenizer`] trait.
static LEXICON: &[(&str, LexEntry)] = lex![
    // Academic and economic vocabulary (the book genre this system reads).
    "需要" => (Noun, "じゅよう", None),
    "供給" => (Noun, "きょうきゅう", None),
    "法則" => (Noun, "ほうそく", None),
    "経済" => (Noun, "けいざい", None),
    "経済学" => (Noun, "けいざいがく", None),
    "物理学" => (Noun, "ぶつりがく", None),
    "心理学" => (Noun, "しんりがく", None),
    "社会学" => (Noun, "しゃかいがく", None),
    "数学" => (Noun, "すうがく", None),
    "科学" => (Noun, "かがく", None),
    "哲学" => (Noun, "てつがく", None),
    "万有引力" => (Noun, "ばんゆういんりょく", None),
    "引力" => (Noun, "いんりょく", None),
    "重力" => (Noun, "じゅうりょく", None),
    "市場" => (Noun, "しじょう", None),
    "価格" => (Noun, "かかく", None),
    "物価" => (Noun, "ぶっか", None),
    "理論" => (Noun, "りろん", None),
    "研究" => (Noun, "けんきゅう", None),
    "問題" => (Noun, "もんだい", None),
    "社会" => (Noun, "しゃかい", None),
    "会社" => (Noun, "かいしゃ", None),
    "人口" => (Noun, "じんこう", None),
    "入口" => (Noun, "いりぐち", None),
    "出口" => (Noun, "でぐち", None),
    "日本" => (Noun, "にほん", None),
    "東京" => (Noun, "とうきょう", None),
    "先生" => (Noun, "せんせい", None),
    "学校" => (Noun, "がっこう", None),
    "学生" => (Noun, "がくせい", None),
    "大学" => (Noun, "だいがく", None),
    "本" => (Noun, "ほん", None),
    "人" => (Noun, "ひと", None),
    "力" => (Noun, "ちから", None),
    "土" => (Noun, "つち", None),
    "士" => (Noun, "し", None),
    "末" => (Noun, "すえ", None),
    "未来" => (Noun, "みらい", None),
    "週末" => (Noun, "しゅうまつ", None),
    "言葉" => (Noun, "ことば", None),
    "文章" => (Noun, "ぶんしょう", None),
    "説明" => (Noun, "せつめい", None),
    "結果" => (Noun, "けっか", None),
    "関係" => (Noun, "かんけい", None),
    "意味" => (Noun, "いみ", None),
    "世界" => (Noun, "せかい", None),
    "時間" => (Noun, "じかん", None),
    "今日" => (Noun, "きょう", None),
    "自分" => (Noun, "じぶん", None),
    "需給" => (Noun, "じゅきゅう", None),

    // Hiragana words the sokuon tables reference.
    "がっこう" => (Noun, "がっこう", None),
    "ざっし" => (Noun, "ざっし", None),
    "きっぷ" => (Noun, "きっぷ", None),
    "せっけん" => (Noun, "せっけん", None),
    "いっしょ" => (Noun, "いっしょ", None),
    "ちょっと" => (Adverb, "ちょっと", None),
    "まっすぐ" => (Adverb, "まっすぐ", None),
    "やっぱり" => (Adverb, "やっぱり", None),
    "ゆっくり" => (Adverb, "ゆっくり", None),

    // Katakana loanwords the choon tables reference.
    "コーヒー" => (Noun, "コーヒー", None),
    "コンピューター" => (Noun, "コンピューター", None),
    "サーバー" => (Noun, "サーバー", None),
    "データ" => (Noun, "データ", None),
    "インターネット" => (Noun, "インターネット", None),
    "エネルギー" => (Noun, "エネルギー", None),
    "カメラ" => (Noun, "カメラ", None),
    "ページ" => (Noun, "ページ", None),
    "テーブル" => (Noun, "テーブル", None),
    "ニュース" => (Noun, "ニュース", None),
    "スピード" => (Noun, "スピード", None),
    "ケーキ" => (Noun, "ケーキ", None),
    "ゲーム" => (Noun, "ゲーム", None),
    "メール" => (Noun, "メール", None),

    // Verbs, dictionary and conjunctive forms.
    "行く" => (Verb, "いく", Base),
    "行き" => (Verb, "いき", Renyokei),
    "来る" => (Verb, "くる", Base),
    "見る" => (Verb, "みる", Base),
    "読む" => (Verb, "よむ", Base),
    "読み" => (Verb, "よみ", Renyokei),
    "書く" => (Verb, "かく", Base),
    "書き" => (Verb, "かき", Renyokei),
    "話す" => (Verb, "はなす", Base),
    "話し" => (Verb, "はなし", Renyokei),
    "歩く" => (Verb, "あるく", Base),
    "歩き" => (Verb, "あるき", Renyokei),
    "走り" => (Verb, "はしり", Renyokei),
    "食べる" => (Verb, "たべる", Base),
    "食べ" => (Verb, "たべ", Renyokei),
    "考える" => (Verb, "かんがえる", Base),
    "考え" => (Verb, "かんがえ", Renyokei),
    "使う" => (Verb, "つかう", Base),
    "使い" => (Verb, "つかい", Renyokei),
    "降り" => (Verb, "おり", Renyokei),
    "上げる" => (Verb, "あげる", Base),
    "始める" => (Verb, "はじめる", Base),
    "続ける" => (Verb, "つづける", Base),
    "終わる" => (Verb, "おわる", Base),
    "出す" => (Verb, "だす", Base),

    // Kana-spelled verbs and auxiliaries seen after a conjunctive stem.
    "はじめる" => (Verb, "はじめる", Base),
    "はじめた" => (Verb, "はじめた", Other),
    "はじめました" => (Verb, "はじめました", Other),
    "つづける" => (Verb, "つづける", Base),
    "つづけた" => (Verb, "つづけた", Other),
    "おわる" => (Verb, "おわる", Base),
    "おわった" => (Verb, "おわった", Other),
    "だす" => (Verb, "だす", Base),
    "だした" => (Verb, "だした", Other),
    "いく" => (Verb, "いく", Base),
    "くる" => (Verb, "くる", Base),

    // Adjectives and adverbs.
    "高い" => (Adjective, "たかい", Base),
    "安い" => (Adjective, "やすい", Base),
    "大きい" => (Adjective, "おおきい", Base),
    "小さい" => (Adjective, "ちいさい", Base),
    "新しい" => (Adjective, "あたらしい", Base),
    "重要" => (Adjective, "じゅうよう", None),
    "とても" => (Adverb, "とても", None),

    // Particles.
    "の" => (Particle, "の", None),
    "を" => (Particle, "を", None),
    "に" => (Particle, "に", None),
    "が" => (Particle, "が", None),
    "で" => (Particle, "で", None),
    "と" => (Particle, "と", None),
    "は" => (Particle, "は", None),
    "も" => (Particle, "も", None),
    "へ" => (Particle, "へ", None),
    "から" => (Particle, "から", None),
    "まで" => (Particle, "まで", None),
    "より" => (Particle, "より", None),

    // Auxiliaries and the copula.
    "です" => (Auxiliary, "です", None),
    "でした" => (Auxiliary, "でした", None),
    "ます" => (Auxiliary, "ます", None),
    "ました" => (Auxiliary, "ました", None),
    "ません" => (Auxiliary, "ません", None),
    "だ" => (Auxiliary, "だ", None),
    "である" => (Auxiliary, "である", None),
    "ようだ" => (Auxiliary, "ようだ", None),
    "らしい" => (Auxiliary, "らしい", None),
];

lazy_static! {
    static ref LEXICON_MAP: HashMap<&'static str, &'static LexEntry> =
        LEXICON.iter().map(|(s, e)| (*s, e)).collect();
    static ref MAX_WORD_CHARS: usize = LEXICON
        .iter()
        .map(|(s, _)| s.chars().count())
        .max()
        .unwrap_or(1);
}

/// Longest-match lexicon tokenizer with a script-run fallback.
#[derive(Debug, Default)]
pub struct LexiconTokenizer;

impl LexiconTokenizer {
    /// Create a tokenizer backed by the built-in lexicon.
    pub fn new() -> LexiconTokenizer {
        LexiconTokenizer
    }

    fn lookup(surface: &str) -> Option<&'static LexEntry> {
        LEXICON_MAP.get(surface).copied()
    }

    /// Longest lexicon entry starting at `chars[start]`, as a char count.
    fn longest_match(chars: &[char], start: usize) -> Option<usize> {
        let limit = (*MAX_WORD_CHARS).min(chars.len() - start);
        for len in (1..=limit).rev() {
            let candidate: String = chars[start..start + len].iter().collect();
            if LEXICON_MAP.contains_key(candidate.as_str()) {
                return Some(len);
            }
        }
        None
    }

    fn script_class(c: char) -> u8 {
        if is_kanji(c) {
            0
        } else if is_hiragana(c) {
            1
        } else if is_katakana(c) {
            2
        } else {
            3
        }
    }

    /// Length of the unknown run starting at `start`: same script class,
    /// ending early if a lexicon word begins mid-run.
    fn unknown_run(chars: &[char], start: usize) -> usize {
        let class = Self::script_class(chars[start]);
        let mut len = 1;
        while start + len < chars.len()
            && Self::script_class(chars[start + len]) == class
            && Self::longest_match(chars, start + len).is_none()
        {
            len += 1;
        }
        len
    }

    fn unknown_token(surface: String) -> Token {
        let first = surface.chars().next().unwrap_or(' ');
        let (pos, reading) = if is_kanji(first) {
            // Unknown kanji runs are almost always misrecognized nouns.
            (PartOfSpeech::Noun, None)
        } else if is_hiragana(first) || is_katakana(first) {
            // Kana spells its own reading.
            (PartOfSpeech::Unknown, Some(surface.clone()))
        } else {
            (PartOfSpeech::Symbol, None)
        };
        Token {
            surface,
            pos,
            reading,
            conjugation: ConjugationForm::None,
            known: false,
        }
    }
}

impl Tokenizer for LexiconTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let chars: Vec<char> = text.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            if let Some(len) = Self::longest_match(&chars, i) {
                let surface: String = chars[i..i + len].iter().collect();
                let entry = Self::lookup(&surface).expect("matched entry must exist");
                tokens.push(Token {
                    reading: Some(entry.reading.to_owned()),
                    pos: entry.pos,
                    conjugation: entry.conjugation,
                    known: true,
                    surface,
                });
                i += len;
            } else {
                let len = Self::unknown_run(&chars, i);
                let surface: String = chars[i..i + len].iter().collect();
                tokens.push(Self::unknown_token(surface));
                i += len;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surfaces(text: &str) -> Vec<String> {
        LexiconTokenizer::new()
            .tokenize(text)
            .into_iter()
            .map(|t| t.surface)
            .collect()
    }

    #[test]
    fn tokenization_covers_input_exactly() {
        for text in [
            "需要の法則は経済学における万有引力の法則のようなものだ。",
            "講要の洪則は雑済学",
            "コーヒーを飲んだ",
            "",
        ] {
            assert_eq!(surfaces(text).concat(), text);
        }
    }

    #[test]
    fn known_words_win_over_runs() {
        let tokens = LexiconTokenizer::new().tokenize("需要の法則");
        let kinds: Vec<(&str, bool)> = tokens
            .iter()
            .map(|t| (t.surface.as_str(), t.known))
            .collect();
        assert_eq!(
            kinds,
            vec![("需要", true), ("の", true), ("法則", true)]
        );
        assert_eq!(tokens[0].reading.as_deref(), Some("じゅよう"));
        assert_eq!(tokens[0].pos, PartOfSpeech::Noun);
    }

    #[test]
    fn unknown_kanji_runs_have_no_reading() {
        let tokens = LexiconTokenizer::new().tokenize("講要の洪則");
        assert_eq!(tokens[0].surface, "講要");
        assert!(!tokens[0].known);
        assert!(tokens[0].reading.is_none());
        assert_eq!(tokens[2].surface, "洪則");
        assert!(!tokens[2].known);
    }

    #[test]
    fn longest_match_prefers_compounds() {
        let tokens = LexiconTokenizer::new().tokenize("経済学");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].surface, "経済学");
    }

    #[test]
    fn renyokei_is_tagged() {
        let tokens = LexiconTokenizer::new().tokenize("読みはじめた");
        assert_eq!(tokens[0].surface, "読み");
        assert_eq!(tokens[0].conjugation, ConjugationForm::Renyokei);
        assert_eq!(tokens[1].surface, "はじめた");
        assert!(tokens[1].surface.chars().all(crate::text::is_hiragana));
    }

    #[test]
    fn content_word_test() {
        let tok = LexiconTokenizer::new();
        let t = &tok.tokenize("需要")[0];
        assert!(t.is_valid_content_word());
        let t = &tok.tokenize("の")[0];
        assert!(!t.is_valid_content_word());
    }
}
