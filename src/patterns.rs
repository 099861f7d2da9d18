//! Deterministic pattern correction.
//!
//! Three rule classes, applied in a fixed priority order:
//!
//! 1. *Class regexes*: a set of glyphs visually confusable with one side of
//!    a canonical multi-character term (broadest and most reliable).
//! 2. *Dictionary*: exact whole-substring wrong→right pairs for residual
//!    misreadings class rules don't cover.
//! 3. *Contextual regexes*: rules that only fire when surrounded by specific
//!    neighboring text, and may canonicalize the term and its context
//!    together.
//!
//! Every successful application is recorded by rule id; that record is the
//! sole input to the orchestrator's deterministic confidence estimate. The
//! engine itself never consults the protected-term tables — risky edits are
//! allowed here and rejected downstream by the validator.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

/// Rule priority classes, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Confusable-glyph character classes.
    Class,
    /// Exact substring replacement.
    Dictionary,
    /// Only fires in specific surrounding text.
    Contextual,
}

struct PatternRule {
    id: &'static str,
    description: &'static str,
    kind: RuleKind,
    re: Regex,
    replacement: &'static str,
}

fn class(id: &'static str, pattern: &str, replacement: &'static str, description: &'static str) -> PatternRule {
    PatternRule {
        id,
        description,
        kind: RuleKind::Class,
        re: Regex::new(pattern).expect("bad pattern rule"),
        replacement,
    }
}

fn dict(id: &'static str, from: &str, to: &'static str, description: &'static str) -> PatternRule {
    PatternRule {
        id,
        description,
        kind: RuleKind::Dictionary,
        re: Regex::new(&regex::escape(from)).expect("bad dictionary rule"),
        replacement: to,
    }
}

fn contextual(id: &'static str, pattern: &str, replacement: &'static str, description: &'static str) -> PatternRule {
    PatternRule {
        id,
        description,
        kind: RuleKind::Contextual,
        re: Regex::new(pattern).expect("bad contextual rule"),
        replacement,
    }
}

lazy_static! {
    /// All rules, already in priority order.
    static ref RULES: Vec<PatternRule> = vec![
        // Class rules. Each character class lists glyphs OCR engines confuse
        // with one side of the canonical term; the correct glyph is excluded
        // so the rule never fires on clean text.
        class("cls-juyou", "[講構譜]要", "需要",
              "需 misread as a speech/structure radical glyph"),
        class("cls-housoku", "[洪烘拱]則", "法則",
              "法 misread as a water-radical lookalike"),
        class("cls-keizai", "[雑稚]済", "経済",
              "経 misread as a bird/grain lookalike"),
        class("cls-kyoukyuu", "[侠挟]給", "供給",
              "供 misread as a person-radical lookalike"),
        class("cls-banyuu", "万有引[刀カ]", "万有引力",
              "力 misread as 刀 or katakana カ after 万有引"),
        class("cls-choon-digit", "([\u{30A1}-\u{30FA}])[1|｜lI]", "${1}ー",
              "long-vowel mark misread as a digit or pipe after katakana"),

        // Dictionary rules: residual exact pairs.
        dict("dict-jinkou", "人ロ", "人口",
             "口 misread as katakana ロ in 人口"),
        dict("dict-nyuuryoku", "入カ", "入力",
             "力 misread as katakana カ in 入力"),
        dict("dict-shutsuryoku", "出カ", "出力",
             "力 misread as katakana カ in 出力"),
        dict("dict-kouza", "ロ座", "口座",
             "口 misread as katakana ロ in 口座"),
        dict("dict-nihon", "曰本", "日本",
             "日 misread as 曰 in 日本"),
        dict("dict-mirai", "末来", "未来",
             "未 misread as 末 in 未来"),
        dict("dict-shuumatsu", "週未", "週末",
             "末 misread as 未 in 週末"),
        dict("dict-keisai", "経斉学", "経済学",
             "済 misread as 斉 in 経済学"),

        // Contextual rules: too risky standalone, safe with neighbors.
        contextual("ctx-ryoku", "(万有引|引|重|引っ張る)カ", "${1}力",
                   "katakana カ after a force word is 力"),
        contextual("ctx-juyou-housoku", "[講構需]要の[洪烘法]則", "需要の法則",
                   "canonicalize the demand-law idiom and its context together"),
        contextual("ctx-kyoukyuu-housoku", "[侠挟供]給の[洪烘法]則", "供給の法則",
                   "canonicalize the supply-law idiom and its context together"),
        contextual("ctx-keizai-niokeru", "[雑稚経]済学における", "経済学における",
                   "canonicalize 経済学 when followed by における"),
    ];
}

/// Record of one rule that changed the text.
#[derive(Debug, Clone)]
pub struct AppliedRule {
    /// Stable rule id.
    pub id: &'static str,
    /// Human-readable description, used for confidence weighting and logs.
    pub description: &'static str,
    /// Which priority class the rule belongs to.
    pub kind: RuleKind,
    /// How many separate matches the rule rewrote.
    pub hits: usize,
}

impl AppliedRule {
    /// Contextual rules weigh more in the aggregate confidence estimate.
    pub fn is_contextual(&self) -> bool {
        self.kind == RuleKind::Contextual
    }
}

/// Outcome of one pattern pass.
#[derive(Debug, Clone)]
pub struct PatternOutcome {
    /// The rewritten text.
    pub text: String,
    /// Every rule that fired, in application order.
    pub applied: Vec<AppliedRule>,
}

impl PatternOutcome {
    /// Total number of individual rewrites across all rules.
    pub fn total_hits(&self) -> usize {
        self.applied.iter().map(|r| r.hits).sum()
    }
}

/// The deterministic pattern corrector. Stateless; all tables are static.
#[derive(Debug, Default)]
pub struct PatternEngine;

impl PatternEngine {
    /// Create a pattern engine over the built-in rule tables.
    pub fn new() -> PatternEngine {
        PatternEngine
    }

    /// Apply every rule in priority order, returning the rewritten text and
    /// the record of rules that fired.
    pub fn apply(&self, text: &str) -> PatternOutcome {
        let mut current = text.to_owned();
        let mut applied = Vec::new();
        for rule in RULES.iter() {
            let hits = rule.re.find_iter(&current).count();
            if hits == 0 {
                continue;
            }
            let rewritten = rule.re.replace_all(&current, rule.replacement).into_owned();
            // A rule whose output equals its input (e.g. a contextual rule
            // matching already-canonical text) did not correct anything.
            if rewritten == current {
                continue;
            }
            debug!(
                "pattern rule {} fired {} time(s): {}",
                rule.id, hits, rule.description
            );
            applied.push(AppliedRule {
                id: rule.id,
                description: rule.description,
                kind: rule.kind,
                hits,
            });
            current = rewritten;
        }
        PatternOutcome {
            text: current,
            applied,
        }
    }
}
