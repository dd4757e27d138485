//! Cross-checks the model's eligibility claims against the real code set.

use std::fmt;

use crate::model::{Company, IncentiveProfile};

/// Score correction applied when the model claims an ineligible code is eligible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaimPenalty {
    pub amount: f32,
    pub floor: f32,
}

impl Default for ClaimPenalty {
    fn default() -> Self {
        Self {
            amount: crate::constants::DEFAULT_CLAIM_PENALTY,
            floor: crate::constants::DEFAULT_CLAIM_PENALTY_FLOOR,
        }
    }
}

impl ClaimPenalty {
    pub fn apply(&self, score: f32) -> f32 {
        (score - self.amount).max(self.floor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReasons {
    pub score: f32,
    pub reasons: Vec<String>,
    pub contradicted: bool,
}

/// Replaces every false eligibility claim with a contradiction note.
///
/// The penalty is applied once per candidate no matter how many reasons were false.
pub fn validate_claims(
    profile: Option<&IncentiveProfile>,
    company: &Company,
    score: f32,
    reasons: Vec<String>,
    penalty: ClaimPenalty,
) -> ValidatedReasons {
    let mut contradicted = false;

    let reasons = reasons
        .into_iter()
        .map(|reason| match false_claim(profile, company, &reason) {
            Some(contradiction) => {
                contradicted = true;
                contradiction.to_string()
            }
            None => reason,
        })
        .collect();

    let score = if contradicted { penalty.apply(score) } else { score };

    ValidatedReasons {
        score,
        reasons,
        contradicted,
    }
}

/// Why an eligibility claim does not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Contradiction {
    /// None of the codes behind the claim is in the eligible set.
    NotEligible(Vec<String>),
    /// The named codes are eligible, but the company holds none of them.
    NotHeld(Vec<String>),
}

impl fmt::Display for Contradiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEligible(codes) => write!(
                f,
                "Contradiction: code {} is not in the incentive's eligible codes",
                codes.join(", ")
            ),
            Self::NotHeld(codes) => write!(
                f,
                "Contradiction: company does not hold code {}",
                codes.join(", ")
            ),
        }
    }
}

/// Checks `reason` when it asserts code eligibility.
///
/// A claim holds when one of the codes it names is both eligible and held by the
/// company. A claim naming no code is read as "this company's code is eligible".
fn false_claim(
    profile: Option<&IncentiveProfile>,
    company: &Company,
    reason: &str,
) -> Option<Contradiction> {
    if !is_eligibility_claim(reason) {
        return None;
    }

    let eligible = |code: &str| {
        profile.is_some_and(|p| {
            p.eligible_codes
                .iter()
                .any(|e| normalize_code(e) == normalize_code(code))
        })
    };
    let own: Vec<&str> = company
        .codes
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    let held = |code: &str| own.iter().any(|c| normalize_code(c) == normalize_code(code));

    let named = mentioned_codes(reason);

    if named.is_empty() {
        if own.iter().any(|c| eligible(c)) {
            return None;
        }
        return Some(Contradiction::NotEligible(if own.is_empty() {
            vec!["(none on record)".to_string()]
        } else {
            own.iter().map(|c| c.to_string()).collect()
        }));
    }

    if named.iter().any(|c| eligible(c) && held(c)) {
        return None;
    }

    let ineligible: Vec<String> = named.iter().filter(|c| !eligible(c)).cloned().collect();
    if ineligible.is_empty() {
        Some(Contradiction::NotHeld(named))
    } else {
        Some(Contradiction::NotEligible(ineligible))
    }
}

const CODE_WORDS: [&str; 5] = ["code", "cae", "nace", "código", "codigo"];
const ELIGIBLE_WORDS: [&str; 4] = ["eligible", "elegível", "elegivel", "elegíveis"];
const NEGATIONS: [&str; 8] = ["not", "não", "nao", "isn", "aren", "never", "no", "nem"];

/// Words a negation may sit in front of the eligibility word ("is not really eligible").
const NEGATION_REACH: usize = 3;

/// A reason mentions a code and asserts eligibility that is not negated in place.
///
/// "ineligible" and "inelegível" never match the eligibility words, so they are not
/// claims. A negation elsewhere in the sentence ("elegível, não há restrições") does
/// not cancel the claim.
fn is_eligibility_claim(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mentions_code = words
        .iter()
        .any(|w| CODE_WORDS.iter().any(|code| w.starts_with(code)));
    if !mentions_code {
        return false;
    }

    words.iter().enumerate().any(|(i, word)| {
        ELIGIBLE_WORDS.contains(word)
            && !words[i.saturating_sub(NEGATION_REACH)..i]
                .iter()
                .any(|w| NEGATIONS.contains(w))
    })
}

/// Tokens shaped like activity classification codes: five digits (CAE `62010`) or a
/// dotted class (NACE `62.01`, `62.0`). Years, percentages and counts do not qualify.
fn mentioned_codes(reason: &str) -> Vec<String> {
    let mut codes = Vec::new();
    let mut current = String::new();

    let mut chars = reason.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if ch == '.'
            && !current.is_empty()
            && chars.peek().is_some_and(|next| next.is_ascii_digit())
        {
            current.push(ch);
        } else {
            // a digit run glued to letters or a percent sign is not a code
            let glued = ch.is_alphanumeric() || ch == '%';
            flush(&mut current, &mut codes, glued);
            while glued && chars.peek().is_some_and(|next| next.is_ascii_digit()) {
                chars.next();
            }
        }
    }
    flush(&mut current, &mut codes, false);
    codes
}

fn flush(current: &mut String, codes: &mut Vec<String>, discard: bool) {
    if !discard && is_code_shaped(current) && !codes.contains(current) {
        codes.push(current.clone());
    }
    current.clear();
}

fn is_code_shaped(token: &str) -> bool {
    match token.split_once('.') {
        None => token.len() == 5,
        Some((class, rest)) => {
            class.len() == 2 && (1..=3).contains(&rest.len()) && !rest.contains('.')
        }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().chars().filter(|c| *c != '.').collect()
}
