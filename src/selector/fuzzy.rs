//! Maps model selections back to the candidates they were drawn from.
//!
//! Resolution order per selection:
//!
//! 1. an echoed id equal to a candidate id,
//! 2. a name equal to a candidate name (case-insensitive),
//! 3. the first candidate, in prompt order, whose name contains the selection's
//!    name or is contained by it (case-insensitive).
//!
//! Candidates already claimed by an earlier selection are not offered again. A
//! selection that resolves to nothing is dropped; it never becomes a new candidate.

use uuid::Uuid;

use super::parse::RawSelection;
use crate::model::Company;

pub fn resolve(selection: &RawSelection, candidates: &[&Company], taken: &[bool]) -> Option<usize> {
    let free = |i: &usize| !taken.get(*i).copied().unwrap_or(false);

    if let Some(id) = selection
        .id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        && let Some(idx) = candidates.iter().position(|c| c.id == id).filter(free)
    {
        return Some(idx);
    }

    let name = selection.name.as_deref()?.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }

    let lowered: Vec<String> = candidates
        .iter()
        .map(|c| c.name.trim().to_lowercase())
        .collect();

    if let Some(idx) = lowered.iter().position(|c| *c == name).filter(free) {
        return Some(idx);
    }

    lowered
        .iter()
        .enumerate()
        .filter(|(i, _)| free(i))
        .find(|(_, c)| !c.is_empty() && (c.contains(&name) || name.contains(c.as_str())))
        .map(|(i, _)| i)
}
