//! Batch selection prompt.

use std::fmt::Write;

use crate::model::{Company, Incentive};

const MAX_TITLE_CHARS: usize = 200;
const MAX_SUMMARY_CHARS: usize = 300;
const MAX_ACTIVITY_CHARS: usize = 150;
const MAX_LISTED_SECTORS: usize = 5;
const MAX_LISTED_CODES: usize = 10;

const REPLY_SHAPE: &str =
    r#"[{"company_id": "<id>", "company": "<name>", "score": 0.0, "reasons": ["...", "..."]}]"#;

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or("N/A")
}

/// Renders the prompt asking the model to pick exactly `select` of `candidates`.
///
/// The output is a pure function of its inputs so that identical runs hit the
/// ledger cache.
pub fn build_prompt(incentive: &Incentive, candidates: &[&Company], select: usize) -> String {
    let profile = incentive.profile.as_ref();

    let summary = profile
        .and_then(|p| p.summary.as_deref())
        .unwrap_or(incentive.description.as_str());
    let sectors: Vec<&str> = profile
        .map(|p| {
            p.eligible_sectors
                .iter()
                .take(MAX_LISTED_SECTORS)
                .map(String::as_str)
                .collect()
        })
        .unwrap_or_default();
    let codes: Vec<&str> = profile
        .map(|p| {
            p.eligible_codes
                .iter()
                .take(MAX_LISTED_CODES)
                .map(String::as_str)
                .collect()
        })
        .unwrap_or_default();
    let regions = profile.map(|p| p.eligible_regions.join(", ")).unwrap_or_default();
    let sizes = profile.map(|p| p.eligible_sizes.join(", ")).unwrap_or_default();
    let max_amount = profile
        .and_then(|p| p.funding.max_amount)
        .map(|m| format!("{m:.0}"))
        .unwrap_or_else(|| "N/A".to_string());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Rate the fit (0.0-1.0) between a funding incentive and {} candidate companies.",
        candidates.len()
    );
    let _ = writeln!(out, "SELECT the {select} companies with the best fit.\n");

    let _ = writeln!(out, "INCENTIVE: {}", truncate(&incentive.title, MAX_TITLE_CHARS));
    let _ = writeln!(out, "Eligible sectors: {}", sectors.join(", "));
    let _ = writeln!(out, "Eligible codes: {}", codes.join(", "));
    let _ = writeln!(out, "Eligible regions: {regions}");
    let _ = writeln!(out, "Eligible sizes: {sizes}");
    let _ = writeln!(out, "Max funding: {max_amount}");
    let _ = writeln!(out, "Summary: {}\n", truncate(summary, MAX_SUMMARY_CHARS));

    let _ = writeln!(out, "CANDIDATES:");
    for (i, company) in candidates.iter().enumerate() {
        let codes = if company.codes.is_empty() {
            "N/A".to_string()
        } else {
            company.codes.join(", ")
        };
        let _ = writeln!(out, "{}. {} [id: {}]", i + 1, company.name, company.id);
        let _ = writeln!(out, "   Sector: {}", or_na(company.sector.as_deref()));
        let _ = writeln!(out, "   Codes: {codes}");
        let _ = writeln!(out, "   Size: {}", or_na(company.size.as_deref()));
        let _ = writeln!(out, "   Region: {}", or_na(company.region.as_deref()));
        let _ = writeln!(
            out,
            "   Activity: {}",
            truncate(or_na(company.activity.as_deref()), MAX_ACTIVITY_CHARS)
        );
    }

    let _ = writeln!(
        out,
        "\nRespond with a JSON array of EXACTLY {select} entries, best first, \
         even if the fit is weak:"
    );
    let _ = writeln!(out, "{REPLY_SHAPE}");
    let _ = writeln!(out, "\nRULES:");
    let _ = writeln!(
        out,
        "1. Only say a code is eligible if it appears EXACTLY in the eligible codes above."
    );
    let _ = writeln!(out, "2. Give at most 3 short reasons per company.");
    let _ = writeln!(out, "3. Copy the company id exactly as shown.");

    out
}
