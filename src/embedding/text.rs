//! Texts that represent incentives and companies in embedding space.
//!
//! Absent parts are omitted rather than rendered empty. `None` means there is
//! nothing to embed.

use crate::model::{Company, Incentive};

pub fn incentive_text(incentive: &Incentive) -> Option<String> {
    let mut lines = Vec::new();

    push_line(&mut lines, "Title", &incentive.title);
    push_line(&mut lines, "Description", &incentive.description);

    if let Some(profile) = &incentive.profile {
        if let Some(summary) = &profile.summary {
            push_line(&mut lines, "Summary", summary);
        }
        if !profile.eligible_sectors.is_empty() {
            push_line(
                &mut lines,
                "Eligible sectors",
                &profile.eligible_sectors.join(", "),
            );
        }
    }

    join(lines)
}

pub fn company_text(company: &Company) -> Option<String> {
    let mut lines = Vec::new();

    push_line(&mut lines, "Company", &company.name);
    if let Some(sector) = &company.sector {
        push_line(&mut lines, "Main activity", sector);
    }
    if let Some(activity) = &company.activity {
        push_line(&mut lines, "Description", activity);
    }

    join(lines)
}

fn push_line(lines: &mut Vec<String>, label: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        lines.push(format!("{label}: {value}"));
    }
}

fn join(lines: Vec<String>) -> Option<String> {
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
