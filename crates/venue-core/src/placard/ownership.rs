//! Ownership check over placard text: ward/plot numbers, owner and company values,
//! and whether the local player is entitled to register the plot.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::location::HousingPlotLocation;

static WARD_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)Ward\s*(\d+)").ok());
static PLOT_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)Plot\s*(\d+)").ok());

/// Words that appear in the placard's own labels rather than in player-entered values.
const TEMPLATE_KEYWORDS: &[&str] = &[
    "plot",
    "address",
    "price",
    "devaluation",
    "greeting",
    "name",
    "tag",
    "details",
    "owner",
    "company",
    "estate",
    "hall",
    "main",
    "sub",
    "size",
    "next",
    "ward",
];

pub const OWNER_KEYWORD: &str = "owner";
pub const COMPANY_KEYWORD: &str = "company";

/// Everything read from an open placard in one evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacardSnapshot {
    pub lines: Vec<String>,
    pub player_name: Option<String>,
    pub player_company_tag: Option<String>,
    pub is_visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipReport {
    pub ward: Option<u32>,
    pub plot: Option<u32>,
    pub owner_value: Option<String>,
    pub company_value: Option<String>,
    pub matches_owner: bool,
    pub matches_free_company: bool,
    pub authorized: bool,
    pub plot_matches: bool,
}

impl OwnershipReport {
    /// Whether any address information was found on the placard.
    pub fn has_address(&self) -> bool {
        self.ward.is_some() || self.plot.is_some()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OwnershipVerifier;

impl OwnershipVerifier {
    pub fn verify(snapshot: &PlacardSnapshot, tracked: &HousingPlotLocation) -> OwnershipReport {
        let (ward, plot) = extract_ward_and_plot(&snapshot.lines);
        let owner_value = value_after_label(&snapshot.lines, OWNER_KEYWORD);
        let company_value = value_after_label(&snapshot.lines, COMPANY_KEYWORD);

        let matches_owner = contains_identity(owner_value.as_deref(), snapshot.player_name.as_deref());
        let matches_free_company = contains_identity(
            company_value.as_deref(),
            snapshot.player_company_tag.as_deref(),
        );
        let plot_matches = ward == Some(tracked.ward_id) && plot == Some(tracked.plot_id);

        OwnershipReport {
            ward,
            plot,
            owner_value,
            company_value,
            matches_owner,
            matches_free_company,
            authorized: matches_owner || matches_free_company,
            plot_matches,
        }
    }
}

/// First `Ward N` and first `Plot N` anywhere in the lines.
pub fn extract_ward_and_plot(lines: &[String]) -> (Option<u32>, Option<u32>) {
    (first_number(lines, &WARD_PATTERN), first_number(lines, &PLOT_PATTERN))
}

fn first_number(lines: &[String], pattern: &Option<Regex>) -> Option<u32> {
    let pattern = pattern.as_ref()?;
    lines
        .iter()
        .find_map(|line| pattern.captures(line))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Value printed after the first line mentioning `keyword`: the next line that is not
/// itself a label.
pub fn value_after_label(lines: &[String], keyword: &str) -> Option<String> {
    let keyword = keyword.to_lowercase();
    let label_index = lines
        .iter()
        .position(|line| line.to_lowercase().contains(&keyword))?;
    lines[label_index + 1..]
        .iter()
        .find(|line| !is_label_like(line))
        .cloned()
}

pub fn is_label_like(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.chars().count() <= 2 {
        return true;
    }
    if trimmed.contains(':') {
        return false;
    }
    let lower = trimmed.to_lowercase();
    TEMPLATE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Case-insensitive. The placard value may contain the identity (signage appends a
/// suffix), or be a whole-word prefix of it (signage prints a shortened name).
fn contains_identity(value: Option<&str>, identity: Option<&str>) -> bool {
    match (value.map(str::trim), identity.map(str::trim)) {
        (Some(value), Some(identity)) if !value.is_empty() && !identity.is_empty() => {
            let value = value.to_lowercase();
            let identity = identity.to_lowercase();
            value.contains(&identity) || starts_with_words(&identity, &value)
        }
        _ => false,
    }
}

fn starts_with_words(text: &str, prefix: &str) -> bool {
    text.strip_prefix(prefix)
        .is_some_and(|rest| rest.chars().next().map_or(true, |c| !c.is_alphanumeric()))
}
