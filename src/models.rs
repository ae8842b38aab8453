use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Applied,
    Interview,
    Offer,
    Rejected,
    Other(String), // unrecognized backend value, preserved verbatim
}

impl Status {
    // The states the form can pick between. Other is display-only.
    pub const SELECTABLE: [Status; 4] = [
        Status::Applied,
        Status::Interview,
        Status::Offer,
        Status::Rejected,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Status::Applied => "Applied",
            Status::Interview => "Interview",
            Status::Offer => "Offer",
            Status::Rejected => "Rejected",
            Status::Other(raw) => raw,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Applied
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Status::Other(raw) = self {
            if raw.trim().is_empty() {
                return f.write_str("Unknown");
            }
        }
        f.write_str(self.as_str())
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Applied" => Status::Applied,
            "Interview" => Status::Interview,
            "Offer" => Status::Offer,
            "Rejected" => Status::Rejected,
            _ => Status::Other(value),
        }
    }
}

impl From<Status> for String {
    fn from(value: Status) -> Self {
        match value {
            Status::Other(raw) => raw,
            named => named.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

impl StatusFilter {
    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(status) => record.status == *status,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            StatusFilter::All => "All",
            StatusFilter::Only(status) => status.as_str(),
        }
    }

    // All -> Applied -> Interview -> Offer -> Rejected -> All.
    pub fn cycled(&self) -> StatusFilter {
        match self {
            StatusFilter::All => StatusFilter::Only(Status::Applied),
            StatusFilter::Only(Status::Applied) => StatusFilter::Only(Status::Interview),
            StatusFilter::Only(Status::Interview) => StatusFilter::Only(Status::Offer),
            StatusFilter::Only(Status::Offer) => StatusFilter::Only(Status::Rejected),
            StatusFilter::Only(_) => StatusFilter::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub application_id: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_post_url: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub date_applied: String, // "YYYY-MM-DD"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ApplicationRecord {
    /// Date this application was submitted, for ordering. Missing or
    /// unparseable dates sort as the earliest possible date.
    pub fn applied_on(&self) -> NaiveDate {
        NaiveDate::parse_from_str(&self.date_applied, "%Y-%m-%d").unwrap_or(NaiveDate::MIN)
    }

    pub fn draft(&self) -> ApplicationDraft {
        ApplicationDraft {
            company_name: self.company_name.clone(),
            job_title: self.job_title.clone(),
            job_post_url: self.job_post_url.clone(),
            status: self.status.clone(),
            date_applied: self.date_applied.clone(),
            follow_up_date: self.follow_up_date.clone(),
            notes: self.notes.clone(),
        }
    }

    /// Merge submitted fields. The server-assigned id never changes.
    pub fn apply_draft(&mut self, draft: &ApplicationDraft) {
        self.company_name = draft.company_name.clone();
        self.job_title = draft.job_title.clone();
        self.job_post_url = draft.job_post_url.clone();
        self.status = draft.status.clone();
        self.date_applied = draft.date_applied.clone();
        self.follow_up_date = draft.follow_up_date.clone();
        self.notes = draft.notes.clone();
    }
}

/// Client-authored fields of an application, sent on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDraft {
    pub company_name: String,
    pub job_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_post_url: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub date_applied: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ApplicationDraft {
    pub fn new() -> Self {
        Self {
            company_name: String::new(),
            job_title: String::new(),
            job_post_url: None,
            status: Status::default(),
            date_applied: today(),
            follow_up_date: None,
            notes: None,
        }
    }
}

impl Default for ApplicationDraft {
    fn default() -> Self {
        Self::new()
    }
}

pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Case-insensitive substring match on company and title, combined with the
/// status filter, most recently applied first. A pure projection: the
/// underlying list is never reordered or mutated.
pub fn visible_records<'a>(
    records: &'a [ApplicationRecord],
    search: &str,
    filter: &StatusFilter,
) -> Vec<&'a ApplicationRecord> {
    let needle = search.to_lowercase();
    let mut rows: Vec<&ApplicationRecord> = records
        .iter()
        .filter(|record| filter.matches(record))
        .filter(|record| {
            needle.is_empty()
                || record.company_name.to_lowercase().contains(&needle)
                || record.job_title.to_lowercase().contains(&needle)
        })
        .collect();
    rows.sort_by(|a, b| b.applied_on().cmp(&a.applied_on()));
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub total: usize,
    pub applied: usize,
    pub interview: usize,
    pub offer: usize,
    pub rejected: usize,
    pub unknown: usize,
}

pub fn status_counts(records: &[ApplicationRecord]) -> StatusCounts {
    let mut counts = StatusCounts {
        total: records.len(),
        ..StatusCounts::default()
    };
    for record in records {
        match &record.status {
            Status::Applied => counts.applied += 1,
            Status::Interview => counts.interview += 1,
            Status::Offer => counts.offer += 1,
            Status::Rejected => counts.rejected += 1,
            Status::Other(_) => counts.unknown += 1,
        }
    }
    counts
}
