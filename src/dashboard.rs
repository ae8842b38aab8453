use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::api::{ApiError, CreateOutcome};
use crate::models::{
    ApplicationDraft, ApplicationRecord, Status, StatusCounts, StatusFilter, status_counts, today,
    visible_records,
};

/// How long transient status messages stay on screen.
pub const MESSAGE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    CompanyName,
    JobTitle,
    JobPostUrl,
    Status,
    DateApplied,
    FollowUpDate,
    Notes,
}

impl FormField {
    pub const ORDER: [FormField; 7] = [
        FormField::CompanyName,
        FormField::JobTitle,
        FormField::JobPostUrl,
        FormField::Status,
        FormField::DateApplied,
        FormField::FollowUpDate,
        FormField::Notes,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FormField::CompanyName => "Company",
            FormField::JobTitle => "Job title",
            FormField::JobPostUrl => "Job post URL",
            FormField::Status => "Status",
            FormField::DateApplied => "Date applied",
            FormField::FollowUpDate => "Follow-up date",
            FormField::Notes => "Notes",
        }
    }
}

/// Presence checks for the two required fields plus a URL shape check on the
/// optional link. Nothing else is validated; fields are sent as typed.
pub fn validate_fields(
    company_name: &str,
    job_title: &str,
    job_post_url: &str,
) -> HashMap<FormField, String> {
    let mut errors = HashMap::new();
    if company_name.trim().is_empty() {
        errors.insert(FormField::CompanyName, "Company name is required".to_string());
    }
    if job_title.trim().is_empty() {
        errors.insert(FormField::JobTitle, "Job title is required".to_string());
    }
    if !job_post_url.is_empty() && url::Url::parse(job_post_url).is_err() {
        errors.insert(FormField::JobPostUrl, "Please enter a valid URL".to_string());
    }
    errors
}

/// Add/edit form: one text buffer per field, a focus cursor, and the errors
/// from the last failed submit keyed by field.
#[derive(Debug, Clone, Default)]
pub struct ApplicationForm {
    pub company_name: String,
    pub job_title: String,
    pub job_post_url: String,
    pub status: Status,
    pub date_applied: String,
    pub follow_up_date: String,
    pub notes: String,
    pub focus: usize,
    pub errors: HashMap<FormField, String>,
}

impl ApplicationForm {
    /// Fresh form for a new application, dated today.
    pub fn blank() -> Self {
        Self {
            date_applied: today(),
            ..Self::default()
        }
    }

    /// Form seeded from an existing record for editing.
    pub fn from_record(record: &ApplicationRecord) -> Self {
        Self {
            company_name: record.company_name.clone(),
            job_title: record.job_title.clone(),
            job_post_url: record.job_post_url.clone().unwrap_or_default(),
            status: record.status.clone(),
            date_applied: record.date_applied.clone(),
            follow_up_date: record.follow_up_date.clone().unwrap_or_default(),
            notes: record.notes.clone().unwrap_or_default(),
            focus: 0,
            errors: HashMap::new(),
        }
    }

    pub fn focused(&self) -> FormField {
        FormField::ORDER[self.focus % FormField::ORDER.len()]
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % FormField::ORDER.len();
    }

    pub fn focus_prev(&mut self) {
        self.focus = (self.focus + FormField::ORDER.len() - 1) % FormField::ORDER.len();
    }

    // Status has no text buffer; it cycles through the selectable values.
    fn buffer_mut(&mut self, field: FormField) -> Option<&mut String> {
        match field {
            FormField::CompanyName => Some(&mut self.company_name),
            FormField::JobTitle => Some(&mut self.job_title),
            FormField::JobPostUrl => Some(&mut self.job_post_url),
            FormField::Status => None,
            FormField::DateApplied => Some(&mut self.date_applied),
            FormField::FollowUpDate => Some(&mut self.follow_up_date),
            FormField::Notes => Some(&mut self.notes),
        }
    }

    /// Typing into the focused field. Editing a field clears its error.
    pub fn input(&mut self, c: char) {
        let field = self.focused();
        if let Some(buffer) = self.buffer_mut(field) {
            buffer.push(c);
            self.errors.remove(&field);
        }
    }

    pub fn backspace(&mut self) {
        let field = self.focused();
        if let Some(buffer) = self.buffer_mut(field) {
            buffer.pop();
            self.errors.remove(&field);
        }
    }

    pub fn cycle_status(&mut self, forward: bool) {
        let n = Status::SELECTABLE.len();
        let at = Status::SELECTABLE.iter().position(|s| *s == self.status);
        let next = match (at, forward) {
            (Some(i), true) => (i + 1) % n,
            (Some(i), false) => (i + n - 1) % n,
            (None, _) => 0,
        };
        self.status = Status::SELECTABLE[next].clone();
    }

    pub fn validate(&mut self) -> bool {
        self.errors = validate_fields(&self.company_name, &self.job_title, &self.job_post_url);
        self.errors.is_empty()
    }

    pub fn error(&self, field: FormField) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }

    /// The submission payload. Empty optional fields are omitted rather than
    /// sent as empty strings; a blanked-out date falls back to today.
    pub fn to_draft(&self) -> ApplicationDraft {
        ApplicationDraft {
            company_name: self.company_name.clone(),
            job_title: self.job_title.clone(),
            job_post_url: optional(&self.job_post_url),
            status: self.status.clone(),
            date_applied: if self.date_applied.trim().is_empty() {
                today()
            } else {
                self.date_applied.clone()
            },
            follow_up_date: optional(&self.follow_up_date),
            notes: optional(&self.notes),
        }
    }
}

fn optional(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Creating,
    Editing { application_id: String },
}

/// At most one modal is up at a time; opening one replaces the other.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Modal {
    #[default]
    Closed,
    Form(FormMode),
    ConfirmDelete { application_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
    shown_at: Instant,
}

/// A network operation the controller wants run. The UI shell executes it on
/// a worker thread and posts the completion back as an OpOutcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Refresh,
    Create(ApplicationDraft),
    Update {
        application_id: String,
        draft: ApplicationDraft,
    },
    Delete {
        application_id: String,
    },
}

/// Completion of a previously issued Effect.
#[derive(Debug)]
pub enum OpOutcome {
    Listed(Result<Vec<ApplicationRecord>, ApiError>),
    Created(Result<CreateOutcome, ApiError>),
    Updated {
        application_id: String,
        draft: ApplicationDraft,
        result: Result<(), ApiError>,
    },
    Deleted {
        application_id: String,
        result: Result<(), ApiError>,
    },
}

/// All dashboard state, kept apart from terminal drawing so every transition
/// is testable. Input handlers return Effects instead of doing I/O;
/// completions come back through apply_outcome. The record list is a cache
/// of server state and only changes when the server acknowledges.
pub struct DashboardState {
    pub user_email: String,
    pub records: Vec<ApplicationRecord>,
    pub search: String,
    pub filter: StatusFilter,
    pub selected: usize,
    pub detail_scroll: u16,
    pub modal: Modal,
    pub form: ApplicationForm,
    pub message: Option<StatusMessage>,
    pub loading: bool,
    pub submitting: bool,
    pub searching: bool,
}

impl DashboardState {
    pub fn new(user_email: String) -> Self {
        Self {
            user_email,
            records: Vec::new(),
            search: String::new(),
            filter: StatusFilter::All,
            selected: 0,
            detail_scroll: 0,
            modal: Modal::Closed,
            form: ApplicationForm::blank(),
            message: None,
            loading: true,
            submitting: false,
            searching: false,
        }
    }

    /// The rows currently on screen: filtered, searched, newest first.
    pub fn visible(&self) -> Vec<&ApplicationRecord> {
        visible_records(&self.records, &self.search, &self.filter)
    }

    pub fn counts(&self) -> StatusCounts {
        status_counts(&self.records)
    }

    pub fn selected_record(&self) -> Option<&ApplicationRecord> {
        let rows = self.visible();
        rows.get(self.selected.min(rows.len().saturating_sub(1)))
            .copied()
    }

    pub fn select_next(&mut self) {
        let len = self.visible().len();
        if len > 0 && self.selected + 1 < len {
            self.selected += 1;
            self.detail_scroll = 0;
        }
    }

    pub fn select_prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.detail_scroll = 0;
        }
    }

    pub fn scroll_detail_down(&mut self) {
        self.detail_scroll = self.detail_scroll.saturating_add(1);
    }

    pub fn scroll_detail_up(&mut self) {
        self.detail_scroll = self.detail_scroll.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    pub fn start_search(&mut self) {
        self.searching = true;
    }

    pub fn end_search(&mut self) {
        self.searching = false;
    }

    pub fn search_input(&mut self, c: char) {
        self.search.push(c);
        self.clamp_selection();
    }

    pub fn search_backspace(&mut self) {
        self.search.pop();
        self.clamp_selection();
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
        self.searching = false;
        self.clamp_selection();
    }

    pub fn cycle_filter(&mut self) {
        self.filter = self.filter.cycled();
        self.selected = 0;
        self.detail_scroll = 0;
    }

    pub fn open_create(&mut self) {
        self.form = ApplicationForm::blank();
        self.modal = Modal::Form(FormMode::Creating);
    }

    /// Edit the selected application. No-op when the view is empty.
    pub fn open_edit(&mut self) {
        let Some(record) = self.selected_record().cloned() else {
            return;
        };
        self.form = ApplicationForm::from_record(&record);
        self.modal = Modal::Form(FormMode::Editing {
            application_id: record.application_id,
        });
    }

    /// Ask for confirmation before deleting the selected application.
    pub fn request_delete(&mut self) {
        let Some(record) = self.selected_record() else {
            return;
        };
        self.modal = Modal::ConfirmDelete {
            application_id: record.application_id.clone(),
        };
    }

    /// Dismiss whatever modal is up, discarding edits and field errors.
    pub fn close_modal(&mut self) {
        self.modal = Modal::Closed;
        self.form = ApplicationForm::blank();
    }

    /// Validate and hand back the create or update to run. On validation
    /// failure the form stays open with field-keyed errors and nothing goes
    /// over the wire.
    pub fn submit(&mut self) -> Option<Effect> {
        let Modal::Form(mode) = self.modal.clone() else {
            return None;
        };
        if self.submitting || !self.form.validate() {
            return None;
        }
        self.submitting = true;
        let draft = self.form.to_draft();
        Some(match mode {
            FormMode::Creating => Effect::Create(draft),
            FormMode::Editing { application_id } => Effect::Update {
                application_id,
                draft,
            },
        })
    }

    /// Confirmed delete. The dialog closes at once; the row disappears only
    /// when the server acknowledges.
    pub fn confirm_delete(&mut self) -> Option<Effect> {
        let Modal::ConfirmDelete { application_id } = self.modal.clone() else {
            return None;
        };
        self.modal = Modal::Closed;
        Some(Effect::Delete { application_id })
    }

    pub fn refresh(&mut self) -> Effect {
        self.loading = true;
        Effect::Refresh
    }

    pub fn set_message(&mut self, kind: MessageKind, text: impl Into<String>, now: Instant) {
        self.message = Some(StatusMessage {
            kind,
            text: text.into(),
            shown_at: now,
        });
    }

    /// Expire the transient message. Called on every UI tick.
    pub fn tick(&mut self, now: Instant) {
        if let Some(message) = &self.message {
            if now.duration_since(message.shown_at) >= MESSAGE_TTL {
                self.message = None;
            }
        }
    }

    /// Reconcile a completed operation into local state. Returns a follow-up
    /// effect when one is needed: a create that did not echo the record
    /// forces a refresh, because only the server knows the assigned id.
    pub fn apply_outcome(&mut self, outcome: OpOutcome, now: Instant) -> Option<Effect> {
        match outcome {
            OpOutcome::Listed(Ok(records)) => {
                let count = records.len();
                self.records = records;
                self.loading = false;
                self.clamp_selection();
                self.set_message(
                    MessageKind::Success,
                    format!("Loaded {count} application{}", plural(count)),
                    now,
                );
                None
            }
            OpOutcome::Listed(Err(err)) => {
                // Keep whatever was already cached; a failed refresh carries
                // no authority over the list.
                self.loading = false;
                self.set_message(MessageKind::Error, format!("Refresh failed: {err}"), now);
                None
            }
            OpOutcome::Created(Ok(CreateOutcome::Created(record))) => {
                self.submitting = false;
                self.upsert(record);
                self.close_modal();
                self.set_message(MessageKind::Success, "Application added", now);
                None
            }
            OpOutcome::Created(Ok(CreateOutcome::Unknown)) => {
                self.submitting = false;
                self.close_modal();
                self.loading = true;
                self.set_message(MessageKind::Success, "Application added", now);
                Some(Effect::Refresh)
            }
            OpOutcome::Created(Err(err)) => {
                // The form stays open with the typed values intact.
                self.submitting = false;
                self.set_message(
                    MessageKind::Error,
                    format!("Failed to create application: {err}"),
                    now,
                );
                None
            }
            OpOutcome::Updated {
                application_id,
                draft,
                result,
            } => match result {
                Ok(()) => {
                    self.submitting = false;
                    // A record deleted while the update was in flight has
                    // nothing to merge into; the ack still stands.
                    if let Some(existing) = self
                        .records
                        .iter_mut()
                        .find(|r| r.application_id == application_id)
                    {
                        existing.apply_draft(&draft);
                    }
                    self.close_modal();
                    self.set_message(MessageKind::Success, "Application updated", now);
                    None
                }
                Err(err) => {
                    self.submitting = false;
                    self.set_message(
                        MessageKind::Error,
                        format!("Failed to update application: {err}"),
                        now,
                    );
                    None
                }
            },
            OpOutcome::Deleted {
                application_id,
                result,
            } => match result {
                Ok(()) => {
                    self.records.retain(|r| r.application_id != application_id);
                    self.clamp_selection();
                    self.set_message(MessageKind::Success, "Application deleted", now);
                    None
                }
                Err(err) => {
                    self.set_message(
                        MessageKind::Error,
                        format!("Failed to delete application: {err}"),
                        now,
                    );
                    None
                }
            },
        }
    }

    // Replace by id if present, append otherwise. A create echo for a record
    // already held must not duplicate the row.
    fn upsert(&mut self, record: ApplicationRecord) {
        match self
            .records
            .iter_mut()
            .find(|r| r.application_id == record.application_id)
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Explains an empty list pane: nothing loaded yet, nothing at all, or
    /// everything filtered out.
    pub fn empty_notice(&self) -> Option<&'static str> {
        if !self.visible().is_empty() {
            return None;
        }
        if self.records.is_empty() {
            if self.loading {
                Some("Loading applications...")
            } else {
                Some("No applications yet. Press 'a' to add your first one.")
            }
        } else {
            Some("No applications match the current search and filter.")
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}
