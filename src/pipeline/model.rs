use serde::Serialize;

/// One (page url, occurrence count) pair collected from the detail listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataEntry {
    url: String,
    count: u32,
}

impl DataEntry {
    pub fn new(url: impl Into<String>, count: u32) -> Self {
        Self {
            url: url.into(),
            count,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// An accessibility error discovered in the exported report.
///
/// Documentation fields are fixed at construction. Entries can only be
/// appended, and `total_errors` is recomputed on every append.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    instance_count: u32,
    error_name: String,
    error_category: String,
    documentation: String,
    why_it_matters: String,
    how_to_fix_it: String,
    data_entries: Vec<DataEntry>,
    total_errors: u64,
}

impl ErrorRecord {
    pub fn new(
        instance_count: u32,
        error_name: impl Into<String>,
        error_category: impl Into<String>,
        documentation: ErrorDocumentation,
    ) -> Self {
        Self {
            instance_count,
            error_name: error_name.into(),
            error_category: error_category.into(),
            documentation: documentation.documentation,
            why_it_matters: documentation.why_it_matters,
            how_to_fix_it: documentation.how_to_fix_it,
            data_entries: Vec::new(),
            total_errors: 0,
        }
    }

    pub fn add_data_entry(&mut self, url: impl Into<String>, count: u32) {
        self.data_entries.push(DataEntry::new(url, count));
        self.total_errors = self.data_entries.iter().map(|e| u64::from(e.count)).sum();
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn error_name(&self) -> &str {
        &self.error_name
    }

    pub fn error_category(&self) -> &str {
        &self.error_category
    }

    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    pub fn why_it_matters(&self) -> &str {
        &self.why_it_matters
    }

    pub fn how_to_fix_it(&self) -> &str {
        &self.how_to_fix_it
    }

    pub fn data_entries(&self) -> &[DataEntry] {
        &self.data_entries
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }
}

/// The three text blocks read from an error's documentation page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDocumentation {
    pub documentation: String,
    pub why_it_matters: String,
    pub how_to_fix_it: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub error_name: String,
    pub total_errors: u64,
}

impl From<&ErrorRecord> for ErrorSummary {
    fn from(error: &ErrorRecord) -> Self {
        Self {
            error_name: error.error_name.clone(),
            total_errors: error.total_errors,
        }
    }
}

pub fn summarize(errors: &[ErrorRecord]) -> Vec<ErrorSummary> {
    errors.iter().map(ErrorSummary::from).collect()
}
