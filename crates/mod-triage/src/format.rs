use triage_domain::{BatchOutcome, DraftDispatch, ThreadRecord};

pub const NO_UNREAD: &str = "No unread threads found in your inbox.";

const RULE_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Compact,
    Full,
}

impl Format {
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("full") => Self::Full,
            _ => Self::Compact,
        }
    }
}

pub fn format_threads(records: &[ThreadRecord], fmt: Format) -> String {
    match fmt {
        Format::Compact => {
            if records.is_empty() {
                return NO_UNREAD.to_string();
            }
            let rule = "-".repeat(RULE_WIDTH);
            records
                .iter()
                .map(|r| format!("{r}\n{rule}"))
                .collect::<Vec<_>>()
                .join("\n\n")
        }
        Format::Full => to_json(records),
    }
}

pub fn format_outcome(outcome: &BatchOutcome, fmt: Format) -> String {
    match fmt {
        Format::Compact => outcome.summary(),
        Format::Full => to_json(outcome),
    }
}

pub fn format_dispatch(dispatch: &DraftDispatch, fmt: Format) -> String {
    match fmt {
        Format::Compact => dispatch.to_string(),
        Format::Full => to_json(dispatch),
    }
}

fn to_json<T: serde::Serialize + ?Sized>(val: &T) -> String {
    serde_json::to_string(val).unwrap_or_else(|e| format!("serialization error: {e}"))
}
