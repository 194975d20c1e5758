// Entities: documents, reviewers, activity samples

use crate::error::{DocboardError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A unit of work tracked by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub header: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub target: i64,
    pub limit: i64,
    pub reviewer: Option<Reviewer>,
}

impl Document {
    /// The empty document a create form starts from.
    pub fn blank() -> Self {
        Document {
            id: String::new(),
            header: String::new(),
            doc_type: DocumentType::Analysis,
            status: DocumentStatus::NotStarted,
            target: 0,
            limit: 0,
            reviewer: None,
        }
    }

    pub fn reviewer_id(&self) -> Option<&str> {
        self.reviewer.as_ref().map(|r| r.id.as_str())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::blank()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: String,
    pub name: String,
}

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = DocboardError;

            fn from_str(s: &str) -> Result<Self> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label() == s)
                    .ok_or_else(|| {
                        DocboardError::Validation(format!(
                            "'{s}' is not a valid {}",
                            stringify!($name)
                        ))
                    })
            }
        }
    };
}

labelled_enum! {
    /// Document category.
    DocumentType {
        Analysis => "Analysis",
        Appendix => "Appendix",
        Cover => "Cover",
        Design => "Design",
        Financial => "Financial",
        Hr => "HR",
        Layout => "Layout",
        Legal => "Legal",
        Narrative => "Narrative",
        Ops => "Ops",
        Qa => "QA",
        Research => "Research",
        Security => "Security",
        Support => "Support",
        Technical => "Technical",
        Timeline => "Timeline",
        Training => "Training",
    }
}

labelled_enum! {
    /// Workflow status of a document.
    DocumentStatus {
        NotStarted => "Not Started",
        InProcess => "In Process",
        Done => "Done",
    }
}

/// One day of traffic, split by platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySample {
    pub date: NaiveDate,
    pub mobile: u32,
    pub desktop: u32,
}

impl ActivitySample {
    pub fn total(&self) -> u64 {
        u64::from(self.mobile) + u64::from(self.desktop)
    }
}
