/// Crawl state definitions for the pagination state machine
///
/// This module defines the phases a shard traversal moves through and the
/// reasons it can stop.
use std::fmt;

/// Why a traversal stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    // ===== Natural End =====
    /// The last page had no next-page reference
    Exhausted,

    /// A page parsed fine but listed no entries
    NoEntries,

    // ===== Page-Level Failures =====
    /// The expected structured-data block was missing
    MalformedPage,

    /// The page could not be fetched after retries
    FetchFailed,

    /// The next-page reference could not be resolved to a URL
    InvalidNextPage,

    // ===== Budgets and Signals =====
    /// The configured page budget was used up
    PageBudget,

    /// The configured record budget was used up
    RecordBudget,

    /// An external stop signal arrived between pages
    Cancelled,
}

impl Termination {
    /// Returns true if the traversal ran to the site's natural end
    pub fn is_natural(&self) -> bool {
        matches!(self, Self::Exhausted | Self::NoEntries)
    }

    /// Returns true if a page-level failure ended the traversal
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::MalformedPage | Self::FetchFailed | Self::InvalidNextPage
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::NoEntries => "no_entries",
            Self::MalformedPage => "malformed_page",
            Self::FetchFailed => "fetch_failed",
            Self::InvalidNextPage => "invalid_next_page",
            Self::PageBudget => "page_budget",
            Self::RecordBudget => "record_budget",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns all termination reasons
    pub fn all() -> Vec<Self> {
        vec![
            Self::Exhausted,
            Self::NoEntries,
            Self::MalformedPage,
            Self::FetchFailed,
            Self::InvalidNextPage,
            Self::PageBudget,
            Self::RecordBudget,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phase of one shard traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// Downloading the current result page
    FetchPage,

    /// Extracting listings and the next-page reference
    ParsePage,

    /// Enriching and persisting the page's listings
    Dispatch,

    /// Moving the cursor to the next page
    AdvancePage,

    /// Traversal finished
    Terminated(Termination),
}

impl CrawlState {
    /// Checks whether the machine may move from `self` to `next`
    ///
    /// ```text
    /// FetchPage -> ParsePage -> Dispatch -> AdvancePage -> FetchPage
    ///     \            \           \            \
    ///      `------------`-----------`------------`--> Terminated
    /// ```
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        use CrawlState::*;

        match (self, next) {
            (Terminated(_), _) => false,
            (_, Terminated(_)) => true,
            (FetchPage, ParsePage) => true,
            (ParsePage, Dispatch) => true,
            (Dispatch, AdvancePage) => true,
            (AdvancePage, FetchPage) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchPage => "fetch_page",
            Self::ParsePage => "parse_page",
            Self::Dispatch => "dispatch",
            Self::AdvancePage => "advance_page",
            Self::Terminated(_) => "terminated",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated(reason) => write!(f, "terminated({})", reason),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
