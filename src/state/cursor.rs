use crate::state::{CrawlState, Termination};
use crate::HarvestError;
use url::Url;

/// Traversal pointer for one shard
///
/// Owned by the coordinator. The current URL only moves forward in
/// [`CrawlCursor::advance`], after the page's listings have been drained.
#[derive(Debug, Clone)]
pub struct CrawlCursor {
    current: Url,
    next: Option<Url>,
    shard: Option<String>,
    page: u32,
    state: CrawlState,
}

impl CrawlCursor {
    /// Creates a cursor positioned on the first page
    pub fn new(start: Url, shard: Option<String>) -> Self {
        Self {
            current: start,
            next: None,
            shard,
            page: 1,
            state: CrawlState::FetchPage,
        }
    }

    pub fn current(&self) -> &Url {
        &self.current
    }

    pub fn shard(&self) -> Option<&str> {
        self.shard.as_deref()
    }

    /// One-based number of the current page
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    /// Records the next-page URL discovered on the current page
    pub fn set_next(&mut self, next: Option<Url>) {
        self.next = next;
    }

    /// Moves the machine to `next`, rejecting transitions the graph does not allow
    pub fn transition(&mut self, next: CrawlState) -> Result<(), HarvestError> {
        if !self.state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        tracing::trace!(from = %self.state, to = %next, page = self.page, "cursor transition");
        self.state = next;
        Ok(())
    }

    /// Terminates the traversal for `reason`
    pub fn terminate(&mut self, reason: Termination) -> Result<(), HarvestError> {
        self.transition(CrawlState::Terminated(reason))
    }

    /// Moves to the previously recorded next page and re-enters `FetchPage`
    ///
    /// Returns `Ok(false)` without moving if no next page was recorded.
    pub fn advance(&mut self) -> Result<bool, HarvestError> {
        let Some(next) = self.next.take() else {
            return Ok(false);
        };
        self.transition(CrawlState::FetchPage)?;
        self.current = next;
        self.page += 1;
        Ok(true)
    }
}
