/// Crawl loop phases
///
/// One harvest run moves through these phases. Every page goes through a
/// FETCHING -> PARSING -> YIELDING cycle; the run is DONE once the frontier
/// is empty and nothing is in flight.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// The seed request has been built from the search query
    Seeded,

    /// Waiting on the fetch collaborator for at least one page
    Fetching,

    /// A fetched body is being turned into a feed document
    Parsing,

    /// Records of the current page are being handed out
    Yielding,

    /// Frontier empty and no fetch in flight
    Done,
}

impl CrawlState {
    /// Returns true once the run can produce no more records
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if moving from `self` to `next` is a legal step
    ///
    /// A fetch failure goes straight from FETCHING back to FETCHING (the next
    /// frontier entry) or to DONE. A stop signal can end the run from any phase.
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        use CrawlState::*;
        match (self, next) {
            (Done, _) => false,
            (_, Done) => true,
            (Seeded, Fetching) => true,
            (Fetching, Fetching) | (Fetching, Parsing) => true,
            (Parsing, Yielding) | (Parsing, Fetching) => true,
            (Yielding, Yielding) | (Yielding, Fetching) => true,
            _ => false,
        }
    }

    /// Short lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Yielding => "yielding",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
