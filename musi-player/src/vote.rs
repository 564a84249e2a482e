//! Vote-skip coordinator
//!
//! At most one poll per session. A poll remembers the channel's non-bot
//! member count from when it opened; the displayed requirement is
//! `max(2, count / 2)` votes while approval needs a strict majority of the
//! channel (`votes > count / 2`). A poll resolves on expiry or on an
//! explicit close, and resolution always frees the slot.

use crate::error::{Error, Result};
use crate::voice::UserId;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Outcome of [`VoteSkipCoordinator::start_poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStart {
    /// Caller is alone with the bot; skip without a poll
    SkipImmediately,
    Started { required_votes: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub votes: usize,
    pub required_votes: usize,
    /// Strict majority of the channel reached
    pub threshold_met: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollResolution {
    pub approved: bool,
    pub votes: usize,
    pub member_count: usize,
}

type ResolveCallback = Box<dyn FnOnce(PollResolution) + Send>;

struct Poll {
    id: u64,
    member_count: usize,
    required_votes: usize,
    voters: HashSet<UserId>,
    created_at: Instant,
    on_resolve: ResolveCallback,
}

impl Poll {
    fn majority(&self) -> bool {
        self.voters.len() > self.member_count / 2
    }

    fn tally(&self) -> VoteTally {
        VoteTally {
            votes: self.voters.len(),
            required_votes: self.required_votes,
            threshold_met: self.majority(),
        }
    }
}

#[derive(Default)]
struct Slot {
    poll: Option<Poll>,
    next_id: u64,
}

/// Displayed vote requirement for a channel of `member_count` non-bot users
pub fn required_votes(member_count: usize) -> usize {
    (member_count / 2).max(2)
}

pub struct VoteSkipCoordinator {
    timeout: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl VoteSkipCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.poll.is_some()
    }

    /// Open a poll for a channel of `member_count` non-bot users
    ///
    /// `on_resolve` runs exactly once, when the poll expires or is closed.
    /// With one member or fewer no poll is created and the callback is
    /// dropped unused.
    pub async fn start_poll<F>(&self, member_count: usize, on_resolve: F) -> Result<PollStart>
    where
        F: FnOnce(PollResolution) + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if slot.poll.is_some() {
            return Err(Error::PollActive);
        }
        if member_count <= 1 {
            debug!(member_count, "Vote skipped, caller is alone");
            return Ok(PollStart::SkipImmediately);
        }

        slot.next_id += 1;
        let id = slot.next_id;
        let required = required_votes(member_count);
        slot.poll = Some(Poll {
            id,
            member_count,
            required_votes: required,
            voters: HashSet::new(),
            created_at: Instant::now(),
            on_resolve: Box::new(on_resolve),
        });
        drop(slot);

        let slot = Arc::clone(&self.slot);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(resolution) = resolve(&slot, Some(id)).await {
                info!(approved = resolution.approved, votes = resolution.votes, "Vote expired");
            }
        });

        info!(member_count, required_votes = required, "Vote started");
        Ok(PollStart::Started {
            required_votes: required,
        })
    }

    /// Record a vote; repeated votes by one user count once
    pub async fn cast_vote(&self, user: UserId) -> Result<VoteTally> {
        let mut slot = self.slot.lock().await;
        let poll = slot.poll.as_mut().ok_or(Error::NoActivePoll)?;
        if !poll.voters.insert(user) {
            debug!(user = %user, "Duplicate vote ignored");
        }
        Ok(poll.tally())
    }

    /// Resolve the running poll now
    pub async fn close(&self) -> Option<PollResolution> {
        resolve(&self.slot, None).await
    }
}

/// Take the poll out of the slot and run its callback
///
/// With `only_id`, a poll that has since been replaced is left alone so a
/// late expiry timer cannot resolve a newer poll.
async fn resolve(slot: &Mutex<Slot>, only_id: Option<u64>) -> Option<PollResolution> {
    let poll = {
        let mut slot = slot.lock().await;
        match (&slot.poll, only_id) {
            (Some(poll), Some(id)) if poll.id != id => return None,
            (None, _) => return None,
            _ => {}
        }
        slot.poll.take()?
    };

    let resolution = PollResolution {
        approved: poll.majority(),
        votes: poll.voters.len(),
        member_count: poll.member_count,
    };
    debug!(
        open_ms = poll.created_at.elapsed().as_millis() as u64,
        approved = resolution.approved,
        "Poll resolved"
    );
    (poll.on_resolve)(resolution);
    Some(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (
        Arc<StdMutex<Vec<PollResolution>>>,
        impl FnOnce(PollResolution) + Send + 'static,
    ) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |r| sink.lock().unwrap().push(r))
    }

    #[tokio::test]
    async fn test_single_member_skips_without_poll() {
        let votes = VoteSkipCoordinator::new(Duration::from_secs(30));
        let (seen, callback) = recorder();

        assert_eq!(votes.start_poll(1, callback).await.unwrap(), PollStart::SkipImmediately);
        assert!(!votes.is_active().await);
        assert!(seen.lock().unwrap().is_empty());
        assert!(matches!(votes.cast_vote(UserId(1)).await, Err(Error::NoActivePoll)));
    }

    #[test]
    fn test_required_votes_floor_of_two() {
        assert_eq!(required_votes(2), 2);
        assert_eq!(required_votes(3), 2);
        assert_eq!(required_votes(5), 2);
        assert_eq!(required_votes(10), 5);
    }

    #[tokio::test]
    async fn test_only_one_poll_at_a_time() {
        let votes = VoteSkipCoordinator::new(Duration::from_secs(30));
        votes.start_poll(4, |_| {}).await.unwrap();
        assert!(matches!(votes.start_poll(4, |_| {}).await, Err(Error::PollActive)));
    }

    #[tokio::test]
    async fn test_votes_idempotent_per_user() {
        let votes = VoteSkipCoordinator::new(Duration::from_secs(30));
        votes.start_poll(5, |_| {}).await.unwrap();

        votes.cast_vote(UserId(1)).await.unwrap();
        let tally = votes.cast_vote(UserId(1)).await.unwrap();
        assert_eq!(tally.votes, 1);
        assert_eq!(tally.required_votes, 2);
        assert!(!tally.threshold_met);
    }

    #[tokio::test]
    async fn test_strict_majority_needed_for_approval() {
        // Four members: two votes meet the displayed requirement but not a majority
        let votes = VoteSkipCoordinator::new(Duration::from_secs(30));
        let (seen, callback) = recorder();
        votes.start_poll(4, callback).await.unwrap();

        votes.cast_vote(UserId(1)).await.unwrap();
        let tally = votes.cast_vote(UserId(2)).await.unwrap();
        assert_eq!(tally.votes, tally.required_votes);
        assert!(!tally.threshold_met);

        let tally = votes.cast_vote(UserId(3)).await.unwrap();
        assert!(tally.threshold_met);

        let resolution = votes.close().await.unwrap();
        assert!(resolution.approved);
        assert_eq!(seen.lock().unwrap().as_slice(), &[resolution]);
        assert!(!votes.is_active().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_rejects_and_frees_slot() {
        let votes = VoteSkipCoordinator::new(Duration::from_secs(30));
        let (seen, callback) = recorder();
        votes.start_poll(3, callback).await.unwrap();
        votes.cast_vote(UserId(1)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(!votes.is_active().await);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].approved);
        assert_eq!(seen[0].votes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_leaves_newer_poll() {
        let votes = VoteSkipCoordinator::new(Duration::from_secs(30));
        votes.start_poll(3, |_| {}).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        votes.close().await.unwrap();

        votes.start_poll(3, |_| {}).await.unwrap();
        // First poll's timer fires here
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(votes.is_active().await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!votes.is_active().await);
    }
}
