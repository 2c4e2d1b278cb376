//! A revision-tracked mutation wrapper implementing the client-prediction / server-reconciliation
//! model of the authority protocol: a client may hold a *predicted* revision ahead of the last
//! confirmed revision, and the server echo (or lack of one) decides whether the prediction is
//! kept, replaced, or rolled back.

use std::cmp::Ordering;
use std::num::NonZeroU64;
use std::ops::Deref;

use crate::GameSide;

/// The revision tracking number type for [`MutWatcher`].
pub type RevisionNumber = NonZeroU64;

/// Holds `T` and keeps track of mutations done to it, distinguishing locally predicted
/// mutations from ones already confirmed by the authoritative side.
#[derive(Clone, Debug, Hash)]
pub struct MutWatcher<T> {
    current_revision: RevisionNumber,
    predicted_revision: Option<RevisionNumber>,
    inner: T,
}

impl<T> MutWatcher<T> {
    /// The default revision for a brand new [`MutWatcher`].
    pub const INITIAL_REVISION_NUMBER: RevisionNumber = RevisionNumber::MIN;

    fn increment(num: &mut RevisionNumber) {
        *num = num.checked_add(1).unwrap();
    }

    /// Constructs a brand new [`MutWatcher`] assuming no previous revisions.
    pub fn new(inner: T) -> Self {
        Self {
            current_revision: Self::INITIAL_REVISION_NUMBER,
            predicted_revision: None,
            inner,
        }
    }

    /// Constructs a [`MutWatcher`] from a value already known at a given revision.
    pub fn new_saved(inner: T, stored_revision: RevisionNumber) -> Self {
        Self {
            current_revision: stored_revision,
            predicted_revision: None,
            inner,
        }
    }

    /// Constructs a [`MutWatcher`] with the same revision state as this one but a different inner
    /// value. Used when splitting a chunk's voxel array off into a fresh chunk during island
    /// fragment extraction: the fragment inherits the source chunk's revision lineage.
    pub fn new_with_same_revision<U>(&self, inner: U) -> MutWatcher<U> {
        MutWatcher::<U> {
            current_revision: self.current_revision,
            predicted_revision: self.predicted_revision,
            inner,
        }
    }

    /// Extracts the inner stored value.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Accesses the inner value without mutating.
    #[inline]
    pub fn read(&self) -> &T {
        &self.inner
    }

    /// Accesses the last known non-predicted (server-confirmed) revision number.
    #[inline]
    pub fn last_known_revision(&self) -> RevisionNumber {
        self.current_revision
    }

    /// Accesses the predicted revision number, if currently predicting one.
    #[inline]
    pub fn predicted_revision(&self) -> Option<RevisionNumber> {
        self.predicted_revision
    }

    /// Accesses the locally current revision number, predicted or not.
    #[inline]
    pub fn local_revision(&self) -> RevisionNumber {
        self.predicted_revision.unwrap_or(self.current_revision)
    }

    /// Checks if the current state of this cell is an unconfirmed prediction.
    #[inline]
    pub fn is_prediction(&self) -> bool {
        self.predicted_revision.is_some()
    }

    /// Compares the revisions of two cells. At equal local revision, a confirmed revision is
    /// considered newer than a predicted one. Returns `self <=> other`.
    #[inline]
    pub fn compare_revisions<U>(&self, other: &MutWatcher<U>) -> Ordering {
        match self.local_revision().cmp(&other.local_revision()) {
            Ordering::Equal => match (self.is_prediction(), other.is_prediction()) {
                (false, false) | (true, true) => Ordering::Equal,
                (false, true) => Ordering::Greater,
                (true, false) => Ordering::Less,
            },
            other => other,
        }
    }

    /// Grants mutable access to the inner value for an authoritative (server-side) mutation and
    /// advances the confirmed revision. Panics if this cell is currently predicting.
    #[inline]
    pub fn mutate_stored(&mut self) -> &mut T {
        assert!(
            self.predicted_revision.is_none(),
            "mutate_stored called on a MutWatcher that is currently predicting"
        );
        Self::increment(&mut self.current_revision);
        &mut self.inner
    }

    /// Grants mutable access to the inner value for a client-side optimistic mutation, advancing
    /// the predicted revision. The caller is responsible for sending one request to the server
    /// per call here, matched by one `mutate_stored` server-side per applied request, or
    /// [`Self::mutate_from_server_revision`] will never observe the prediction as caught up.
    #[inline]
    pub fn mutate_predicted(&mut self) -> &mut T {
        match &mut self.predicted_revision {
            Some(rev) => Self::increment(rev),
            None => self.predicted_revision = Some(self.current_revision.checked_add(1).unwrap()),
        }
        Self::increment(&mut self.current_revision);
        &mut self.inner
    }

    /// Calls [`Self::mutate_stored`] on the server side and [`Self::mutate_predicted`] on the
    /// client side.
    #[inline]
    pub fn mutate_sided(&mut self, side: GameSide) -> &mut T {
        match side {
            GameSide::Server => self.mutate_stored(),
            GameSide::Client => self.mutate_predicted(),
        }
    }

    /// Mutation access that does not advance any revision, for changes that keep the logical
    /// contents identical (e.g. quad-index slot compaction).
    pub fn mutate_without_revision(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Client-side: accepts a server-confirmed revision if it is new enough to settle the current
    /// prediction (or supersede the last confirmed value when there is no prediction in flight).
    /// Returns `Some` with mutable access when the caller should overwrite the inner value with
    /// the server's data; `None` means the server message is stale and must be ignored.
    pub fn mutate_from_server_revision(&mut self, remote_revision: RevisionNumber) -> Option<&mut T> {
        let do_update = match self.predicted_revision {
            None => self.current_revision < remote_revision,
            Some(predicted) => predicted <= remote_revision,
        };
        if do_update {
            self.predicted_revision = None;
            self.current_revision = remote_revision;
            Some(&mut self.inner)
        } else {
            None
        }
    }
}

impl<T> Deref for MutWatcher<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T, U> AsRef<T> for MutWatcher<U>
where
    T: ?Sized,
    <MutWatcher<U> as Deref>::Target: AsRef<T>,
{
    fn as_ref(&self) -> &T {
        self.deref().as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prediction_round_trip_confirms() {
        let mut client = MutWatcher::new(0u8);
        *client.mutate_predicted() = 5;
        assert!(client.is_prediction());
        let predicted_rev = client.predicted_revision().unwrap();
        let updated = client.mutate_from_server_revision(predicted_rev);
        assert!(updated.is_some());
        assert!(!client.is_prediction());
    }

    #[test]
    fn stale_server_revision_is_ignored() {
        let mut client = MutWatcher::new(0u8);
        *client.mutate_predicted() = 5;
        let stale = RevisionNumber::new(1).unwrap();
        assert!(client.mutate_from_server_revision(stale).is_none());
    }

    #[test]
    fn mutate_stored_panics_while_predicting() {
        let mut client = MutWatcher::new(0u8);
        *client.mutate_predicted() = 1;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut client = client.clone();
            client.mutate_stored();
        }));
        assert!(result.is_err());
    }
}
