//! Optimistic status transitions with rollback.
//!
//! A [`StatusBoard`] holds the records a dashboard view shows. A status
//! change is applied locally first, then sent to the remote API; if the
//! remote call fails the previous status is restored. Concurrent edits to the
//! same record are last-write-wins: a rollback only restores the previous
//! status while the record still holds the optimistic one.

use std::fmt::Debug;
use std::future::Future;

use serde::Serialize;

use crate::error::{Result, TutorlyError};
use crate::models::{Booking, BookingStatus, User, UserStatus};

/// A record whose status can be changed from a dashboard.
pub trait HasStatus {
    type Status: Copy + PartialEq + Debug;

    fn id(&self) -> &str;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
}

impl HasStatus for Booking {
    type Status = BookingStatus;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> BookingStatus {
        self.status
    }

    fn set_status(&mut self, status: BookingStatus) {
        self.status = status;
    }
}

impl HasStatus for User {
    type Status = UserStatus;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> UserStatus {
        self.status
    }

    fn set_status(&mut self, status: UserStatus) {
        self.status = status;
    }
}

/// An applied but unconfirmed status change.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a pending change must be committed or rolled back"]
pub struct PendingChange<S> {
    id: String,
    previous: S,
    optimistic: S,
}

impl<S: Copy> PendingChange<S> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn previous(&self) -> S {
        self.previous
    }
}

/// Records shown in a dashboard view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StatusBoard<T> {
    items: Vec<T>,
}

impl<T: HasStatus> StatusBoard<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.iter_mut().find(|item| item.id() == id)
    }

    /// Set the status locally. `None` if no record has this id.
    pub fn apply(&mut self, id: &str, status: T::Status) -> Option<PendingChange<T::Status>> {
        let item = self.get_mut(id)?;
        let previous = item.status();
        item.set_status(status);
        Some(PendingChange {
            id: id.to_string(),
            previous,
            optimistic: status,
        })
    }

    /// Restore the previous status, unless another change already replaced
    /// the optimistic one.
    pub fn rollback(&mut self, change: PendingChange<T::Status>) -> bool {
        match self.get_mut(&change.id) {
            Some(item) if item.status() == change.optimistic => {
                item.set_status(change.previous);
                true
            }
            _ => false,
        }
    }

    /// Keep the change. If the server returned its copy of the record, it
    /// replaces the local one.
    pub fn commit(&mut self, change: PendingChange<T::Status>, confirmed: Option<T>) {
        if let Some(confirmed) = confirmed {
            if confirmed.id() == change.id {
                if let Some(item) = self.get_mut(&change.id) {
                    *item = confirmed;
                }
            }
        }
    }

    /// Apply, call the remote API, then commit or roll back.
    ///
    /// On failure the board is restored and the remote error is returned.
    pub async fn transition<F, Fut>(&mut self, id: &str, status: T::Status, remote: F) -> Result<&T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let change = self
            .apply(id, status)
            .ok_or_else(|| TutorlyError::NotFound(format!("record {}", id)))?;

        match remote().await {
            Ok(confirmed) => {
                tracing::debug!(id = %id, status = ?status, "Status change confirmed");
                self.commit(change, Some(confirmed));
            }
            Err(e) => {
                tracing::warn!(
                    id = %id,
                    status = ?status,
                    previous = ?change.previous,
                    error = %e,
                    "Status change failed, rolling back"
                );
                self.rollback(change);
                return Err(e);
            }
        }

        self.get(id)
            .ok_or_else(|| TutorlyError::NotFound(format!("record {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(id: &str, status: BookingStatus) -> Booking {
        Booking {
            id: id.to_string(),
            date_time: "2025-03-01T10:00:00Z".parse().unwrap(),
            status,
            created_at: None,
            student_id: "s1".to_string(),
            tutor_id: "t1".to_string(),
            tutor: None,
            student: None,
        }
    }

    fn board() -> StatusBoard<Booking> {
        StatusBoard::new(vec![
            booking("b1", BookingStatus::Pending),
            booking("b2", BookingStatus::Confirmed),
        ])
    }

    #[test]
    fn apply_sets_status_immediately() {
        let mut board = board();
        let change = board.apply("b1", BookingStatus::Confirmed).unwrap();
        assert_eq!(change.previous(), BookingStatus::Pending);
        assert_eq!(board.get("b1").unwrap().status, BookingStatus::Confirmed);
        board.commit(change, None);
        assert_eq!(board.get("b1").unwrap().status, BookingStatus::Confirmed);
    }

    #[test]
    fn apply_unknown_id() {
        let mut board = board();
        assert!(board.apply("missing", BookingStatus::Cancelled).is_none());
    }

    #[test]
    fn rollback_restores_previous() {
        let mut board = board();
        let change = board.apply("b2", BookingStatus::Cancelled).unwrap();
        assert!(board.rollback(change));
        assert_eq!(board.get("b2").unwrap().status, BookingStatus::Confirmed);
    }

    #[test]
    fn rollback_keeps_newer_write() {
        let mut board = board();
        let first = board.apply("b1", BookingStatus::Confirmed).unwrap();
        let _second = board.apply("b1", BookingStatus::Cancelled).unwrap();
        assert!(!board.rollback(first));
        assert_eq!(board.get("b1").unwrap().status, BookingStatus::Cancelled);
    }

    #[test]
    fn commit_takes_server_copy() {
        let mut board = board();
        let change = board.apply("b1", BookingStatus::Confirmed).unwrap();
        let mut server = booking("b1", BookingStatus::Confirmed);
        server.tutor_id = "t9".to_string();
        board.commit(change, Some(server));
        assert_eq!(board.get("b1").unwrap().tutor_id, "t9");
    }

    #[tokio::test]
    async fn transition_success() {
        let mut board = board();
        let updated = board
            .transition("b1", BookingStatus::Completed, || async {
                Ok(booking("b1", BookingStatus::Completed))
            })
            .await
            .unwrap();
        assert_eq!(updated.status, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn transition_failure_rolls_back() {
        let mut board = board();
        let err = board
            .transition("b2", BookingStatus::Cancelled, || async {
                Err(TutorlyError::Upstream {
                    status: 500,
                    body: "down".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TutorlyError::Upstream { status: 500, .. }));
        assert_eq!(board.get("b2").unwrap().status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn transition_unknown_record_skips_remote() {
        let mut board = board();
        let mut called = false;
        let result = board
            .transition("zzz", BookingStatus::Cancelled, || {
                called = true;
                async { Ok(booking("zzz", BookingStatus::Cancelled)) }
            })
            .await;
        assert!(matches!(result, Err(TutorlyError::NotFound(_))));
        assert!(!called);
    }

    #[test]
    fn board_serializes_as_list() {
        let json = serde_json::to_value(board()).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 2);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn user(id: usize, status: UserStatus) -> User {
        User {
            id: format!("u{}", id),
            name: format!("User {}", id),
            email: format!("u{}@example.com", id),
            phone: None,
            role: "STUDENT".to_string(),
            status,
            created_at: None,
            updated_at: None,
        }
    }

    fn arb_status() -> impl Strategy<Value = UserStatus> {
        prop::sample::select(vec![UserStatus::Active, UserStatus::Inactive, UserStatus::Banned])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Apply followed by rollback leaves the board exactly as it was.
        #[test]
        fn prop_rollback_restores_board(
            statuses in prop::collection::vec(arb_status(), 1..10),
            pick in any::<prop::sample::Index>(),
            target in arb_status(),
        ) {
            let users: Vec<User> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| user(i, *s))
                .collect();
            let original = StatusBoard::new(users.clone());
            let mut board = StatusBoard::new(users);

            let id = format!("u{}", pick.index(statuses.len()));
            let change = board.apply(&id, target).expect("id exists");
            prop_assert!(board.rollback(change));
            prop_assert_eq!(board, original);
        }

        /// A failed remote call never leaves a trace on the board.
        #[test]
        fn prop_failed_transition_is_invisible(
            statuses in prop::collection::vec(arb_status(), 1..10),
            pick in any::<prop::sample::Index>(),
            target in arb_status(),
        ) {
            let users: Vec<User> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| user(i, *s))
                .collect();
            let original = StatusBoard::new(users.clone());
            let mut board = StatusBoard::new(users);

            let id = format!("u{}", pick.index(statuses.len()));
            let result = tokio_test::block_on(board.transition(&id, target, || async {
                Err(TutorlyError::Decode("rejected".to_string()))
            }));
            prop_assert!(result.is_err());
            prop_assert_eq!(board, original);
        }

        /// Only the targeted record changes.
        #[test]
        fn prop_apply_touches_one_record(
            statuses in prop::collection::vec(arb_status(), 1..10),
            pick in any::<prop::sample::Index>(),
            target in arb_status(),
        ) {
            let users: Vec<User> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| user(i, *s))
                .collect();
            let mut board = StatusBoard::new(users.clone());
            let picked = pick.index(statuses.len());
            let _ = board.apply(&format!("u{}", picked), target);

            for (i, item) in board.items().iter().enumerate() {
                if i == picked {
                    prop_assert_eq!(item.status, target);
                } else {
                    prop_assert_eq!(item.status, users[i].status);
                }
            }
        }
    }
}
