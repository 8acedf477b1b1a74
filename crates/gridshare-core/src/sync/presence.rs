//! Who else is in the spreadsheet and where their cursors are.

use std::collections::BTreeMap;

use gridshare_model::model::{CellRef, User, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCursor {
    pub user_id: UserId,
    pub username: String,
    pub cell: CellRef,
}

#[derive(Debug, Default)]
pub struct Presence {
    users: BTreeMap<UserId, User>,
    cursors: BTreeMap<UserId, RemoteCursor>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user. Returns false if they were already present.
    pub fn join(&mut self, user: User) -> bool {
        if self.users.contains_key(&user.id) {
            return false;
        }
        self.users.insert(user.id, user);
        true
    }

    /// Remove a user and their cursor.
    pub fn leave(&mut self, user_id: UserId) -> Option<User> {
        self.cursors.remove(&user_id);
        self.users.remove(&user_id)
    }

    /// Insert or move a cursor. A cursor implies presence.
    pub fn upsert_cursor(&mut self, cursor: RemoteCursor) {
        self.users.entry(cursor.user_id).or_insert_with(|| User {
            id: cursor.user_id,
            username: cursor.username.clone(),
        });
        self.cursors.insert(cursor.user_id, cursor);
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn cursors(&self) -> impl Iterator<Item = &RemoteCursor> {
        self.cursors.values()
    }

    /// First remote cursor on `cell`.
    pub fn cursor_at(&self, cell: &CellRef) -> Option<&RemoteCursor> {
        self.cursors.values().find(|c| c.cell == *cell)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
