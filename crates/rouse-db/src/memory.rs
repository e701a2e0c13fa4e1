//! In-memory repositories. Each entity type owns one `RwLock`-guarded map;
//! there is no lock spanning entity types.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use rouse_types::models::{MorningCall, Relationship, User};
use uuid::Uuid;

use crate::repository::{
    MorningCallRepository, RelationshipRepository, StoreError, StoreResult, UserRepository,
};

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| StoreError::Backend(anyhow!("store lock poisoned: {}", e)))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| StoreError::Backend(anyhow!("store lock poisoned: {}", e)))
}

// -- Users --

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserRepository for MemoryUserRepository {
    fn create(&self, user: &User) -> StoreResult<()> {
        let mut users = write(&self.users)?;
        if users.contains_key(&user.id) {
            return Err(StoreError::AlreadyExists("user"));
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::AlreadyExists("username"));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::AlreadyExists("email"));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<User> {
        read(&self.users)?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    fn find_by_username(&self, username: &str) -> StoreResult<User> {
        read(&self.users)?
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    fn find_by_email(&self, email: &str) -> StoreResult<User> {
        read(&self.users)?
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    fn exists_by_username(&self, username: &str) -> StoreResult<bool> {
        Ok(read(&self.users)?.values().any(|u| u.username == username))
    }

    fn exists_by_email(&self, email: &str) -> StoreResult<bool> {
        Ok(read(&self.users)?.values().any(|u| u.email == email))
    }

    fn update(&self, user: &User) -> StoreResult<()> {
        let mut users = write(&self.users)?;
        if !users.contains_key(&user.id) {
            return Err(StoreError::NotFound("user"));
        }
        let others = users.values().filter(|u| u.id != user.id);
        for other in others {
            if other.username == user.username {
                return Err(StoreError::AlreadyExists("username"));
            }
            if other.email == user.email {
                return Err(StoreError::AlreadyExists("email"));
            }
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        write(&self.users)?
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("user"))
    }
}

// -- Relationships --

#[derive(Default)]
pub struct MemoryRelationshipRepository {
    relationships: RwLock<HashMap<Uuid, Relationship>>,
}

impl MemoryRelationshipRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelationshipRepository for MemoryRelationshipRepository {
    fn create(&self, relationship: &Relationship) -> StoreResult<()> {
        let mut relationships = write(&self.relationships)?;
        if relationships.contains_key(&relationship.id) {
            return Err(StoreError::AlreadyExists("relationship"));
        }
        if relationship.status.is_active() {
            let occupied = relationships.values().any(|r| {
                r.status.is_active() && r.joins(relationship.requester_id, relationship.receiver_id)
            });
            if occupied {
                return Err(StoreError::AlreadyExists("relationship"));
            }
        }
        relationships.insert(relationship.id, relationship.clone());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<Relationship> {
        read(&self.relationships)?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("relationship"))
    }

    fn update(&self, relationship: &Relationship) -> StoreResult<()> {
        let mut relationships = write(&self.relationships)?;
        match relationships.get_mut(&relationship.id) {
            Some(existing) => {
                *existing = relationship.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound("relationship")),
        }
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        write(&self.relationships)?
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("relationship"))
    }

    fn list_all(&self) -> StoreResult<Vec<Relationship>> {
        let mut all: Vec<Relationship> = read(&self.relationships)?.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }
}

// -- Morning calls --

#[derive(Default)]
pub struct MemoryMorningCallRepository {
    calls: RwLock<HashMap<Uuid, MorningCall>>,
}

impl MemoryMorningCallRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MorningCallRepository for MemoryMorningCallRepository {
    fn create(&self, call: &MorningCall) -> StoreResult<()> {
        let mut calls = write(&self.calls)?;
        if calls.contains_key(&call.id) {
            return Err(StoreError::AlreadyExists("morning call"));
        }
        calls.insert(call.id, call.clone());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<MorningCall> {
        read(&self.calls)?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("morning call"))
    }

    fn update(&self, call: &MorningCall) -> StoreResult<()> {
        let mut calls = write(&self.calls)?;
        match calls.get_mut(&call.id) {
            Some(existing) => {
                *existing = call.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound("morning call")),
        }
    }

    fn delete(&self, id: Uuid) -> StoreResult<()> {
        write(&self.calls)?
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("morning call"))
    }

    fn list_all(&self) -> StoreResult<Vec<MorningCall>> {
        let mut all: Vec<MorningCall> = read(&self.calls)?.values().cloned().collect();
        all.sort_by_key(|c| c.scheduled_time);
        Ok(all)
    }
}
