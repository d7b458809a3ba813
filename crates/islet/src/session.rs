// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::ingest::Relation;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct SessionStore {
    relations: DashMap<Uuid, Arc<Relation>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            relations: DashMap::new(),
        }
    }

    pub fn open(&self, relation: Relation) -> Uuid {
        let session = Uuid::new_v4();
        debug!(%session, filename = relation.filename(), "opening analysis session");
        self.relations.insert(session, Arc::new(relation));
        session
    }

    pub fn attach(&self, session: Uuid, relation: Relation) -> Arc<Relation> {
        let relation = Arc::new(relation);
        debug!(%session, filename = relation.filename(), "replacing session relation");
        self.relations.insert(session, Arc::clone(&relation));
        relation
    }

    pub fn relation(&self, session: &Uuid) -> Option<Arc<Relation>> {
        self.relations
            .get(session)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn end(&self, session: &Uuid) -> bool {
        let removed = self.relations.remove(session).is_some();
        if removed {
            debug!(%session, "ended analysis session");
        }
        removed
    }

    pub fn active_sessions(&self) -> usize {
        self.relations.len()
    }
}
