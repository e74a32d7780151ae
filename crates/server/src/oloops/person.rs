//! Single-person lookup loop, paired with a single-slot shuttle.

use std::sync::Arc;

use openset_async::{CellCtl, OpenLoop, Shuttle};
use openset_core::{ErrorClass, ErrorCode, QueryError};
use openset_db::Table;

/// The person lookup result delivered through the shuttle.
pub type PersonResult = Result<serde_json::Value, QueryError>;

pub struct OpenLoopPerson {
    shuttle: Arc<Shuttle<PersonResult>>,
    table: Arc<Table>,
    uuid: i64,
    replied: bool,
}

impl OpenLoopPerson {
    pub fn new(shuttle: Arc<Shuttle<PersonResult>>, table: Arc<Table>, uuid: i64) -> Self {
        Self {
            shuttle,
            table,
            uuid,
            replied: false,
        }
    }

    fn reply(&mut self, result: PersonResult) {
        if !self.replied {
            self.replied = true;
            self.shuttle.reply(result);
        }
    }
}

impl OpenLoop for OpenLoopPerson {
    fn owning_table(&self) -> &str {
        self.table.name()
    }

    fn run(&mut self, ctl: &mut CellCtl) -> bool {
        let found = self
            .table
            .get_partition(ctl.partition())
            .and_then(|data| {
                let guard = data.read().unwrap();
                guard
                    .person_by_id(self.uuid)
                    .map(|person| person.to_json(&self.table.columns()))
            });

        match found {
            Some(person) => self.reply(Ok(person)),
            None => self.reply(Err(QueryError::new(
                ErrorClass::RunTime,
                ErrorCode::ItemNotFound,
                "person not found",
            ))),
        }
        ctl.suicide();
        false
    }

    fn partition_removed(&mut self, _ctl: &CellCtl) {
        self.reply(Err(QueryError::route(
            "partition migrated - please re-issue the request",
        )));
    }
}
