//! `GET /v1/query/{table}/person` - single-person lookup.
//!
//! No fork here: the person's partition is deterministic, so the request
//! routes straight to the owner. Local owners run one loop with a
//! single-slot shuttle; remote owners get a synchronous relay.

use std::sync::Arc;

use axum::http::StatusCode;

use openset_async::Shuttle;
use openset_core::{hash_sid, QueryError};

use crate::oloops::{OpenLoopPerson, PersonResult};
use crate::state::AppState;
use crate::web::Message;

use super::rpc_error;

pub async fn person(state: &Arc<AppState>, message: Message, table_name: &str) {
    let mut uuid = message.param_i64("id", 0);
    if uuid == 0 {
        if let Some(sid) = message.param("sid").filter(|s| !s.is_empty()) {
            uuid = hash_sid(sid);
        }
    }
    if uuid == 0 {
        rpc_error(
            message,
            QueryError::query("person query must have an id={number} or sid={text} parameter"),
        );
        return;
    }

    if table_name.is_empty() {
        rpc_error(message, QueryError::query("missing or invalid table name"));
        return;
    }
    let Some(table) = state.db.get_table(table_name) else {
        rpc_error(message, QueryError::query("table could not be found"));
        return;
    };

    let partition = (uuid.unsigned_abs() % state.pool.partition_max() as u64) as i32;
    let Some(owner) = state.mapper.partition_map.owner_of(partition) else {
        rpc_error(
            message,
            QueryError::route("potential node failure - please re-issue the request"),
        );
        return;
    };

    if owner == state.mapper.node_id() {
        let Some(partition_loop) = state.pool.get_partition(partition) else {
            rpc_error(
                message,
                QueryError::route("potential node failure - please re-issue the request"),
            );
            return;
        };

        let shuttle = Shuttle::single(move |mut responses: Vec<PersonResult>| {
            match responses.pop() {
                Some(Ok(person)) => message.reply_json(StatusCode::OK, &person),
                Some(Err(error)) => message.reply_error(error),
                None => message.reply_error(QueryError::internode("empty person response")),
            }
        });
        partition_loop.queue_cell(Box::new(OpenLoopPerson::new(shuttle, table, uuid)));
        return;
    }

    // Remote owner: relay the reply verbatim.
    match state
        .mapper
        .dispatch_single(
            owner,
            &message.method,
            &message.path,
            &message.params,
            message.body.clone(),
        )
        .await
    {
        Ok(block) => message.reply(block.status, block.data, "application/json"),
        Err(error) => rpc_error(message, error),
    }
}
