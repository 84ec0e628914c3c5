use axum::{debug_handler, extract::{Path, State}, Json};

use crate::AppResult;

use super::{context::RoomId, store::{PersistedMessage, SqliteMessageStore}};

#[debug_handler(state = crate::AppState)]
pub async fn messages(
    Path(room_id): Path<String>,
    State(store): State<SqliteMessageStore>,
) -> AppResult<Json<Vec<PersistedMessage>>> {
    let messages = store.for_room(&RoomId::from(room_id)).await?;
    Ok(Json(messages))
}
